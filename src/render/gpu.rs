//! Device setup and texture readback.

use super::RenderError;
use image::RgbaImage;
use std::sync::mpsc;

pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub fn new_instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    /// Offscreen device for frames written to disk.
    pub fn headless() -> Result<Self, RenderError> {
        Self::request(Self::new_instance(), None)
    }

    /// Device able to present to `surface`, which must come from `instance`.
    pub fn for_surface(
        instance: wgpu::Instance,
        surface: &wgpu::Surface<'_>,
    ) -> Result<Self, RenderError> {
        Self::request(instance, Some(surface))
    }

    fn request(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, RenderError> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))
        .ok_or(RenderError::NoAdapter)?;
        let info = adapter.get_info();
        log::info!("GPU adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("lampviz-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))?;
        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

/// Align to WebGPU's required bytes-per-row for copies.
pub fn align_copy_bpr(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Copy an `Rgba8Unorm` texture back to the CPU with row padding removed.
pub fn read_rgba8(gpu: &GpuContext, texture: &wgpu::Texture) -> Result<RgbaImage, RenderError> {
    let (width, height) = (texture.width(), texture.height());
    let tight_bpr = width * 4;
    let padded_bpr = align_copy_bpr(tight_bpr);
    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback-staging"),
        size: padded_bpr as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback-encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bpr),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        if sender.send(result).is_err() {
            log::warn!("Readback finished after its receiver was dropped");
        }
    });
    gpu.device.poll(wgpu::Maintain::Wait);
    receiver.recv().map_err(|_| RenderError::ReadbackLost)??;

    let mut pixels = Vec::with_capacity((tight_bpr * height) as usize);
    {
        let data = slice.get_mapped_range();
        for row in data.chunks_exact(padded_bpr as usize) {
            pixels.extend_from_slice(&row[..tight_bpr as usize]);
        }
    }
    staging.unmap();
    RgbaImage::from_raw(width, height, pixels).ok_or(RenderError::ReadbackLost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_rows_are_padded_to_alignment() {
        assert_eq!(align_copy_bpr(4), 256);
        assert_eq!(align_copy_bpr(256), 256);
        assert_eq!(align_copy_bpr(260), 512);
    }
}
