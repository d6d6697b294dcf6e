use crate::assets::AssetError;
use crate::assets::model::{fetch_bytes, ModelSource};
use glam::Vec3;
use image::Rgb32FImage;

/// Equirectangular panorama used for image-based lighting and as backdrop.
#[derive(Debug, Clone)]
pub struct EnvironmentMap {
    pub name: String,
    image: Rgb32FImage,
}

impl EnvironmentMap {
    pub fn from_image(name: impl Into<String>, image: Rgb32FImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    /// Uniform color in every direction.
    pub fn solid(name: impl Into<String>, color: Vec3) -> Self {
        let image = Rgb32FImage::from_pixel(4, 2, image::Rgb([color.x, color.y, color.z]));
        Self::from_image(name, image)
    }

    /// Decode an HDR (Radiance) or LDR (JPEG/PNG) panorama. LDR input is
    /// converted from sRGB to linear.
    pub fn decode(bytes: &[u8], name: &str) -> Result<Self, AssetError> {
        let decoded = image::load_from_memory(bytes).map_err(|source| AssetError::Image {
            path: name.to_string(),
            source,
        })?;
        let is_hdr = name.to_ascii_lowercase().ends_with(".hdr");
        let mut image = decoded.into_rgb32f();
        if !is_hdr {
            for pixel in image.pixels_mut() {
                for channel in pixel.0.iter_mut() {
                    *channel = srgb_to_linear(*channel);
                }
            }
        }
        log::info!(
            "Environment loaded: {} ({}x{}, {})",
            name,
            image.width(),
            image.height(),
            if is_hdr { "hdr" } else { "ldr" }
        );
        Ok(Self::from_image(name, image))
    }

    pub fn load(source: &ModelSource) -> Result<Self, AssetError> {
        let bytes = fetch_bytes(source)?;
        Self::decode(&bytes, &source.file_name())
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Texels as tightly packed RGBA floats, top row first, alpha 1.
    pub fn rgba_texels(&self) -> Vec<f32> {
        self.image
            .pixels()
            .flat_map(|pixel| [pixel[0], pixel[1], pixel[2], 1.0])
            .collect()
    }
}

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn is_environment_path(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    [".hdr", ".jpg", ".jpeg", ".png"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}
