use std::time::{Duration, Instant};

pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_fps_time: Instant,
    frame_count: u32,
    total_frames: u64,
    pub frame_dt: f32,
    render_ms: f32,
    label: String,
}

impl FrameTiming {
    pub fn new(label: String) -> Self {
        Self {
            last_frame_time: None,
            last_fps_time: Instant::now(),
            frame_count: 0,
            total_frames: 0,
            frame_dt: 1.0 / 60.0,
            render_ms: 0.0,
            label,
        }
    }

    pub fn set_render_ms(&mut self, render_ms: f32) {
        self.render_ms = render_ms;
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn update(&mut self, now: Instant) {
        let dt_duration = if let Some(last) = self.last_frame_time {
            now.saturating_duration_since(last)
        } else {
            Duration::from_millis(16)
        };
        self.last_frame_time = Some(now);
        self.frame_dt = dt_duration.as_secs_f32().max(0.0);
        self.total_frames += 1;

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_fps_time);
        if elapsed.as_secs_f32() >= 0.5 {
            let fps = self.frame_count as f32 / elapsed.as_secs_f32();
            let ms = (self.frame_dt * 1000.0).max(0.0);
            log::debug!(
                "{} - {:.1} fps (cadence {:.2} ms, render {:.2} ms)",
                self.label,
                fps,
                ms,
                self.render_ms
            );
            self.frame_count = 0;
            self.last_fps_time = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_frame_delta() {
        let mut timing = FrameTiming::new("test".to_string());
        let start = Instant::now();
        timing.update(start);
        assert!((timing.frame_dt - 0.016).abs() < 1e-6);
        timing.update(start + Duration::from_millis(40));
        assert!((timing.frame_dt - 0.040).abs() < 1e-4);
        assert_eq!(timing.total_frames(), 2);
    }

    #[test]
    fn fps_window_resets_counter() {
        let mut timing = FrameTiming::new("test".to_string());
        let start = timing.last_fps_time;
        for i in 1..=3 {
            timing.update(start + Duration::from_millis(200 * i));
        }
        assert_eq!(timing.frame_count, 0);
        assert_eq!(timing.last_fps_time, start + Duration::from_millis(600));
    }
}
