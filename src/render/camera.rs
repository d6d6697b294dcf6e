use glam::{Mat4, Vec3};

pub const DEFAULT_FOV_Y_DEGREES: f32 = 45.0;
pub const DEFAULT_POSITION: Vec3 = Vec3::new(0.0, 0.0, 4.0);

/// Free-look camera described by a position and yaw/pitch angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraController {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::looking_at(DEFAULT_POSITION, Vec3::ZERO)
    }
}

impl CameraController {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        Self {
            position,
            yaw,
            pitch,
            fov_y_degrees: DEFAULT_FOV_Y_DEGREES,
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let (yaw, pitch) = forward_to_yaw_pitch(target - position);
        Self::new(position, yaw, pitch)
    }

    /// Place the camera so a box with half-size `extent` around `center`
    /// fills the view.
    pub fn from_bounds(center: Vec3, extent: Vec3) -> Self {
        let distance = framing_distance(extent);
        let position = center + Vec3::new(distance, distance * 0.4, distance);
        Self::looking_at(position, center)
    }

    pub fn frame_bounds_preserve_orientation(&mut self, center: Vec3, extent: Vec3) {
        let distance = framing_distance(extent);
        let (forward, _, _) = self.basis();
        self.position = center - forward * distance;
    }

    pub fn orbit_around(&mut self, pivot: Vec3, yaw_delta: f32, pitch_delta: f32) {
        self.yaw += yaw_delta;
        self.pitch = (self.pitch + pitch_delta).clamp(-1.55, 1.55);
        wrap_angles(&mut self.yaw, &mut self.pitch);

        let distance = (self.position - pivot).length().max(0.05);
        let (forward, _, _) = self.basis();
        self.position = pivot - forward * distance;
    }

    /// Move toward (`amount > 0`) or away from `pivot`, never closer than `min`.
    pub fn dolly(&mut self, pivot: Vec3, amount: f32, min: f32) {
        let offset = self.position - pivot;
        let distance = (offset.length() - amount).max(min);
        self.position = pivot + offset.normalize_or_zero() * distance;
    }

    /// Forward, right and up unit vectors.
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let cos_pitch = self.pitch.cos();
        let forward = Vec3::new(
            self.yaw.cos() * cos_pitch,
            self.pitch.sin(),
            self.yaw.sin() * cos_pitch,
        );
        let right = Vec3::new(-self.yaw.sin(), 0.0, self.yaw.cos());
        let up = right.cross(forward).normalize_or_zero();
        (forward, right, up)
    }

    pub fn view_matrix(&self) -> Mat4 {
        let (forward, _, up) = self.basis();
        Mat4::look_at_rh(self.position, self.position + forward, up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            aspect.max(1e-4),
            self.near,
            self.far,
        )
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// World-space ray through a pixel; `(0, 0)` is the top-left corner.
    pub fn ray_through_pixel(&self, x: f32, y: f32, width: u32, height: u32) -> (Vec3, Vec3) {
        let aspect = width as f32 / height.max(1) as f32;
        let ndc_x = (x / width.max(1) as f32) * 2.0 - 1.0;
        let ndc_y = 1.0 - (y / height.max(1) as f32) * 2.0;
        let half_height = (self.fov_y_degrees.to_radians() * 0.5).tan();
        let (forward, right, up) = self.basis();
        let dir = forward + right * ndc_x * half_height * aspect + up * ndc_y * half_height;
        (self.position, dir.normalize_or_zero())
    }
}

/// Orbit controls around a target point. Disabled while a gizmo drag is
/// in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enabled: bool,
    pub rotate_speed: f32,
    pub min_distance: f32,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            enabled: true,
            rotate_speed: 0.005,
            min_distance: 0.2,
        }
    }
}

impl OrbitControls {
    /// Rotate by a pointer delta in pixels. Returns false when disabled.
    pub fn rotate(&self, camera: &mut CameraController, dx: f32, dy: f32) -> bool {
        if !self.enabled {
            return false;
        }
        camera.orbit_around(self.target, dx * self.rotate_speed, -dy * self.rotate_speed);
        true
    }

    pub fn zoom(&self, camera: &mut CameraController, amount: f32) -> bool {
        if !self.enabled {
            return false;
        }
        camera.dolly(self.target, amount, self.min_distance);
        true
    }
}

fn framing_distance(extent: Vec3) -> f32 {
    let radius = extent.max_element();
    if radius > 0.0 {
        radius * 3.0
    } else {
        3.0
    }
}

fn forward_to_yaw_pitch(forward: Vec3) -> (f32, f32) {
    let dir = forward.try_normalize().unwrap_or(Vec3::NEG_Z);
    (dir.z.atan2(dir.x), dir.y.clamp(-1.0, 1.0).asin())
}

fn wrap_angles(yaw: &mut f32, pitch: &mut f32) {
    const TWO_PI: f32 = std::f32::consts::PI * 2.0;
    if yaw.is_finite() {
        *yaw = (*yaw + std::f32::consts::PI).rem_euclid(TWO_PI) - std::f32::consts::PI;
    }
    if pitch.is_finite() {
        *pitch = (*pitch + std::f32::consts::PI).rem_euclid(TWO_PI) - std::f32::consts::PI;
    }
}

#[cfg(test)]
mod tests {
    use super::{CameraController, OrbitControls};
    use glam::Vec3;

    #[test]
    fn default_camera_looks_at_origin_from_plus_z() {
        let camera = CameraController::default();
        let (forward, _, up) = camera.basis();
        assert!((forward - Vec3::NEG_Z).length() < 1e-5);
        assert!(up.y > 0.99);
        assert_eq!(camera.fov_y_degrees, 45.0);
    }

    #[test]
    fn from_bounds_produces_finite_state() {
        let camera =
            CameraController::from_bounds(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0));
        assert!(camera.position.is_finite());
        assert!(camera.yaw.is_finite());
        assert!(camera.pitch.is_finite());
    }

    #[test]
    fn frame_bounds_preserves_orientation() {
        let mut camera = CameraController::new(Vec3::new(5.0, 6.0, 7.0), 1.1, -0.3);
        camera.frame_bounds_preserve_orientation(Vec3::ZERO, Vec3::splat(2.0));
        assert!((camera.yaw - 1.1).abs() < 1e-6);
        assert!((camera.pitch + 0.3).abs() < 1e-6);
        assert!((camera.position.length() - 6.0).abs() < 1e-4);
    }

    #[test]
    fn orbit_keeps_distance_to_pivot() {
        let mut camera = CameraController::default();
        camera.orbit_around(Vec3::ZERO, 0.7, 0.2);
        assert!((camera.position.length() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn disabled_controls_leave_camera_alone() {
        let mut camera = CameraController::default();
        let mut controls = OrbitControls::default();
        controls.enabled = false;
        assert!(!controls.rotate(&mut camera, 40.0, 10.0));
        assert_eq!(camera, CameraController::default());
        controls.enabled = true;
        assert!(controls.rotate(&mut camera, 40.0, 10.0));
        assert_ne!(camera, CameraController::default());
    }

    #[test]
    fn center_pixel_ray_points_forward() {
        let camera = CameraController::default();
        let (origin, dir) = camera.ray_through_pixel(50.0, 50.0, 100, 100);
        assert_eq!(origin, camera.position);
        assert!((dir - Vec3::NEG_Z).length() < 1e-5);
    }
}
