use glam::{Mat4, Vec3};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraKind {
    /// Reverse-Z perspective: near plane maps to NDC depth 1, far to 0.
    PerspectiveReverseZ,
    Orthographic,
}

/// A free camera driven by position plus pitch/yaw, matching the shadow and
/// probe code that steps through fixed face orientations.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub kind: CameraKind,
    pub position: Vec3,
    pub pitch: f32,
    pub yaw: f32,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Orthographic extent.
    pub width: f32,
    pub height: f32,
    view: Mat4,
    projection: Mat4,
}

impl Camera {
    pub fn perspective_reverse_z(
        position: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let mut camera = Self {
            kind: CameraKind::PerspectiveReverseZ,
            position,
            pitch: 0.0,
            yaw: 0.0,
            fov_y,
            aspect,
            near,
            far,
            width: 0.0,
            height: 0.0,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        };
        camera.update();
        camera
    }

    pub fn orthographic(position: Vec3, width: f32, height: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            kind: CameraKind::Orthographic,
            position,
            pitch: 0.0,
            yaw: 0.0,
            fov_y: 0.0,
            aspect: 1.0,
            near,
            far,
            width,
            height,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        };
        camera.update();
        camera
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        )
    }

    pub fn set_pitch_yaw(&mut self, pitch: f32, yaw: f32) {
        self.pitch = pitch;
        self.yaw = yaw;
    }

    /// Points the camera from `eye` at `target`.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3) {
        self.position = eye;
        let direction = (target - eye).normalize_or_zero();
        self.pitch = direction.y.clamp(-1.0, 1.0).asin();
        self.yaw = direction.x.atan2(direction.z);
    }

    /// Recomputes the cached view/projection from the current parameters.
    pub fn update(&mut self) {
        let forward = self.forward();
        // avoid a degenerate basis when looking straight up or down
        let up = if forward.y.abs() > 0.999 {
            Vec3::new(0.0, 0.0, -forward.y.signum())
        } else {
            Vec3::Y
        };
        self.view = Mat4::look_at_rh(self.position, self.position + forward, up);
        self.projection = match self.kind {
            // swapping near and far in a [0,1] projection yields reverse-Z
            CameraKind::PerspectiveReverseZ => {
                Mat4::perspective_rh(self.fov_y, self.aspect, self.far, self.near)
            }
            CameraKind::Orthographic => {
                let half_w = self.width * 0.5;
                let half_h = self.height * 0.5;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, self.far, self.near)
            }
        };
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    #[test]
    fn reverse_z_maps_near_to_one_and_far_to_zero() {
        let camera = Camera::perspective_reverse_z(
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_2,
            1.0,
            0.1,
            100.0,
        );
        // forward is +Z at yaw 0; view space looks down -Z
        let clip_near = camera.view_projection() * vec3(0.0, 0.0, 0.1).extend(1.0);
        let clip_far = camera.view_projection() * vec3(0.0, 0.0, 100.0).extend(1.0);
        assert!((clip_near.z / clip_near.w - 1.0).abs() < 1e-4);
        assert!((clip_far.z / clip_far.w).abs() < 1e-4);
    }

    #[test]
    fn look_at_recovers_pitch_yaw() {
        let mut camera = Camera::perspective_reverse_z(
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_2,
            1.0,
            0.1,
            100.0,
        );
        camera.look_at(vec3(1.0, 2.0, 3.0), vec3(1.0, 2.0, 13.0));
        camera.update();
        assert!((camera.forward() - Vec3::Z).length() < 1e-5);

        camera.look_at(Vec3::ZERO, vec3(0.0, -10.0, 0.0));
        camera.update();
        assert!((camera.forward() - vec3(0.0, -1.0, 0.0)).length() < 1e-5);
        // the view matrix stays invertible even straight down
        assert!(camera.view().determinant().abs() > 1e-6);
    }

    #[test]
    fn pitch_yaw_table_covers_cube_faces() {
        use std::f32::consts::{FRAC_PI_2, PI};
        let mut camera = Camera::perspective_reverse_z(Vec3::ZERO, FRAC_PI_2, 1.0, 0.1, 10.0);
        let faces = [
            ((0.0, 0.0), Vec3::Z),
            ((0.0, PI), -Vec3::Z),
            ((0.0, FRAC_PI_2), Vec3::X),
            ((0.0, -FRAC_PI_2), -Vec3::X),
            ((FRAC_PI_2, 0.0), Vec3::Y),
            ((-FRAC_PI_2, 0.0), -Vec3::Y),
        ];
        for ((pitch, yaw), expected) in faces {
            camera.set_pitch_yaw(pitch, yaw);
            camera.update();
            assert!(
                (camera.forward() - expected).length() < 1e-5,
                "face ({pitch}, {yaw})"
            );
        }
    }
}
