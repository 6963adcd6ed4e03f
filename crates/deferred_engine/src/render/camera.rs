//! Camera with Vulkan-convention projection

use nalgebra::{Matrix4, Perspective3, Point3, Vector3};

/// Perspective camera producing view and projection matrices.
///
/// The projection's Y axis is flipped to match Vulkan's clip space, where
/// Y points down.
pub struct Camera {
    position: Point3<f32>,
    target: Point3<f32>,
    up: Vector3<f32>,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl Camera {
    pub fn new(position: Point3<f32>, target: Point3<f32>, aspect: f32) -> Self {
        Self {
            position,
            target,
            up: Vector3::y(),
            fov_y: 45.0_f32.to_radians(),
            aspect,
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn set_position(&mut self, position: Point3<f32>) {
        self.position = position;
    }

    pub fn set_target(&mut self, target: Point3<f32>) {
        self.target = target;
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        let mut projection =
            Perspective3::new(self.aspect, self.fov_y, self.near, self.far).to_homogeneous();
        // Vulkan clip space has Y pointing down
        projection[(1, 1)] *= -1.0;
        projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn projection_flips_y() {
        let camera = Camera::new(Point3::new(0.0, 0.0, 2.0), Point3::origin(), 16.0 / 9.0);
        let gl_projection =
            Perspective3::new(16.0 / 9.0, 45.0_f32.to_radians(), 0.1, 100.0).to_homogeneous();
        let vk_projection = camera.projection_matrix();

        assert_relative_eq!(vk_projection[(1, 1)], -gl_projection[(1, 1)]);
        assert_relative_eq!(vk_projection[(0, 0)], gl_projection[(0, 0)]);
    }

    #[test]
    fn view_matrix_looks_at_target() {
        let camera = Camera::new(Point3::new(0.0, 0.0, 5.0), Point3::origin(), 1.0);
        let view = camera.view_matrix();
        let transformed = view.transform_point(&Point3::origin());
        // Target lands on the negative Z axis in view space
        assert_relative_eq!(transformed.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(transformed.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(transformed.z, -5.0, epsilon = 1e-6);
    }
}
