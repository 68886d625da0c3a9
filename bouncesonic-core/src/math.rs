//! Math types for BounceSonic

pub use glam::{Quat, Vec3};

/// Position and orientation of the listener.
///
/// Orientation follows the usual right-handed convention: forward is `-Z`,
/// up is `+Y`, right is `+X` for the identity rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Express a world-space point in the listener's frame as (right, up, forward).
    pub fn to_local(&self, point: Vec3) -> Vec3 {
        let offset = point - self.position;
        Vec3::new(
            offset.dot(self.right()),
            offset.dot(self.up()),
            offset.dot(self.forward()),
        )
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_axes() {
        let pose = Pose::identity();
        assert_eq!(pose.forward(), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(pose.right(), Vec3::X);
        assert_eq!(pose.up(), Vec3::Y);
    }

    #[test]
    fn test_to_local_follows_rotation() {
        // Turned 90 degrees left: world -X is now straight ahead.
        let pose = Pose::new(
            Vec3::ZERO,
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        );
        let local = pose.to_local(Vec3::new(-2.0, 0.0, 0.0));
        assert!(local.x.abs() < 1e-5);
        assert!((local.z - 2.0).abs() < 1e-5);
    }
}
