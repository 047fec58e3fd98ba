use nalgebra::{Matrix3, Point2, Vector2};

use crate::detector::Landmark;

/// Maps normalized landmark coordinates onto a surface's backing buffer.
///
/// Only the buffer size matters; how large the surface is shown on screen
/// does not enter the mapping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelTransform {
    matrix: Matrix3<f32>,
}

impl PixelTransform {
    pub fn for_buffer(width: u32, height: u32) -> Self {
        Self {
            matrix: Matrix3::new_nonuniform_scaling(&Vector2::new(width as f32, height as f32)),
        }
    }

    /// (x, y) in [0,1] -> (x * W, y * H)
    pub fn to_pixel(&self, landmark: Landmark) -> Point2<f32> {
        self.matrix
            .transform_point(&Point2::new(landmark.x, landmark.y))
    }
}
