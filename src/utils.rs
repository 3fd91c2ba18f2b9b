//! Utility functions for box geometry and numeric conversions.

pub mod safe_cast;
#[cfg(feature = "opencv")]
pub mod image_conversion;

use crate::frame::{BoundingBox, FrameShape};
use safe_cast::usize_to_i64;

/// Clip a bounding box to the frame boundaries
///
/// Returns `None` when the box is malformed (for example a torn read that
/// produced `top > bottom`) or has no area inside the frame.
#[must_use]
pub fn clamp_box(bbox: &BoundingBox, shape: FrameShape) -> Option<BoundingBox> {
    if !bbox.is_well_formed() {
        return None;
    }
    let max_x = usize_to_i64(shape.width).ok()?;
    let max_y = usize_to_i64(shape.height).ok()?;

    let clipped = BoundingBox::new(
        bbox.top.clamp(0, max_y),
        bbox.right.clamp(0, max_x),
        bbox.bottom.clamp(0, max_y),
        bbox.left.clamp(0, max_x),
    );

    if clipped.width() == 0 || clipped.height() == 0 {
        return None;
    }
    Some(clipped)
}

/// Offset `(dx, dy)` in pixels from the frame center to the box center
#[must_use]
pub fn offset_from_center(bbox: &BoundingBox, shape: FrameShape) -> (f64, f64) {
    let (bx, by) = bbox.center();
    let (cx, cy) = shape.center();
    (bx - cx, by - cy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> FrameShape {
        FrameShape::new(200, 200).unwrap()
    }

    #[test]
    fn test_clamp_box_inside() {
        let bbox = BoundingBox::new(10, 60, 60, 10);
        assert_eq!(clamp_box(&bbox, shape()), Some(bbox));
    }

    #[test]
    fn test_clamp_box_edge_boundaries() {
        let boxes = vec![
            // Box hanging off the bottom right corner
            BoundingBox::new(190, 210, 210, 190),
            // Box hanging off the top left corner
            BoundingBox::new(-10, 10, 10, -10),
        ];

        for bbox in &boxes {
            let clipped = clamp_box(bbox, shape()).unwrap();
            assert!(clipped.left >= 0);
            assert!(clipped.top >= 0);
            assert!(clipped.right <= 200);
            assert!(clipped.bottom <= 200);
        }
    }

    #[test]
    fn test_clamp_box_rejects_torn_and_empty() {
        // Torn tuple: new top with old bottom
        assert_eq!(clamp_box(&BoundingBox::new(150, 60, 40, 10), shape()), None);
        // Entirely outside
        assert_eq!(clamp_box(&BoundingBox::new(300, 400, 350, 320), shape()), None);
        // Zero area
        assert_eq!(clamp_box(&BoundingBox::new(10, 10, 20, 10), shape()), None);
    }

    #[test]
    fn test_offset_from_center() {
        let bbox = BoundingBox::new(90, 150, 110, 130);
        assert_eq!(offset_from_center(&bbox, shape()), (40.0, 0.0));
    }
}
