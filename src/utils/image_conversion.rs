//! Conversion between OpenCV `Mat` and [`Frame`].

use crate::{
    frame::{Frame, FrameShape},
    utils::safe_cast::usize_to_i32,
    Error, Result,
};
use opencv::core::{Mat, MatTraitConst, MatTraitConstManual, MatTraitManual, Scalar, CV_8UC3};

/// Copy an 8-bit BGR `Mat` into a [`Frame`] of the expected shape
///
/// # Errors
/// * Returns error if the Mat is not `CV_8UC3`
/// * Returns error if the Mat does not match `shape`
pub fn mat_to_frame(mat: &Mat, shape: FrameShape) -> Result<Frame> {
    if mat.typ() != CV_8UC3 {
        return Err(Error::InvalidInput(format!(
            "Expected CV_8UC3 frame, got type {}",
            mat.typ()
        )));
    }
    if usize::try_from(mat.rows()).ok() != Some(shape.height) || usize::try_from(mat.cols()).ok() != Some(shape.width) {
        return Err(Error::InvalidInput(format!(
            "Camera delivered {}x{}, expected {}x{}",
            mat.rows(),
            mat.cols(),
            shape.height,
            shape.width
        )));
    }

    let bytes = if mat.is_continuous() {
        mat.data_bytes()?.to_vec()
    } else {
        mat.try_clone()?.data_bytes()?.to_vec()
    };
    Frame::from_bytes(shape, bytes)
}

/// Copy a [`Frame`] into a freshly allocated `CV_8UC3` `Mat`
///
/// # Errors
/// * Returns error if the frame dimensions do not fit in i32
/// * Returns error if Mat creation fails
pub fn frame_to_mat(frame: &Frame) -> Result<Mat> {
    let shape = frame.shape();
    let mut mat = Mat::new_rows_cols_with_default(
        usize_to_i32(shape.height)?,
        usize_to_i32(shape.width)?,
        CV_8UC3,
        Scalar::default(),
    )?;
    mat.data_bytes_mut()?.copy_from_slice(frame.as_bytes());
    Ok(mat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat_to_frame() {
        let mat = Mat::new_rows_cols_with_default(2, 3, CV_8UC3, Scalar::new(10.0, 20.0, 30.0, 0.0)).unwrap();
        let frame = mat_to_frame(&mat, FrameShape::new(2, 3).unwrap()).unwrap();
        assert_eq!(frame.pixel(0, 0), Some([10, 20, 30]));
        assert_eq!(frame.pixel(1, 2), Some([10, 20, 30]));
    }

    #[test]
    fn test_mat_to_frame_shape_mismatch() {
        let mat = Mat::new_rows_cols_with_default(2, 3, CV_8UC3, Scalar::default()).unwrap();
        assert!(mat_to_frame(&mat, FrameShape::new(3, 3).unwrap()).is_err());
    }

    #[test]
    fn test_frame_to_mat() {
        let mut frame = Frame::zeroed(FrameShape::new(4, 5).unwrap());
        frame.set_pixel(3, 4, [1, 2, 3]);
        let mat = frame_to_mat(&frame).unwrap();
        assert_eq!(mat.rows(), 4);
        assert_eq!(mat.cols(), 5);
        let back = mat_to_frame(&mat, frame.shape()).unwrap();
        assert_eq!(back, frame);
    }
}
