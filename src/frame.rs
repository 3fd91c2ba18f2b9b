//! Frames and bounding boxes exchanged between the capture and detector loops.
//!
//! A frame is a fixed-shape `height × width × 3` BGR byte buffer laid out
//! row-major. Its shape is chosen once at startup and shared by every
//! component, so the shared frame region can be sized exactly.

use crate::{constants::FRAME_CHANNELS, utils::safe_cast::{f64_to_i64, i64_to_usize_clamp}, Error, Result};

/// Fixed frame geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    /// Rows in pixels
    pub height: usize,
    /// Columns in pixels
    pub width: usize,
}

impl FrameShape {
    /// Create a frame shape
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either dimension is zero
    pub fn new(height: usize, width: usize) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(Error::Config(format!(
                "Frame dimensions must be non-zero, got {height}x{width}"
            )));
        }
        Ok(Self { height, width })
    }

    /// Byte length of one BGR frame
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.height * self.width * FRAME_CHANNELS
    }

    /// Pixel center `(x, y)`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn center(&self) -> (f64, f64) {
        (self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    /// Shape after integer downsampling
    ///
    /// # Errors
    ///
    /// Returns an error if the factor is zero or larger than a dimension
    pub fn downsampled(&self, factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(Error::InvalidInput("Downsample factor must be at least 1".to_string()));
        }
        Self::new(self.height / factor, self.width / factor)
    }
}

/// Owned BGR frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    shape: FrameShape,
    data: Vec<u8>,
}

impl Frame {
    /// All-black frame
    #[must_use]
    pub fn zeroed(shape: FrameShape) -> Self {
        Self {
            shape,
            data: vec![0; shape.byte_len()],
        }
    }

    /// Wrap raw BGR bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the byte length does not match the shape
    pub fn from_bytes(shape: FrameShape, data: Vec<u8>) -> Result<Self> {
        if data.len() != shape.byte_len() {
            return Err(Error::InvalidInput(format!(
                "Frame of {}x{} needs {} bytes, got {}",
                shape.height,
                shape.width,
                shape.byte_len(),
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Frame geometry
    #[must_use]
    pub const fn shape(&self) -> FrameShape {
        self.shape
    }

    /// Raw row-major BGR bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw bytes
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// BGR value at `(row, col)`, `None` when outside the frame
    #[must_use]
    pub fn pixel(&self, row: usize, col: usize) -> Option<[u8; 3]> {
        if row >= self.shape.height || col >= self.shape.width {
            return None;
        }
        let idx = (row * self.shape.width + col) * FRAME_CHANNELS;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Set the BGR value at `(row, col)`; out-of-frame writes are ignored
    pub fn set_pixel(&mut self, row: usize, col: usize, bgr: [u8; 3]) {
        if row >= self.shape.height || col >= self.shape.width {
            return;
        }
        let idx = (row * self.shape.width + col) * FRAME_CHANNELS;
        self.data[idx..idx + FRAME_CHANNELS].copy_from_slice(&bgr);
    }

    /// Fill the part of `bbox` that lies inside the frame
    pub fn fill_box(&mut self, bbox: &BoundingBox, bgr: [u8; 3]) {
        let Some(clamped) = crate::utils::clamp_box(bbox, self.shape) else {
            return;
        };
        let (height, width) = (self.shape.height, self.shape.width);
        let top = i64_to_usize_clamp(clamped.top, 0, height);
        let bottom = i64_to_usize_clamp(clamped.bottom, 0, height);
        let left = i64_to_usize_clamp(clamped.left, 0, width);
        let right = i64_to_usize_clamp(clamped.right, 0, width);
        for row in top..bottom {
            for col in left..right {
                self.set_pixel(row, col, bgr);
            }
        }
    }

    /// Nearest-neighbour downsample by an integer factor
    ///
    /// # Errors
    ///
    /// Returns an error if the factor is zero or exceeds the frame size
    pub fn downsample(&self, factor: usize) -> Result<Self> {
        if factor == 1 {
            return Ok(self.clone());
        }
        let shape = self.shape.downsampled(factor)?;
        let mut data = Vec::with_capacity(shape.byte_len());
        for row in 0..shape.height {
            let src_row = row * factor;
            for col in 0..shape.width {
                let idx = (src_row * self.shape.width + col * factor) * FRAME_CHANNELS;
                data.extend_from_slice(&self.data[idx..idx + FRAME_CHANNELS]);
            }
        }
        Ok(Self { shape, data })
    }
}

/// Face location in pixel coordinates; `bottom` and `right` are exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
    pub left: i64,
}

impl BoundingBox {
    /// Create a box from its four edges
    #[must_use]
    pub const fn new(top: i64, right: i64, bottom: i64, left: i64) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Edges in shared-memory order
    #[must_use]
    pub const fn to_array(&self) -> [i64; 4] {
        [self.top, self.right, self.bottom, self.left]
    }

    /// Box from edges in shared-memory order
    #[must_use]
    pub const fn from_array(edges: [i64; 4]) -> Self {
        Self::new(edges[0], edges[1], edges[2], edges[3])
    }

    /// Width in pixels (zero for degenerate boxes)
    #[must_use]
    pub const fn width(&self) -> i64 {
        if self.right > self.left {
            self.right - self.left
        } else {
            0
        }
    }

    /// Height in pixels (zero for degenerate boxes)
    #[must_use]
    pub const fn height(&self) -> i64 {
        if self.bottom > self.top {
            self.bottom - self.top
        } else {
            0
        }
    }

    /// Center `(x, y)` in pixels
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.left as f64 + self.right as f64) / 2.0,
            (self.top as f64 + self.bottom as f64) / 2.0,
        )
    }

    /// Edges are ordered: `top <= bottom` and `left <= right`
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        self.top <= self.bottom && self.left <= self.right
    }

    /// Scale every edge by `factor`, used to undo detector downsampling
    ///
    /// # Errors
    ///
    /// Returns an error if a scaled edge overflows
    #[allow(clippy::cast_precision_loss)]
    pub fn scaled(&self, factor: f64) -> Result<Self> {
        Ok(Self::new(
            f64_to_i64(self.top as f64 * factor)?,
            f64_to_i64(self.right as f64 * factor)?,
            f64_to_i64(self.bottom as f64 * factor)?,
            f64_to_i64(self.left as f64 * factor)?,
        ))
    }
}
