//! Synthetic devices for running the rig without a camera or a window.
//!
//! The synthetic camera draws a white square gliding over a black
//! background, and the bright-region detector finds it again. Together they
//! exercise the whole pipeline headless, which is how `--simulate` and the
//! integration tests run.

use crate::{
    devices::{Camera, Display, DisplayEvent, FaceDetector, Overlay},
    frame::{BoundingBox, Frame, FrameShape},
    utils::safe_cast::{f64_to_i64, usize_to_i64},
    Error, Result,
};
use log::debug;
use std::time::{Duration, Instant};

const TARGET_COLOR: [u8; 3] = [255, 255, 255];

/// Camera producing a moving bright square
#[derive(Debug)]
pub struct SyntheticCamera {
    shape: FrameShape,
    target_size: usize,
    frame_index: u64,
    fail_after: Option<u64>,
    frame_interval: Option<Duration>,
    last_frame: Option<Instant>,
    fixed_target: Option<BoundingBox>,
}

impl SyntheticCamera {
    /// Camera of the given shape; the square side is a quarter of the smaller dimension
    #[must_use]
    pub fn new(shape: FrameShape) -> Self {
        Self {
            shape,
            target_size: (shape.width.min(shape.height) / 4).max(1),
            frame_index: 0,
            fail_after: None,
            frame_interval: None,
            last_frame: None,
            fixed_target: None,
        }
    }

    /// Pace reads to at most `fps` frames per second
    #[must_use]
    pub fn with_fps(mut self, fps: f64) -> Self {
        if fps.is_finite() && fps > 0.0 {
            self.frame_interval = Some(Duration::from_secs_f64(1.0 / fps));
        }
        self
    }

    /// Every read after the first `frames` fails
    #[must_use]
    pub const fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Keep the target at a fixed box instead of moving it
    #[must_use]
    pub const fn with_fixed_target(mut self, bbox: BoundingBox) -> Self {
        self.fixed_target = Some(bbox);
        self
    }

    /// Frames produced so far
    pub const fn frames_produced(&self) -> u64 {
        self.frame_index
    }

    /// Where the square sits in frame `index`
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too large for pixel arithmetic
    #[allow(clippy::cast_precision_loss)]
    pub fn target_at(&self, index: u64) -> Result<BoundingBox> {
        if let Some(bbox) = self.fixed_target {
            return Ok(bbox);
        }
        let size = usize_to_i64(self.target_size)?;
        let free_x = (self.shape.width - self.target_size) as f64;
        let free_y = (self.shape.height - self.target_size) as f64;
        let phase = index as f64 * 0.05;
        let left = f64_to_i64(free_x * 0.5 * (1.0 + phase.sin()))?;
        let top = f64_to_i64(free_y * 0.5 * (1.0 + (phase * 0.7).cos()))?;
        Ok(BoundingBox::new(top, left + size, top + size, left))
    }

    fn pace(&mut self) {
        let Some(interval) = self.frame_interval else {
            return;
        };
        if let Some(last) = self.last_frame {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl Camera for SyntheticCamera {
    fn read(&mut self) -> Result<Frame> {
        if self.fail_after.is_some_and(|limit| self.frame_index >= limit) {
            return Err(Error::Camera("Synthetic camera stopped producing frames".to_string()));
        }
        self.pace();

        let mut frame = Frame::zeroed(self.shape);
        frame.fill_box(&self.target_at(self.frame_index)?, TARGET_COLOR);
        self.frame_index += 1;
        Ok(frame)
    }

    fn shape(&self) -> FrameShape {
        self.shape
    }
}

/// Detector returning the bounding box of all pixels at or above a brightness threshold
#[derive(Debug, Clone)]
pub struct BrightRegionDetector {
    threshold: u8,
}

impl Default for BrightRegionDetector {
    fn default() -> Self {
        Self { threshold: 200 }
    }
}

impl BrightRegionDetector {
    #[must_use]
    pub const fn new(threshold: u8) -> Self {
        Self { threshold }
    }
}

impl FaceDetector for BrightRegionDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<BoundingBox>> {
        let shape = frame.shape();
        let mut bounds: Option<(usize, usize, usize, usize)> = None;

        for row in 0..shape.height {
            for col in 0..shape.width {
                let Some(px) = frame.pixel(row, col) else {
                    continue;
                };
                if px.iter().all(|&c| c >= self.threshold) {
                    bounds = Some(match bounds {
                        None => (row, col, row, col),
                        Some((top, left, bottom, right)) => {
                            (top.min(row), left.min(col), bottom.max(row), right.max(col))
                        }
                    });
                }
            }
        }

        let Some((top, left, bottom, right)) = bounds else {
            return Ok(None);
        };
        // Bottom and right edges are exclusive
        Ok(Some(BoundingBox::new(
            usize_to_i64(top)?,
            usize_to_i64(right + 1)?,
            usize_to_i64(bottom + 1)?,
            usize_to_i64(left)?,
        )))
    }
}

/// Display that renders nothing, optionally quitting after a number of frames
#[derive(Debug, Default)]
pub struct NullDisplay {
    frames_shown: u64,
    quit_after: Option<u64>,
    last_overlay: Option<Overlay>,
}

impl NullDisplay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report [`DisplayEvent::Quit`] once `frames` frames have been shown
    #[must_use]
    pub fn quit_after(frames: u64) -> Self {
        Self {
            quit_after: Some(frames),
            ..Self::default()
        }
    }

    pub const fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    /// Overlay passed with the most recent frame
    pub const fn last_overlay(&self) -> Option<&Overlay> {
        self.last_overlay.as_ref()
    }
}

impl Display for NullDisplay {
    fn show(&mut self, _frame: &Frame, overlay: &Overlay) -> Result<DisplayEvent> {
        self.frames_shown += 1;
        self.last_overlay = Some(*overlay);
        if self.quit_after.is_some_and(|limit| self.frames_shown >= limit) {
            debug!("Null display quitting after {} frames", self.frames_shown);
            return Ok(DisplayEvent::Quit);
        }
        Ok(DisplayEvent::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> FrameShape {
        FrameShape::new(120, 160).unwrap()
    }

    #[test]
    fn test_detector_finds_synthetic_target() {
        let mut camera = SyntheticCamera::new(shape());
        let mut detector = BrightRegionDetector::default();
        for index in 0..20 {
            let expected = camera.target_at(index).unwrap();
            let frame = camera.read().unwrap();
            assert_eq!(detector.detect(&frame).unwrap(), Some(expected));
        }
        assert_eq!(camera.frames_produced(), 20);
    }

    #[test]
    fn test_target_stays_inside_frame() {
        let camera = SyntheticCamera::new(shape());
        for index in 0..500 {
            let bbox = camera.target_at(index).unwrap();
            assert!(bbox.is_well_formed());
            assert!(bbox.left >= 0 && bbox.top >= 0);
            assert!(bbox.right <= 160 && bbox.bottom <= 120);
            assert_eq!(bbox.width(), 30);
        }
    }

    #[test]
    fn test_blank_frame_has_no_detection() {
        let mut detector = BrightRegionDetector::default();
        assert_eq!(detector.detect(&Frame::zeroed(shape())).unwrap(), None);
    }

    #[test]
    fn test_camera_failure_injection() {
        let mut camera = SyntheticCamera::new(shape()).failing_after(2);
        assert!(camera.read().is_ok());
        assert!(camera.read().is_ok());
        let err = camera.read().unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_null_display_quits() {
        let mut display = NullDisplay::quit_after(2);
        let frame = Frame::zeroed(shape());
        let overlay = Overlay::default();
        assert_eq!(display.show(&frame, &overlay).unwrap(), DisplayEvent::Continue);
        assert_eq!(display.show(&frame, &overlay).unwrap(), DisplayEvent::Quit);
        assert_eq!(display.frames_shown(), 2);
        assert!(display.last_overlay().is_some());
    }
}
