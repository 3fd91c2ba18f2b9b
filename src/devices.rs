//! Collaborator interfaces for the camera, the display and the face detector.
//!
//! Implementations live in [`crate::sim`] (always available) and
//! [`crate::vision`] (behind the `opencv` feature). Devices are built on the
//! thread that uses them through the factory aliases below, so backends that
//! are not `Send` (GUI windows in particular) never cross threads.

use crate::{
    frame::{BoundingBox, Frame, FrameShape},
    Result,
};

/// Source of fixed-shape BGR frames
pub trait Camera {
    /// Grab the next frame. Failures are transient; the caller skips the cycle.
    ///
    /// # Errors
    ///
    /// Returns a camera error if no frame could be acquired
    fn read(&mut self) -> Result<Frame>;

    /// Shape of every frame this camera produces
    fn shape(&self) -> FrameShape;

    /// Release the device
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to release the device
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Operator input collected while rendering a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// Keep running
    Continue,
    /// Operator asked to quit
    Quit,
    /// Operator asked to recenter the servos
    Recenter,
}

/// Diagnostics drawn on top of each rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Overlay {
    /// Latest detection, in full-resolution pixels
    pub detection: Option<BoundingBox>,
    /// Capture loop rate
    pub capture_fps: f64,
    /// Rate reported by the detector loop
    pub detector_hz: f64,
    pub pan_angle: Option<f64>,
    pub tilt_angle: Option<f64>,
}

impl Overlay {
    /// Text lines shown in the top-left corner
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("FPS: {:.1}", self.capture_fps),
            format!("Detector: {:.1} Hz", self.detector_hz),
        ];
        if let Some(pan) = self.pan_angle {
            lines.push(format!("Pan: {pan:.1}"));
        }
        if let Some(tilt) = self.tilt_angle {
            lines.push(format!("Tilt: {tilt:.1}"));
        }
        if self.detection.is_none() {
            lines.push("No face".to_string());
        }
        lines
    }
}

/// Sink for rendered frames
pub trait Display {
    /// Render `frame` with `overlay` and poll operator input
    ///
    /// # Errors
    ///
    /// Returns a display error if rendering fails
    fn show(&mut self, frame: &Frame, overlay: &Overlay) -> Result<DisplayEvent>;

    /// Tear down any window
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to close
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Black-box face detector
pub trait FaceDetector {
    /// Locate the most prominent face in `frame`, in that frame's pixel coordinates
    ///
    /// # Errors
    ///
    /// Returns a detection error if the backend fails
    fn detect(&mut self, frame: &Frame) -> Result<Option<BoundingBox>>;
}

/// Builds a camera on the capture thread
pub type CameraFactory = Box<dyn FnOnce() -> Result<Box<dyn Camera>> + Send>;
/// Builds a display on the capture thread
pub type DisplayFactory = Box<dyn FnOnce() -> Result<Box<dyn Display>> + Send>;
/// Builds a detector on the detector thread
pub type DetectorFactory = Box<dyn FnOnce() -> Result<Box<dyn FaceDetector>> + Send>;
