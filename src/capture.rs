//! Capture loop: camera in, frames out, latest detection drives the servos.
//!
//! The loop never waits on the detector. Every iteration publishes the new
//! frame, reads whatever detection is currently published, feeds it to the
//! tracker and renders the frame with diagnostics.

use crate::{
    constants::CAMERA_RETRY_MS,
    devices::{Camera, Display, DisplayEvent, Overlay},
    frame::Frame,
    lifecycle::{CancellationToken, FrequencyCounter, LoopState},
    shared::{SharedDetectionResult, SharedDetectorRate, SharedFrameBuffer},
    tracking::{Tracker, TrackingOutcome},
    utils::clamp_box,
    Error, Result,
};
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

/// Why the capture loop left `Running`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Cancellation token fired (signal or supervisor)
    Cancelled,
    /// Operator quit from the display
    OperatorQuit,
    /// Too many consecutive camera failures
    CameraFailures,
}

/// Summary returned when the capture loop stops
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureReport {
    pub frames_captured: u64,
    pub camera_failures: u64,
    pub servo_updates: u64,
    pub capture_fps: f64,
    pub stop_reason: StopReason,
    pub final_state: LoopState,
}

/// The capture/display execution context
pub struct CaptureProcess {
    frames: SharedFrameBuffer,
    detections: SharedDetectionResult,
    detector_rate: SharedDetectorRate,
    tracker: Tracker,
    token: CancellationToken,
    max_consecutive_failures: u32,
    camera_retry: Duration,
    state: LoopState,
    frames_captured: u64,
    camera_failures: u64,
}

impl CaptureProcess {
    #[must_use]
    pub fn new(
        frames: SharedFrameBuffer,
        detections: SharedDetectionResult,
        detector_rate: SharedDetectorRate,
        tracker: Tracker,
        token: CancellationToken,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            frames,
            detections,
            detector_rate,
            tracker,
            token,
            max_consecutive_failures,
            camera_retry: Duration::from_millis(CAMERA_RETRY_MS),
            state: LoopState::Starting,
            frames_captured: 0,
            camera_failures: 0,
        }
    }

    /// Pause between a failed camera read and the next attempt
    #[must_use]
    pub const fn with_camera_retry(mut self, retry: Duration) -> Self {
        self.camera_retry = retry;
        self
    }

    pub const fn state(&self) -> LoopState {
        self.state
    }

    pub const fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next && self.state.can_transition_to(next) {
            info!("Capture: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Publish one captured frame and act on the latest detection
    ///
    /// # Errors
    ///
    /// Returns a connection error if the servo controller is closed
    pub fn process_frame(&mut self, frame: &Frame, now: Instant) -> Result<(TrackingOutcome, Overlay)> {
        self.frames.write(frame)?;
        self.frames_captured += 1;

        let detection = self
            .detections
            .read()
            .and_then(|bbox| clamp_box(&bbox, self.frames.shape()));
        let outcome = self.tracker.on_detection(detection, now)?;

        let (pan_angle, tilt_angle) = self.tracker.angles();
        let overlay = Overlay {
            detection,
            capture_fps: 0.0,
            detector_hz: self.detector_rate.rate(),
            pan_angle,
            tilt_angle,
        };
        Ok((outcome, overlay))
    }

    /// Drive the loop until cancelled, quit by the operator, or the camera keeps failing
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the camera shape does not match the
    /// shared buffer, or a connection error if the servo controller closes
    pub fn run(mut self, camera: &mut dyn Camera, display: &mut dyn Display) -> Result<CaptureReport> {
        if camera.shape() != self.frames.shape() {
            return Err(Error::Config(format!(
                "Camera produces {}x{} frames, buffer expects {}x{}",
                camera.shape().width,
                camera.shape().height,
                self.frames.shape().width,
                self.frames.shape().height
            )));
        }
        self.tracker.flush()?;
        self.transition(LoopState::Running);

        let mut counter = FrequencyCounter::new(Duration::from_secs(1), Instant::now());
        let mut consecutive_failures = 0u32;
        let mut stop_reason = StopReason::Cancelled;
        let mut outcome = Ok(());

        while !self.token.is_cancelled() {
            let frame = match camera.read() {
                Ok(frame) => {
                    consecutive_failures = 0;
                    frame
                }
                Err(e) => {
                    self.camera_failures += 1;
                    consecutive_failures += 1;
                    warn!("Frame acquisition failed ({consecutive_failures} in a row): {e}");
                    if consecutive_failures > self.max_consecutive_failures {
                        error!("Camera failing persistently, stopping capture");
                        stop_reason = StopReason::CameraFailures;
                        break;
                    }
                    if self.token.wait_timeout(self.camera_retry) {
                        break;
                    }
                    continue;
                }
            };

            let now = Instant::now();
            let (tracking, mut overlay) = match self.process_frame(&frame, now) {
                Ok(result) => result,
                Err(e) => {
                    error!("Servo update failed: {e}");
                    outcome = Err(e);
                    break;
                }
            };
            if let TrackingOutcome::Moved { pan_angle, tilt_angle } = tracking {
                debug!("Servos moved to pan {pan_angle:?} tilt {tilt_angle:?}");
            }

            counter.tick(now);
            overlay.capture_fps = counter.hz();

            match display.show(&frame, &overlay) {
                Ok(DisplayEvent::Continue) => {}
                Ok(DisplayEvent::Quit) => {
                    info!("Operator requested shutdown");
                    stop_reason = StopReason::OperatorQuit;
                    break;
                }
                Ok(DisplayEvent::Recenter) => {
                    if let Err(e) = self.tracker.recenter() {
                        error!("Recenter failed: {e}");
                        outcome = Err(e);
                        break;
                    }
                }
                Err(e) => warn!("Display failed: {e}"),
            }
        }

        self.transition(LoopState::Stopping);
        if let Err(e) = camera.release() {
            warn!("Camera release failed: {e}");
        }
        if let Err(e) = display.close() {
            warn!("Display close failed: {e}");
        }
        self.transition(LoopState::Stopped);

        let report = CaptureReport {
            frames_captured: self.frames_captured,
            camera_failures: self.camera_failures,
            servo_updates: self.tracker.updates_emitted(),
            capture_fps: counter.hz(),
            stop_reason,
            final_state: self.state,
        };
        info!(
            "Capture stopped ({:?}) after {} frames, {} servo updates",
            report.stop_reason, report.frames_captured, report.servo_updates
        );
        outcome.map(|()| report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::{BoundingBox, FrameShape},
        pid::{PidController, PidGains, RateLimiter},
        servo::{ServoIdAllocator, ServoObject, ServoSettings},
        sim::{NullDisplay, SyntheticCamera},
        tracking::AxisTracker,
    };

    fn shape() -> FrameShape {
        FrameShape::new(48, 64).unwrap()
    }

    fn tracker() -> Tracker {
        let mut ids = ServoIdAllocator::new();
        let gains = PidGains {
            kp: 0.1,
            ki: 0.0,
            kd: 0.0,
            integral_limit: 10.0,
            minimum_move_size_pixels: 2.0,
        };
        let mut axis = || {
            AxisTracker::new(
                ServoObject::new(ids.next_id(), &ServoSettings::default()).unwrap(),
                PidController::new(gains).unwrap(),
            )
        };
        let pan = axis();
        let tilt = axis();
        Tracker::new(shape(), Some(pan), Some(tilt), RateLimiter::new(1000).unwrap(), None)
    }

    fn process(token: CancellationToken) -> (CaptureProcess, SharedFrameBuffer, SharedDetectionResult) {
        let frames = SharedFrameBuffer::new(shape()).unwrap();
        let detections = SharedDetectionResult::new().unwrap();
        let capture = CaptureProcess::new(
            frames.clone(),
            detections.clone(),
            SharedDetectorRate::new(),
            tracker(),
            token,
            3,
        );
        (capture, frames, detections)
    }

    #[test]
    fn test_process_frame_publishes_and_tracks() {
        let (mut capture, frames, detections) = process(CancellationToken::new());
        let frame = Frame::zeroed(shape());
        let (outcome, overlay) = capture.process_frame(&frame, Instant::now()).unwrap();
        assert_eq!(outcome, TrackingOutcome::NoTarget);
        assert_eq!(overlay.detection, None);
        assert_eq!(frames.frames_published(), 1);

        // Face well to the right of center
        detections.write(Some(BoundingBox::new(20, 64, 28, 56)));
        let (outcome, overlay) = capture.process_frame(&frame, Instant::now()).unwrap();
        assert!(matches!(outcome, TrackingOutcome::Moved { .. }));
        assert!(overlay.pan_angle.unwrap() > 0.0);
    }

    #[test]
    fn test_torn_box_treated_as_absent() {
        let (mut capture, _, detections) = process(CancellationToken::new());
        // top > bottom cannot come from a single write
        detections.write(Some(BoundingBox::new(30, 40, 10, 20)));
        let (outcome, _) = capture.process_frame(&Frame::zeroed(shape()), Instant::now()).unwrap();
        assert_eq!(outcome, TrackingOutcome::NoTarget);
    }

    #[test]
    fn test_operator_quit() {
        let (capture, frames, _) = process(CancellationToken::new());
        let mut camera = SyntheticCamera::new(shape());
        let mut display = NullDisplay::quit_after(5);
        let report = capture.run(&mut camera, &mut display).unwrap();
        assert_eq!(report.stop_reason, StopReason::OperatorQuit);
        assert_eq!(report.frames_captured, 5);
        assert_eq!(report.final_state, LoopState::Stopped);
        assert_eq!(frames.frames_published(), 5);
    }

    #[test]
    fn test_repeated_camera_failure_stops_loop() {
        let (capture, _, _) = process(CancellationToken::new());
        let mut camera = SyntheticCamera::new(shape()).failing_after(2);
        let report = capture.run(&mut camera, &mut NullDisplay::new()).unwrap();
        assert_eq!(report.stop_reason, StopReason::CameraFailures);
        assert_eq!(report.frames_captured, 2);
        assert_eq!(report.camera_failures, 4);
    }

    #[test]
    fn test_cancelled_token_stops_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let (capture, _, _) = process(token);
        let report = capture
            .run(&mut SyntheticCamera::new(shape()), &mut NullDisplay::new())
            .unwrap();
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.frames_captured, 0);
    }

    #[test]
    fn test_camera_shape_mismatch() {
        let (capture, _, _) = process(CancellationToken::new());
        let mut camera = SyntheticCamera::new(FrameShape::new(10, 10).unwrap());
        assert!(matches!(
            capture.run(&mut camera, &mut NullDisplay::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_camera_failures_back_off_between_reads() {
        let (capture, _, _) = process(CancellationToken::new());
        let capture = capture.with_camera_retry(Duration::from_millis(20));
        let mut camera = SyntheticCamera::new(shape()).failing_after(0);

        let started = Instant::now();
        let report = capture.run(&mut camera, &mut NullDisplay::new()).unwrap();
        assert_eq!(report.stop_reason, StopReason::CameraFailures);
        assert_eq!(report.camera_failures, 4);
        // Three retries are spaced out before the fourth failure gives up
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_cancel_during_camera_backoff() {
        let token = CancellationToken::new();
        let frames = SharedFrameBuffer::new(shape()).unwrap();
        let capture = CaptureProcess::new(
            frames,
            SharedDetectionResult::new().unwrap(),
            SharedDetectorRate::new(),
            tracker(),
            token.clone(),
            u32::MAX,
        )
        .with_camera_retry(Duration::from_secs(10));

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        });
        let started = Instant::now();
        let report = capture
            .run(&mut SyntheticCamera::new(shape()).failing_after(0), &mut NullDisplay::new())
            .unwrap();
        canceller.join().unwrap();

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.camera_failures, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
