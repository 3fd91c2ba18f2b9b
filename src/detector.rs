//! Detector loop: latest frame in, latest bounding box out.
//!
//! Each iteration reads whatever frame is currently in the shared buffer,
//! downsamples it, runs the face detector, scales the result back to full
//! resolution and publishes it. A frame without a face publishes "absent" so
//! the capture loop stops chasing a face that has left the scene.

use crate::{
    devices::FaceDetector,
    frame::{BoundingBox, Frame},
    lifecycle::{CancellationToken, FrequencyCounter, LoopState},
    shared::{SharedDetectionResult, SharedDetectorRate, SharedFrameBuffer},
    utils::clamp_box,
    Error, Result,
};
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

/// Detector loop settings
#[derive(Debug, Clone, Copy)]
pub struct DetectorSettings {
    /// Integer downsampling applied before detection (1 disables it)
    pub downsample_factor: usize,
    /// Consecutive detector failures tolerated before the loop stops
    pub max_consecutive_failures: u32,
    /// Sleep between polls while no frame has been published yet
    pub idle_poll: Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            downsample_factor: crate::constants::DEFAULT_DOWNSAMPLE_FACTOR,
            max_consecutive_failures: crate::constants::DEFAULT_MAX_CAMERA_FAILURES,
            idle_poll: Duration::from_millis(2),
        }
    }
}

/// Summary returned when the detector loop stops
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorReport {
    pub frames_processed: u64,
    pub detections: u64,
    pub failures: u64,
    /// Detection rate over the last measurement window
    pub detection_hz: f64,
    pub final_state: LoopState,
}

/// The detector execution context
#[derive(Debug)]
pub struct DetectorProcess {
    settings: DetectorSettings,
    frames: SharedFrameBuffer,
    results: SharedDetectionResult,
    rate: SharedDetectorRate,
    token: CancellationToken,
    state: LoopState,
    scratch: Frame,
    frames_processed: u64,
    failures: u64,
    consecutive_failures: u32,
}

impl DetectorProcess {
    /// Wire the loop to the shared regions
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the downsample factor is zero or
    /// larger than the frame
    pub fn new(
        settings: DetectorSettings,
        frames: SharedFrameBuffer,
        results: SharedDetectionResult,
        rate: SharedDetectorRate,
        token: CancellationToken,
    ) -> Result<Self> {
        frames
            .shape()
            .downsampled(settings.downsample_factor)
            .map_err(|e| Error::Config(format!("Invalid downsample factor: {e}")))?;
        let scratch = Frame::zeroed(frames.shape());
        Ok(Self {
            settings,
            frames,
            results,
            rate,
            token,
            state: LoopState::Starting,
            scratch,
            frames_processed: 0,
            failures: 0,
            consecutive_failures: 0,
        })
    }

    pub const fn state(&self) -> LoopState {
        self.state
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next && self.state.can_transition_to(next) {
            info!("Detector: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Run one detection on the current frame and publish the outcome
    ///
    /// # Errors
    ///
    /// Propagates the detector's error; nothing is published in that case
    pub fn step(&mut self, detector: &mut dyn FaceDetector) -> Result<Option<BoundingBox>> {
        self.frames.read_into(&mut self.scratch)?;
        let factor = self.settings.downsample_factor;
        let input = self.scratch.downsample(factor)?;

        let found = detector.detect(&input)?;
        let scaled = match found {
            Some(bbox) if factor > 1 => {
                #[allow(clippy::cast_precision_loss)]
                let bbox = bbox.scaled(factor as f64)?;
                Some(bbox)
            }
            other => other,
        };
        let published = scaled.and_then(|b| clamp_box(&b, self.frames.shape()));

        self.results.write(published);
        if published.is_some() {
            self.rate.record_detection();
        }
        self.frames_processed += 1;
        Ok(published)
    }

    /// Drive the loop until cancelled or the detector keeps failing
    ///
    /// # Errors
    ///
    /// Returns the last detector error once the failure threshold is exceeded
    pub fn run(mut self, detector: &mut dyn FaceDetector) -> Result<DetectorReport> {
        info!(
            "Detector starting ({}x{}, downsample x{})",
            self.frames.shape().width,
            self.frames.shape().height,
            self.settings.downsample_factor
        );

        while self.frames.frames_published() == 0 {
            if self.token.wait_timeout(self.settings.idle_poll) {
                self.transition(LoopState::Stopping);
                self.transition(LoopState::Stopped);
                return Ok(self.report(0.0));
            }
        }
        self.transition(LoopState::Running);

        let mut counter = FrequencyCounter::new(Duration::from_secs(1), Instant::now());
        let mut outcome = Ok(());

        while !self.token.is_cancelled() {
            match self.step(detector) {
                Ok(bbox) => {
                    self.consecutive_failures = 0;
                    if let Some(hz) = counter.tick(Instant::now()) {
                        self.rate.set_rate(hz);
                        debug!("Detector rate {hz:.1} Hz, latest {bbox:?}");
                    }
                }
                Err(e) if e.is_transient() => {
                    self.failures += 1;
                    self.consecutive_failures += 1;
                    warn!("Detection failed ({} in a row): {}", self.consecutive_failures, e);
                    if self.consecutive_failures > self.settings.max_consecutive_failures {
                        error!("Detector failing persistently, stopping");
                        outcome = Err(e);
                        break;
                    }
                }
                Err(e) => {
                    error!("Detector error: {e}");
                    outcome = Err(e);
                    break;
                }
            }
        }

        self.transition(LoopState::Stopping);
        self.results.write(None);
        self.rate.set_rate(0.0);
        self.transition(LoopState::Stopped);
        let report = self.report(counter.hz());
        info!(
            "Detector stopped after {} frames ({} detections)",
            report.frames_processed, report.detections
        );
        outcome.map(|()| report)
    }

    fn report(&self, detection_hz: f64) -> DetectorReport {
        DetectorReport {
            frames_processed: self.frames_processed,
            detections: self.rate.detections(),
            failures: self.failures,
            detection_hz,
            final_state: self.state,
        }
    }
}
