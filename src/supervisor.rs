//! Supervisor owning the shared regions and both loop threads.
//!
//! The supervisor allocates the frame and detection slots before anything
//! runs, spawns the `capture` and `detector` threads, and watches them. When
//! either thread ends for any reason the other is cancelled, so the rig never
//! runs half a pipeline. After cancellation each thread gets a bounded grace
//! period; a thread that overstays it is abandoned and reported as
//! [`Error::ShutdownTimeout`], leaving the caller to terminate the process.

use crate::{
    capture::{CaptureProcess, CaptureReport},
    constants::SUPERVISOR_POLL_MS,
    detector::{DetectorProcess, DetectorReport, DetectorSettings},
    devices::{CameraFactory, DetectorFactory, DisplayFactory},
    frame::FrameShape,
    lifecycle::CancellationToken,
    shared::{
        detection::BOX_FIELDS, region::default_shm_dir, SharedDetectionResult, SharedDetectorRate,
        SharedFrameBuffer, SharedRegion,
    },
    tracking::Tracker,
    Error, Result,
};
use log::{debug, error, info, warn};
use std::{
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Shape shared by the camera and both regions
    pub shape: FrameShape,
    /// How long stopped threads get to finish before being abandoned
    pub shutdown_grace: Duration,
    /// Name regions in the shm directory instead of mapping them anonymously
    pub region_name: Option<String>,
    /// Directory for named regions
    pub shm_dir: PathBuf,
    /// Consecutive camera failures tolerated by the capture loop
    pub max_camera_failures: u32,
    pub detector: DetectorSettings,
}

impl SupervisorSettings {
    #[must_use]
    pub fn new(shape: FrameShape) -> Self {
        Self {
            shape,
            shutdown_grace: Duration::from_millis(crate::constants::DEFAULT_SHUTDOWN_GRACE_MS),
            region_name: None,
            shm_dir: default_shm_dir(),
            max_camera_failures: crate::constants::DEFAULT_MAX_CAMERA_FAILURES,
            detector: DetectorSettings::default(),
        }
    }
}

/// Everything the two loops need besides the shared regions
pub struct Pipeline {
    pub tracker: Tracker,
    pub camera: CameraFactory,
    pub display: DisplayFactory,
    pub detector: DetectorFactory,
}

/// Outcome of a supervised run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupervisorReport {
    pub capture: CaptureReport,
    pub detector: DetectorReport,
}

/// Route SIGINT and SIGTERM to `token`. A second signal exits immediately.
///
/// # Errors
///
/// Returns an error if a handler is already installed for this process
pub fn install_signal_handler(token: &CancellationToken) -> Result<()> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            eprintln!("Second interrupt, terminating");
            std::process::exit(130);
        }
        eprintln!("Interrupt received, shutting down...");
        token.cancel();
    })
    .map_err(|e| Error::InvalidOperation(format!("Failed to install signal handler: {e}")))
}

/// Spawns, watches and stops the capture and detector threads
#[derive(Debug)]
pub struct ProcessSupervisor {
    settings: SupervisorSettings,
    token: CancellationToken,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            settings,
            token: CancellationToken::new(),
        }
    }

    /// Token that stops the whole rig when cancelled
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn allocate_regions(&self) -> Result<(SharedFrameBuffer, SharedDetectionResult)> {
        let shape = self.settings.shape;
        let frame_len = SharedFrameBuffer::region_len(shape);
        let box_len = BOX_FIELDS * std::mem::size_of::<i64>();
        let (frame_region, box_region) = match &self.settings.region_name {
            Some(name) => {
                let dir = &self.settings.shm_dir;
                (
                    SharedRegion::create(dir, &format!("{name}_frame"), frame_len)?,
                    SharedRegion::create(dir, &format!("{name}_bbox"), box_len)?,
                )
            }
            None => (
                SharedRegion::anonymous(frame_len)?,
                SharedRegion::anonymous(box_len)?,
            ),
        };
        info!(
            "Allocated frame region ({} bytes) and detection region ({} bytes)",
            frame_region.byte_len(),
            box_region.byte_len()
        );
        Ok((
            SharedFrameBuffer::with_region(Arc::new(frame_region), shape)?,
            SharedDetectionResult::with_region(Arc::new(box_region))?,
        ))
    }

    /// Run the rig until a signal, an operator quit or a loop failure
    ///
    /// # Errors
    ///
    /// Returns the first loop error (capture first), a thread panic, or a
    /// shutdown timeout when a thread ignores cancellation
    pub fn run(self, pipeline: Pipeline) -> Result<SupervisorReport> {
        let (frames, detections) = self.allocate_regions()?;
        let rate = SharedDetectorRate::new();
        let Pipeline {
            tracker,
            camera,
            display,
            detector,
        } = pipeline;

        let detector_process = DetectorProcess::new(
            self.settings.detector,
            frames.clone(),
            detections.clone(),
            rate.clone(),
            self.token.clone(),
        )?;
        let capture_process = CaptureProcess::new(
            frames,
            detections,
            rate,
            tracker,
            self.token.clone(),
            self.settings.max_camera_failures,
        );

        let capture: JoinHandle<Result<CaptureReport>> = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let mut camera = camera()?;
                let mut display = display()?;
                capture_process.run(camera.as_mut(), display.as_mut())
            })?;
        let detector: JoinHandle<Result<DetectorReport>> = thread::Builder::new()
            .name("detector".to_string())
            .spawn(move || {
                let mut detector = detector()?;
                detector_process.run(detector.as_mut())
            })?;
        info!("Capture and detector threads started");

        let poll = Duration::from_millis(SUPERVISOR_POLL_MS);
        while !self.token.is_cancelled() {
            if capture.is_finished() || detector.is_finished() {
                let which = if capture.is_finished() { "capture" } else { "detector" };
                warn!("{which} loop exited, stopping the other");
                self.token.cancel();
                break;
            }
            thread::sleep(poll);
        }
        self.token.cancel();

        let deadline = Instant::now() + self.settings.shutdown_grace;
        while !(capture.is_finished() && detector.is_finished()) {
            if Instant::now() >= deadline {
                let stuck: Vec<&str> = [
                    ("capture", capture.is_finished()),
                    ("detector", detector.is_finished()),
                ]
                .into_iter()
                .filter(|(_, finished)| !finished)
                .map(|(name, _)| name)
                .collect();
                error!("Threads did not stop within the grace period: {stuck:?}");
                return Err(Error::ShutdownTimeout(stuck.join(", ")));
            }
            thread::sleep(poll);
        }

        let capture = join("capture", capture);
        let detector = join("detector", detector);
        debug!("Capture: {capture:?}, detector: {detector:?}");
        Ok(SupervisorReport {
            capture: capture?,
            detector: detector?,
        })
    }
}

fn join<T>(name: &str, handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| Error::ThreadPanicked(name.to_string()))?
        .inspect_err(|e| error!("{name} loop failed: {e}"))
}
