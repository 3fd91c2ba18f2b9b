//! Main application module: builds the rig from a [`Config`] and runs it.

use crate::{
    config::{Config, MicroControllerBackend, MicroControllerConfig},
    detector::DetectorSettings,
    devices::{Camera, CameraFactory, DetectorFactory, Display, DisplayFactory, FaceDetector},
    microcontroller::{self, DryRunMicroController, SerialMicroController, SharedMicroController},
    pid::{PidController, RateLimiter},
    servo::{ServoIdAllocator, ServoObject, ServoSettings},
    sim::{BrightRegionDetector, NullDisplay, SyntheticCamera},
    supervisor::{install_signal_handler, Pipeline, ProcessSupervisor, SupervisorReport, SupervisorSettings},
    tracking::{AxisTracker, Tracker},
    Result,
};
use log::{info, warn};
use std::{path::PathBuf, time::Duration};

/// Run-time switches that are not part of the configuration file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// No window; frames are not rendered
    pub headless: bool,
    /// Synthetic camera and detector instead of real devices
    pub simulate: bool,
    /// Install SIGINT/SIGTERM handling
    pub handle_signals: bool,
}

/// Open the configured servo output backend
///
/// # Errors
///
/// Returns a serial error if the port cannot be opened
pub fn build_microcontroller(config: &MicroControllerConfig) -> Result<SharedMicroController> {
    match config.backend {
        MicroControllerBackend::DryRun => {
            let controller = if config.fixed_pulse_bounds {
                DryRunMicroController::with_fixed_pulse_bounds()
            } else {
                DryRunMicroController::new()
            };
            Ok(microcontroller::shared(controller))
        }
        MicroControllerBackend::Serial => Ok(microcontroller::shared(SerialMicroController::open(
            &config.port,
            config.baud_rate,
        )?)),
    }
}

fn build_axis(
    ids: &mut ServoIdAllocator,
    settings: &ServoSettings,
    config: &Config,
    controller: Option<&SharedMicroController>,
) -> Result<AxisTracker> {
    let mut servo = ServoObject::new(ids.next_id(), settings)?;
    if let Some(controller) = controller {
        servo.attach(controller.clone());
        servo.set_write_through(config.microcontroller.write_through);
    }
    info!("Built {servo:?}");
    Ok(AxisTracker::new(servo, PidController::new(config.pid)?))
}

/// Build the pan/tilt tracker described by `config`
///
/// # Errors
///
/// Returns a configuration error for invalid servo geometry or PID gains
pub fn build_tracker(config: &Config, controller: Option<SharedMicroController>) -> Result<Tracker> {
    let mut ids = ServoIdAllocator::new();
    let pan = if config.tracking.enable_pan {
        Some(build_axis(&mut ids, &config.pan, config, controller.as_ref())?)
    } else {
        None
    };
    let tilt = if config.tracking.enable_tilt {
        Some(build_axis(&mut ids, &config.tilt, config, controller.as_ref())?)
    } else {
        None
    };
    Ok(Tracker::new(
        config.frame_shape()?,
        pan,
        tilt,
        RateLimiter::new(config.tracking.max_servo_updates_per_second)?,
        controller,
    ))
}

fn camera_factory(config: &Config, options: RunOptions) -> Result<CameraFactory> {
    let shape = config.frame_shape()?;
    let fps = config.camera.fps;
    if options.simulate {
        return Ok(Box::new(move || {
            Ok(Box::new(SyntheticCamera::new(shape).with_fps(fps)) as Box<dyn Camera>)
        }));
    }
    device_camera_factory(config)
}

#[cfg(feature = "opencv")]
#[allow(clippy::unnecessary_wraps)]
fn device_camera_factory(config: &Config) -> Result<CameraFactory> {
    let shape = config.frame_shape()?;
    let (index, fps) = (config.camera.index, config.camera.fps);
    Ok(Box::new(move || {
        Ok(Box::new(crate::vision::OpenCvCamera::open(index, shape, fps)?) as Box<dyn Camera>)
    }))
}

#[cfg(not(feature = "opencv"))]
fn device_camera_factory(_config: &Config) -> Result<CameraFactory> {
    Err(crate::Error::Camera(
        "Built without the `opencv` feature; use --simulate".to_string(),
    ))
}

#[cfg(feature = "opencv")]
fn display_factory(options: RunOptions) -> DisplayFactory {
    if options.headless {
        return Box::new(|| Ok(Box::new(NullDisplay::new()) as Box<dyn Display>));
    }
    Box::new(|| Ok(Box::new(crate::vision::HighGuiDisplay::new()?) as Box<dyn Display>))
}

#[cfg(not(feature = "opencv"))]
fn display_factory(options: RunOptions) -> DisplayFactory {
    if !options.headless {
        warn!("Built without the `opencv` feature, running headless");
    }
    Box::new(|| Ok(Box::new(NullDisplay::new()) as Box<dyn Display>))
}

fn detector_factory(config: &Config, options: RunOptions) -> Result<DetectorFactory> {
    if options.simulate {
        return Ok(Box::new(|| {
            Ok(Box::new(BrightRegionDetector::default()) as Box<dyn FaceDetector>)
        }));
    }
    device_detector_factory(config)
}

#[cfg(feature = "opencv")]
#[allow(clippy::unnecessary_wraps)]
fn device_detector_factory(config: &Config) -> Result<DetectorFactory> {
    let path = config.detector.cascade_path.to_string_lossy().into_owned();
    let min_face_size = config.detector.min_face_size;
    Ok(Box::new(move || {
        Ok(Box::new(crate::vision::CascadeFaceDetector::new(&path, min_face_size)?) as Box<dyn FaceDetector>)
    }))
}

#[cfg(not(feature = "opencv"))]
fn device_detector_factory(config: &Config) -> Result<DetectorFactory> {
    Err(crate::Error::Detection(format!(
        "Built without the `opencv` feature, cannot load {}; use --simulate",
        config.detector.cascade_path.display()
    )))
}

/// Supervisor settings derived from the configuration
///
/// # Errors
///
/// Returns a configuration error for zero frame dimensions
pub fn supervisor_settings(config: &Config) -> Result<SupervisorSettings> {
    let mut settings = SupervisorSettings::new(config.frame_shape()?);
    settings.shutdown_grace = Duration::from_millis(config.supervisor.shutdown_grace_ms);
    settings.region_name.clone_from(&config.supervisor.region_name);
    settings.max_camera_failures = config.supervisor.max_camera_failures;
    settings.detector = DetectorSettings {
        downsample_factor: config.detector.downsample_factor,
        max_consecutive_failures: config.detector.max_consecutive_failures,
        ..DetectorSettings::default()
    };
    Ok(settings)
}

/// Validate `config`, build every component and run until shutdown
///
/// # Errors
///
/// Returns configuration and device initialization errors, and any error the
/// supervisor reports
pub fn run(config: &Config, options: RunOptions) -> Result<SupervisorReport> {
    config.validate()?;
    info!("Starting face tracker ({}x{})", config.camera.width, config.camera.height);

    let controller = build_microcontroller(&config.microcontroller)?;
    let tracker = build_tracker(config, Some(controller.clone()))?;
    let pipeline = Pipeline {
        tracker,
        camera: camera_factory(config, options)?,
        display: display_factory(options),
        detector: detector_factory(config, options)?,
    };

    let supervisor = ProcessSupervisor::new(supervisor_settings(config)?);
    if options.handle_signals {
        install_signal_handler(&supervisor.token())?;
    }
    let result = supervisor.run(pipeline);

    match microcontroller::lock(&controller).and_then(|mut mc| mc.close()) {
        Ok(()) => info!("Microcontroller closed"),
        Err(e) => warn!("Failed to close microcontroller: {e}"),
    }
    result
}

/// Default configuration file location
#[must_use]
pub fn default_config_path() -> PathBuf {
    PathBuf::from("face_tracker.yaml")
}
