//! Configuration management for the face tracking rig

use crate::{
    constants::{
        DEFAULT_DOWNSAMPLE_FACTOR, DEFAULT_FPS, DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH, DEFAULT_MAX_CAMERA_FAILURES,
        DEFAULT_SHUTDOWN_GRACE_MS, MAX_SERVO_UPDATES_PER_SECOND,
    },
    frame::FrameShape,
    pid::PidGains,
    servo::ServoSettings,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera configuration
    pub camera: CameraConfig,

    /// Pan (horizontal) servo
    pub pan: ServoSettings,

    /// Tilt (vertical) servo
    pub tilt: ServoSettings,

    /// PID gains shared by both axes
    pub pid: PidGains,

    /// Tracking loop configuration
    pub tracking: TrackingConfig,

    /// Detector configuration
    pub detector: DetectorConfig,

    /// Servo output backend
    pub microcontroller: MicroControllerConfig,

    /// Supervisor and shared memory configuration
    pub supervisor: SupervisorConfig,
}

/// Camera parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Webcam index
    pub index: i32,

    /// Frame width in pixels
    pub width: usize,

    /// Frame height in pixels
    pub height: usize,

    /// Requested frame rate
    pub fps: f64,
}

/// Tracking loop parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Upper bound on servo updates per second
    pub max_servo_updates_per_second: u32,

    /// Drive the pan axis
    pub enable_pan: bool,

    /// Drive the tilt axis
    pub enable_tilt: bool,
}

/// Detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Integer downsampling before detection
    pub downsample_factor: usize,

    /// Haar cascade XML used by the `OpenCV` detector
    pub cascade_path: PathBuf,

    /// Smallest face side in downsampled pixels
    pub min_face_size: u32,

    /// Consecutive detector failures tolerated
    pub max_consecutive_failures: u32,
}

/// Servo output backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MicroControllerBackend {
    /// Log pulse commands only
    #[default]
    DryRun,
    /// Serial line protocol
    Serial,
}

/// Microcontroller parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicroControllerConfig {
    /// Which backend drives the servos
    pub backend: MicroControllerBackend,

    /// Serial device path
    pub port: String,

    /// Serial baud rate
    pub baud_rate: u32,

    /// Hardware line with fixed pulse bounds
    pub fixed_pulse_bounds: bool,

    /// Push every angle change immediately instead of batching per tick
    pub write_through: bool,
}

/// Supervisor parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Grace period for stopping threads
    pub shutdown_grace_ms: u64,

    /// Consecutive camera failures before capture stops
    pub max_camera_failures: u32,

    /// Name the shared regions so other processes can attach
    pub region_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            pan: ServoSettings::default(),
            tilt: ServoSettings {
                min_angle: -60.0,
                max_angle: 60.0,
                channel: 1,
                ..ServoSettings::default()
            },
            pid: PidGains::default(),
            tracking: TrackingConfig::default(),
            detector: DetectorConfig::default(),
            microcontroller: MicroControllerConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            fps: DEFAULT_FPS,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_servo_updates_per_second: MAX_SERVO_UPDATES_PER_SECOND,
            enable_pan: true,
            enable_tilt: true,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            downsample_factor: DEFAULT_DOWNSAMPLE_FACTOR,
            cascade_path: PathBuf::from("assets/haarcascade_frontalface_default.xml"),
            min_face_size: 30,
            max_consecutive_failures: DEFAULT_MAX_CAMERA_FAILURES,
        }
    }
}

impl Default for MicroControllerConfig {
    fn default() -> Self {
        Self {
            backend: MicroControllerBackend::DryRun,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            fixed_pulse_bounds: false,
            write_through: false,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            max_camera_failures: DEFAULT_MAX_CAMERA_FAILURES,
            region_name: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the text is not valid YAML for [`Config`]
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Render configuration as YAML
    ///
    /// # Errors
    ///
    /// Returns a configuration error if serialization fails
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))
    }

    /// Frame shape shared by the camera and the shared regions
    ///
    /// # Errors
    ///
    /// Returns a configuration error for zero dimensions
    pub fn frame_shape(&self) -> Result<FrameShape> {
        FrameShape::new(self.camera.height, self.camera.width)
    }

    /// Validate configuration
    ///
    /// Servo geometry is validated when the servos are built.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        let shape = self.frame_shape()?;
        if !(self.camera.fps.is_finite() && self.camera.fps > 0.0) {
            return Err(Error::Config("Camera FPS must be greater than 0".to_string()));
        }

        self.pid.validate()?;
        if self.tracking.max_servo_updates_per_second == 0 {
            return Err(Error::Config(
                "Max servo updates per second must be greater than 0".to_string(),
            ));
        }

        if self.detector.downsample_factor == 0 {
            return Err(Error::Config("Downsample factor must be at least 1".to_string()));
        }
        if shape.downsampled(self.detector.downsample_factor).is_err() {
            return Err(Error::Config(format!(
                "Downsample factor {} is too large for {}x{} frames",
                self.detector.downsample_factor, shape.width, shape.height
            )));
        }

        if self.pan.channel == self.tilt.channel && self.tracking.enable_pan && self.tracking.enable_tilt {
            return Err(Error::Config(format!(
                "Pan and tilt servos share channel {}",
                self.pan.channel
            )));
        }

        if self.microcontroller.backend == MicroControllerBackend::Serial {
            if self.microcontroller.port.is_empty() {
                return Err(Error::Config("Serial backend needs a port".to_string()));
            }
            if self.microcontroller.baud_rate == 0 {
                return Err(Error::Config("Baud rate must be greater than 0".to_string()));
            }
        }

        if let Some(name) = &self.supervisor.region_name {
            if name.is_empty() || name.contains('/') {
                return Err(Error::Config(format!("Invalid region name '{name}'")));
            }
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Face Tracker Configuration

# Camera
camera:
  index: 0
  width: 640
  height: 480
  fps: 30.0

# Pan (horizontal) servo
pan:
  min_angle: -90.0
  max_angle: 90.0
  servo_range: 180.0
  angle_format: minus_to_plus
  center_angle_offset: 0.0
  min_pulse_width: 500.0
  max_pulse_width: 2500.0
  flip: false
  step_size: 1.0
  channel: 0

# Tilt (vertical) servo
tilt:
  min_angle: -60.0
  max_angle: 60.0
  servo_range: 180.0
  angle_format: minus_to_plus
  center_angle_offset: 0.0
  min_pulse_width: 500.0
  max_pulse_width: 2500.0
  flip: true
  step_size: 1.0
  channel: 1

# PID gains, shared by both axes
pid:
  kp: 0.03
  ki: 0.0
  kd: 0.002
  integral_limit: 500.0
  minimum_move_size_pixels: 20.0

# Tracking loop
tracking:
  max_servo_updates_per_second: 10
  enable_pan: true
  enable_tilt: true

# Detector
detector:
  downsample_factor: 2
  cascade_path: "assets/haarcascade_frontalface_default.xml"
  min_face_size: 30
  max_consecutive_failures: 30

# Servo output: dry_run or serial
microcontroller:
  backend: dry_run
  port: "/dev/ttyUSB0"
  baud_rate: 115200
  fixed_pulse_bounds: false
  write_through: false

# Supervisor
supervisor:
  shutdown_grace_ms: 2000
  max_camera_failures: 30
"#;
