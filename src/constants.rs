//! Constants used throughout the application

/// Bytes per pixel of a BGR frame
pub const FRAME_CHANNELS: usize = 3;

/// Default capture resolution
pub const DEFAULT_FRAME_WIDTH: usize = 640;
pub const DEFAULT_FRAME_HEIGHT: usize = 480;

/// Default frames per second assumption
pub const DEFAULT_FPS: f64 = 30.0;

/// Tracking error below this many pixels is ignored
pub const MINIMUM_MOVE_SIZE_PIXELS: f64 = 20.0;

/// Upper bound on servo angle writes per second
pub const MAX_SERVO_UPDATES_PER_SECOND: u32 = 10;

/// Default PID gains (degrees per pixel)
pub const DEFAULT_KP: f64 = 0.03;
pub const DEFAULT_KI: f64 = 0.0;
pub const DEFAULT_KD: f64 = 0.002;

/// Integral term clamp
pub const DEFAULT_INTEGRAL_LIMIT: f64 = 500.0;

/// Standard hobby servo pulse bounds in microseconds
pub const DEFAULT_MIN_PULSE_WIDTH: f64 = 500.0;
pub const DEFAULT_MAX_PULSE_WIDTH: f64 = 2500.0;

/// Default mechanical span of a hobby servo in degrees
pub const DEFAULT_SERVO_RANGE: f64 = 180.0;

/// Detector downsampling factor
pub const DEFAULT_DOWNSAMPLE_FACTOR: usize = 2;

/// Consecutive camera failures tolerated before capture stops
pub const DEFAULT_MAX_CAMERA_FAILURES: u32 = 30;

/// Pause after a failed camera read before trying again
pub const CAMERA_RETRY_MS: u64 = 10;

/// Batches the dry-run backend keeps for inspection
pub const DRY_RUN_HISTORY: usize = 64;

/// Time a stopping thread gets before the supervisor gives up on it
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2000;

/// Supervisor poll interval while waiting on the pipeline threads
pub const SUPERVISOR_POLL_MS: u64 = 20;

/// Sentinel stored in every box field when no detection is present
pub const ABSENT_SENTINEL: i64 = i64::MIN;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-9;
