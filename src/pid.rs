//! Per-axis PID controller and servo update rate limiter.
//!
//! The controller turns a pixel-space tracking error into an angle delta.
//! Errors inside the deadband produce no output and do not accumulate into
//! the integral. The [`RateLimiter`] caps how often the resulting angles are
//! emitted, independently of how fast detections arrive.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Controller gains and limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidGains {
    /// Proportional gain (degrees per pixel)
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
    /// Absolute bound on the accumulated integral
    pub integral_limit: f64,
    /// Errors smaller than this (in pixels) are ignored
    pub minimum_move_size_pixels: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        use crate::constants::{DEFAULT_INTEGRAL_LIMIT, DEFAULT_KD, DEFAULT_KI, DEFAULT_KP, MINIMUM_MOVE_SIZE_PIXELS};
        Self {
            kp: DEFAULT_KP,
            ki: DEFAULT_KI,
            kd: DEFAULT_KD,
            integral_limit: DEFAULT_INTEGRAL_LIMIT,
            minimum_move_size_pixels: MINIMUM_MOVE_SIZE_PIXELS,
        }
    }
}

impl PidGains {
    /// Validate gains
    ///
    /// # Errors
    ///
    /// Returns a configuration error for non-finite gains or negative limits
    pub fn validate(&self) -> Result<()> {
        if ![self.kp, self.ki, self.kd].iter().all(|g| g.is_finite()) {
            return Err(Error::Config("PID gains must be finite".to_string()));
        }
        if !(self.integral_limit.is_finite() && self.integral_limit >= 0.0) {
            return Err(Error::Config("PID integral limit must be a non-negative number".to_string()));
        }
        if !(self.minimum_move_size_pixels.is_finite() && self.minimum_move_size_pixels >= 0.0) {
            return Err(Error::Config("Minimum move size must be a non-negative number".to_string()));
        }
        Ok(())
    }
}

/// Discrete-time PID controller for one axis
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    integral: f64,
    previous_error: Option<f64>,
    previous_time: Option<Instant>,
}

impl PidController {
    /// Create a controller with zeroed state
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the gains are invalid
    pub fn new(gains: PidGains) -> Result<Self> {
        gains.validate()?;
        Ok(Self {
            gains,
            integral: 0.0,
            previous_error: None,
            previous_time: None,
        })
    }

    pub const fn gains(&self) -> &PidGains {
        &self.gains
    }

    /// Accumulated integral error
    pub const fn integral(&self) -> f64 {
        self.integral
    }

    /// Whether `error` falls inside the deadband
    #[must_use]
    pub fn in_deadband(&self, error: f64) -> bool {
        error.abs() < self.gains.minimum_move_size_pixels
    }

    /// Step the controller with an explicit time delta in seconds.
    ///
    /// Returns `0.0` without touching state when the error is inside the
    /// deadband or `dt` is not positive.
    pub fn update_with_dt(&mut self, error: f64, dt: f64) -> f64 {
        if !error.is_finite() || self.in_deadband(error) {
            return 0.0;
        }
        if !(dt.is_finite() && dt > 0.0) {
            return 0.0;
        }

        let limit = self.gains.integral_limit;
        self.integral = error.mul_add(dt, self.integral).clamp(-limit, limit);
        let derivative = self.previous_error.map_or(0.0, |prev| (error - prev) / dt);
        self.previous_error = Some(error);

        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }

    /// Step the controller at wall-clock time `now`.
    ///
    /// The first call after construction or [`PidController::reset`] has no
    /// previous timestamp and uses `fallback_dt`.
    pub fn update(&mut self, error: f64, now: Instant, fallback_dt: Duration) -> f64 {
        if !error.is_finite() || self.in_deadband(error) {
            return 0.0;
        }
        let dt = self
            .previous_time
            .map_or(fallback_dt, |prev| now.saturating_duration_since(prev))
            .as_secs_f64();
        self.previous_time = Some(now);
        self.update_with_dt(error, dt)
    }

    /// Clear integral, previous error and previous timestamp
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
        self.previous_time = None;
    }
}

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Admits at most `max_per_second` events per second
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    /// Create a limiter
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `max_per_second` is zero
    pub fn new(max_per_second: u32) -> Result<Self> {
        if max_per_second == 0 {
            return Err(Error::Config("Servo update rate must be at least 1 per second".to_string()));
        }
        // Rounded up so that N spacings never fit inside one second
        let nanos = NANOS_PER_SECOND.div_ceil(u64::from(max_per_second));
        Ok(Self {
            min_interval: Duration::from_nanos(nanos),
            last: None,
        })
    }

    /// Minimum spacing between admitted events
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Admit an event at `now` if the interval since the last one has elapsed
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forget the last admitted event
    pub fn reset(&mut self) {
        self.last = None;
    }
}
