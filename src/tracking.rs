//! Tracking loop glue: detection → pixel offset → PID → servo angles.
//!
//! Deadband is applied first (it suppresses PID accumulation), then the rate
//! limiter throttles how many angle updates are emitted per second.

use crate::{
    frame::{BoundingBox, FrameShape},
    microcontroller::SharedMicroController,
    pid::{PidController, RateLimiter},
    servo::{flush_all, ServoObject},
    utils::offset_from_center,
    Result,
};
use log::{debug, info};
use std::time::{Duration, Instant};

/// One tracked axis: a servo driven by its own PID controller
#[derive(Debug)]
pub struct AxisTracker {
    servo: ServoObject,
    pid: PidController,
}

impl AxisTracker {
    #[must_use]
    pub const fn new(servo: ServoObject, pid: PidController) -> Self {
        Self { servo, pid }
    }

    pub const fn servo(&self) -> &ServoObject {
        &self.servo
    }

    pub fn servo_mut(&mut self) -> &mut ServoObject {
        &mut self.servo
    }

    pub const fn pid(&self) -> &PidController {
        &self.pid
    }

    fn step(&mut self, error: f64, now: Instant, fallback_dt: Duration) -> Result<()> {
        let delta = self.pid.update(error, now, fallback_dt);
        if delta != 0.0 {
            self.servo.set_angle(self.servo.angle() + delta)?;
        }
        Ok(())
    }
}

/// Result of feeding one detection into the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackingOutcome {
    /// No detection available
    NoTarget,
    /// Target is close enough to the center on every axis
    Deadband,
    /// Update dropped to respect the servo update rate
    RateLimited,
    /// Angles updated
    Moved {
        pan_angle: Option<f64>,
        tilt_angle: Option<f64>,
    },
}

/// Pan/tilt tracker
pub struct Tracker {
    shape: FrameShape,
    pan: Option<AxisTracker>,
    tilt: Option<AxisTracker>,
    limiter: RateLimiter,
    controller: Option<SharedMicroController>,
    fallback_dt: Duration,
    updates_emitted: u64,
}

impl Tracker {
    /// Build a tracker for a frame shape; either axis may be disabled
    #[must_use]
    pub fn new(
        shape: FrameShape,
        pan: Option<AxisTracker>,
        tilt: Option<AxisTracker>,
        limiter: RateLimiter,
        controller: Option<SharedMicroController>,
    ) -> Self {
        let fallback_dt = limiter.min_interval();
        Self {
            shape,
            pan,
            tilt,
            limiter,
            controller,
            fallback_dt,
            updates_emitted: 0,
        }
    }

    pub const fn pan(&self) -> Option<&AxisTracker> {
        self.pan.as_ref()
    }

    pub const fn tilt(&self) -> Option<&AxisTracker> {
        self.tilt.as_ref()
    }

    /// Number of angle updates emitted so far
    pub const fn updates_emitted(&self) -> u64 {
        self.updates_emitted
    }

    /// Current `(pan, tilt)` angles
    #[must_use]
    pub fn angles(&self) -> (Option<f64>, Option<f64>) {
        (
            self.pan.as_ref().map(|a| a.servo.angle()),
            self.tilt.as_ref().map(|a| a.servo.angle()),
        )
    }

    fn in_deadband(&self, dx: f64, dy: f64) -> bool {
        let pan_idle = self.pan.as_ref().map_or(true, |a| a.pid.in_deadband(dx));
        let tilt_idle = self.tilt.as_ref().map_or(true, |a| a.pid.in_deadband(dy));
        pan_idle && tilt_idle
    }

    /// Feed the latest detection at time `now`
    ///
    /// # Errors
    ///
    /// Returns a connection error if the microcontroller is closed when the
    /// new angles are pushed.
    pub fn on_detection(&mut self, detection: Option<BoundingBox>, now: Instant) -> Result<TrackingOutcome> {
        let Some(bbox) = detection else {
            return Ok(TrackingOutcome::NoTarget);
        };

        let (dx, dy) = offset_from_center(&bbox, self.shape);
        if self.in_deadband(dx, dy) {
            return Ok(TrackingOutcome::Deadband);
        }
        if !self.limiter.try_acquire(now) {
            return Ok(TrackingOutcome::RateLimited);
        }

        if let Some(pan) = &mut self.pan {
            pan.step(dx, now, self.fallback_dt)?;
        }
        if let Some(tilt) = &mut self.tilt {
            tilt.step(dy, now, self.fallback_dt)?;
        }
        self.updates_emitted += 1;
        self.flush()?;

        let (pan_angle, tilt_angle) = self.angles();
        debug!("offset ({dx:.1}, {dy:.1}) -> pan {pan_angle:?} tilt {tilt_angle:?}");
        Ok(TrackingOutcome::Moved { pan_angle, tilt_angle })
    }

    /// Operator recentre: clear PID state and move both axes to center
    ///
    /// # Errors
    ///
    /// Returns a connection error if the microcontroller is closed
    pub fn recenter(&mut self) -> Result<()> {
        info!("Recentering servos");
        for axis in [&mut self.pan, &mut self.tilt].into_iter().flatten() {
            axis.pid.reset();
            axis.servo.to_center()?;
        }
        self.limiter.reset();
        self.flush()
    }

    /// Push dirty servos to the microcontroller, if one is attached
    ///
    /// # Errors
    ///
    /// Returns a connection error if the microcontroller is closed
    pub fn flush(&mut self) -> Result<()> {
        let Some(controller) = &self.controller else {
            return Ok(());
        };
        let mut servos: Vec<&mut ServoObject> = [&mut self.pan, &mut self.tilt]
            .into_iter()
            .flatten()
            .map(|axis| &mut axis.servo)
            .collect();
        flush_all(controller, &mut servos)?;
        Ok(())
    }
}
