//! Helper functions and utilities for tests

#![allow(dead_code)]

use face_servo_tracker::{
    frame::FrameShape,
    microcontroller::{DryRunMicroController, SharedMicroController},
    pid::{PidController, PidGains, RateLimiter},
    servo::{ServoIdAllocator, ServoObject, ServoSettings},
    tracking::{AxisTracker, Tracker},
    Result,
};
use std::sync::{Arc, Mutex};

/// Servo with the given angle limits and pulse bounds, otherwise defaults
pub fn create_test_servo(min_angle: f64, max_angle: f64, min_pulse: f64, max_pulse: f64) -> Result<ServoObject> {
    let settings = ServoSettings {
        min_angle,
        max_angle,
        min_pulse_width: min_pulse,
        max_pulse_width: max_pulse,
        ..ServoSettings::default()
    };
    ServoObject::new(ServoIdAllocator::new().next_id(), &settings)
}

/// Proportional-only gains with the given deadband
pub fn proportional_gains(kp: f64, deadband: f64) -> PidGains {
    PidGains {
        kp,
        ki: 0.0,
        kd: 0.0,
        integral_limit: 100.0,
        minimum_move_size_pixels: deadband,
    }
}

/// Dry-run controller kept concrete so tests can inspect its writes
pub fn dry_run() -> (Arc<Mutex<DryRunMicroController>>, SharedMicroController) {
    let concrete = Arc::new(Mutex::new(DryRunMicroController::new()));
    let shared: SharedMicroController = concrete.clone();
    (concrete, shared)
}

/// Two-axis tracker on a 640x480 frame
pub fn create_test_tracker(max_updates_per_second: u32, controller: Option<SharedMicroController>) -> Result<Tracker> {
    let shape = FrameShape::new(480, 640)?;
    let mut ids = ServoIdAllocator::new();
    let mut axes = Vec::with_capacity(2);
    for channel in 0..2u8 {
        let settings = ServoSettings {
            channel,
            ..ServoSettings::default()
        };
        let mut servo = ServoObject::new(ids.next_id(), &settings)?;
        if let Some(controller) = &controller {
            servo.attach(controller.clone());
        }
        axes.push(AxisTracker::new(servo, PidController::new(proportional_gains(0.05, 20.0))?));
    }
    let tilt = axes.pop();
    let pan = axes.pop();
    Ok(Tracker::new(
        shape,
        pan,
        tilt,
        RateLimiter::new(max_updates_per_second)?,
        controller,
    ))
}
