//! Real-time face tracking on a pan/tilt servo mount.
//!
//! A capture loop and a detector loop run side by side and exchange data
//! through two lock-free shared regions:
//! 1. The capture loop publishes every camera frame to a [`shared::SharedFrameBuffer`]
//! 2. The detector loop reads the latest frame, finds a face and publishes its
//!    box to a [`shared::SharedDetectionResult`]
//! 3. The capture loop reads the latest box, turns the pixel offset into angle
//!    deltas with one PID controller per axis, and drives the servos
//!
//! Neither loop waits for the other. The [`supervisor::ProcessSupervisor`]
//! owns the regions and both threads and shuts the rig down cleanly.
//!
//! # Examples
//!
//! ## Servo conversions
//!
//! ```
//! use face_servo_tracker::servo::{ServoIdAllocator, ServoObject, ServoSettings};
//!
//! # fn main() -> face_servo_tracker::Result<()> {
//! let settings = ServoSettings {
//!     min_pulse_width: 1000.0,
//!     max_pulse_width: 2000.0,
//!     ..ServoSettings::default()
//! };
//! let mut ids = ServoIdAllocator::new();
//! let mut servo = ServoObject::new(ids.next_id(), &settings)?;
//!
//! servo.set_angle(90.0)?;
//! assert_eq!(servo.pulse_width(), 2000.0);
//! assert_eq!(servo.value(), 1.0);
//!
//! // Out-of-range angles are clamped
//! servo.set_angle(140.0)?;
//! assert_eq!(servo.angle(), 90.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Simulated run
//!
//! ```no_run
//! use face_servo_tracker::{app::{self, RunOptions}, config::Config};
//!
//! # fn main() -> face_servo_tracker::Result<()> {
//! let options = RunOptions { headless: true, simulate: true, handle_signals: true };
//! let report = app::run(&Config::default(), options)?;
//! println!("{} frames captured", report.capture.frames_captured);
//! # Ok(())
//! # }
//! ```

/// Servo angle, pulse width and value conversions
pub mod servo;

/// Microcontroller backends driving the servos
pub mod microcontroller;

/// PID controller and servo update rate limiter
pub mod pid;

/// Detection to servo angle glue
pub mod tracking;

/// Frames and bounding boxes
pub mod frame;

/// Shared memory regions between the loops
pub mod shared;

/// Camera, display and detector interfaces
pub mod devices;

/// Synthetic devices for headless runs and tests
pub mod sim;

/// `OpenCV` device backends
#[cfg(feature = "opencv")]
pub mod vision;

/// Loop state machine and cancellation
pub mod lifecycle;

/// Capture and display loop
pub mod capture;

/// Detector loop
pub mod detector;

/// Thread supervision and signal handling
pub mod supervisor;

/// Utility functions for numeric conversions and box geometry
pub mod utils;

/// Error types and result handling
pub mod error;

/// Main application module
pub mod app;

/// Constants used throughout the application
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
