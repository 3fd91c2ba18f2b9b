//! PID deadband and servo update rate limiting

mod test_helpers;

use face_servo_tracker::{
    constants::MAX_SERVO_UPDATES_PER_SECOND,
    frame::BoundingBox,
    pid::{PidController, RateLimiter},
    tracking::TrackingOutcome,
};
use proptest::prelude::*;
use std::time::{Duration, Instant};
use test_helpers::{create_test_tracker, dry_run, proportional_gains};

/// Box whose center is `dx` pixels right of and `dy` below the center of a 640x480 frame
fn box_at_offset(dx: i64, dy: i64) -> BoundingBox {
    let (cx, cy) = (320 + dx, 240 + dy);
    BoundingBox::new(cy - 40, cx + 40, cy + 40, cx - 40)
}

#[test]
fn test_deadband() {
    let mut pid = PidController::new(proportional_gains(0.1, 20.0)).unwrap();
    assert_eq!(pid.update_with_dt(10.0, 0.1), 0.0);
    assert_eq!(pid.integral(), 0.0);
    assert_ne!(pid.update_with_dt(25.0, 0.1), 0.0);
}

#[test]
fn test_deadband_applies_before_rate_limit() {
    let mut tracker = create_test_tracker(MAX_SERVO_UPDATES_PER_SECOND, None).unwrap();
    let t0 = Instant::now();

    // Jitter inside the deadband does not consume the rate budget
    let outcome = tracker.on_detection(Some(box_at_offset(5, -5)), t0).unwrap();
    assert_eq!(outcome, TrackingOutcome::Deadband);
    let outcome = tracker
        .on_detection(Some(box_at_offset(100, 0)), t0 + Duration::from_millis(1))
        .unwrap();
    assert!(matches!(outcome, TrackingOutcome::Moved { .. }));
}

#[test]
fn test_rate_limit_over_one_second_window() {
    let (concrete, controller) = dry_run();
    let mut tracker = create_test_tracker(MAX_SERVO_UPDATES_PER_SECOND, Some(controller)).unwrap();
    let initial_writes = concrete.lock().unwrap().write_count();

    let t0 = Instant::now();
    let mut moved = 0;
    // One detection per millisecond across [0, 1000) ms, alternating sides
    for ms in 0..1000u64 {
        let dx = if ms % 2 == 0 { 150 } else { -150 };
        let outcome = tracker
            .on_detection(Some(box_at_offset(dx, 80)), t0 + Duration::from_millis(ms))
            .unwrap();
        if matches!(outcome, TrackingOutcome::Moved { .. }) {
            moved += 1;
        }
    }

    assert!(moved <= MAX_SERVO_UPDATES_PER_SECOND);
    assert_eq!(moved, MAX_SERVO_UPDATES_PER_SECOND);
    assert_eq!(tracker.updates_emitted(), u64::from(MAX_SERVO_UPDATES_PER_SECOND));
    let writes = concrete.lock().unwrap().write_count() - initial_writes;
    assert!(writes <= u64::from(MAX_SERVO_UPDATES_PER_SECOND));
}

#[test]
fn test_no_target_leaves_servos_alone() {
    let (concrete, controller) = dry_run();
    let mut tracker = create_test_tracker(10, Some(controller)).unwrap();
    let before = tracker.angles();
    let t0 = Instant::now();
    for ms in 0..50 {
        let outcome = tracker.on_detection(None, t0 + Duration::from_millis(ms)).unwrap();
        assert_eq!(outcome, TrackingOutcome::NoTarget);
    }
    assert_eq!(tracker.angles(), before);
    assert_eq!(concrete.lock().unwrap().write_count(), 0);
}

#[test]
fn test_tracking_moves_toward_target() {
    let mut tracker = create_test_tracker(10, None).unwrap();
    let t0 = Instant::now();
    // Target right of and above center
    tracker.on_detection(Some(box_at_offset(200, -100)), t0).unwrap();
    let (pan, tilt) = tracker.angles();
    assert!(pan.unwrap() > 0.0);
    assert!(tilt.unwrap() < 0.0);
}

#[test]
fn test_recenter_resets_state() {
    let (concrete, controller) = dry_run();
    let mut tracker = create_test_tracker(10, Some(controller)).unwrap();
    tracker.on_detection(Some(box_at_offset(200, 100)), Instant::now()).unwrap();
    tracker.recenter().unwrap();

    assert_eq!(tracker.angles(), (Some(0.0), Some(0.0)));
    let controller = concrete.lock().unwrap();
    let last = controller.last_write().unwrap();
    // Both channels are pushed at center (1500us)
    assert_eq!(last.len(), 2);
    assert!(last.iter().all(|c| c.pulse_width == 1500));
}

proptest! {
    #[test]
    fn prop_rate_limiter_never_exceeds_budget(
        max_per_second in 1u32..50,
        mut ticks in proptest::collection::vec(0u64..1000, 1..400),
    ) {
        ticks.sort_unstable();
        let mut limiter = RateLimiter::new(max_per_second).unwrap();
        let t0 = Instant::now();
        let admitted = ticks
            .iter()
            .filter(|&&ms| limiter.try_acquire(t0 + Duration::from_millis(ms)))
            .count();
        prop_assert!(admitted <= max_per_second as usize);
    }

    #[test]
    fn prop_rate_limiter_budget_at_nanosecond_resolution(
        max_per_second in 1u32..200,
        offset in 0u64..1_000,
    ) {
        // Ticks at the truncated spacing pack the densest schedule into one second
        let step = 1_000_000_000u64 / u64::from(max_per_second);
        let mut limiter = RateLimiter::new(max_per_second).unwrap();
        let t0 = Instant::now();
        let admitted = (0..=u64::from(max_per_second))
            .map(|i| offset + i * step)
            .filter(|&ns| ns < offset + 1_000_000_000)
            .filter(|&ns| limiter.try_acquire(t0 + Duration::from_nanos(ns)))
            .count();
        prop_assert!(admitted <= max_per_second as usize);
    }

    #[test]
    fn prop_deadband_blocks_small_errors(error in -19.999f64..19.999, dt in 0.001f64..1.0) {
        let mut pid = PidController::new(proportional_gains(1.0, 20.0)).unwrap();
        prop_assert_eq!(pid.update_with_dt(error, dt), 0.0);
        prop_assert_eq!(pid.integral(), 0.0);
    }
}
