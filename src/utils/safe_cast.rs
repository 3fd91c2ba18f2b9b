//! Safe casting utilities for pixel coordinates and pulse widths

use crate::{Error, Result};

/// Safely convert usize to i32 with overflow checking
///
/// # Errors
///
/// Returns an error if the value exceeds i32::MAX
pub fn usize_to_i32(value: usize) -> Result<i32> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Value {value} too large to fit in i32")))
}

/// Safely convert usize to i64 with overflow checking
///
/// # Errors
///
/// Returns an error if the value exceeds i64::MAX
pub fn usize_to_i64(value: usize) -> Result<i64> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Value {value} too large to fit in i64")))
}

/// Safely convert f64 to i64 with bounds checking
///
/// # Errors
///
/// Returns an error if the value is not finite or outside i64 range
#[allow(clippy::cast_precision_loss)] // MIN/MAX bounds checking is approximate
#[allow(clippy::cast_possible_truncation)] // Truncation after bounds check is safe
pub fn f64_to_i64(value: f64) -> Result<i64> {
    if value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Ok(value as i64)
    } else {
        Err(Error::InvalidInput(format!(
            "Value {value} cannot be safely converted to i64"
        )))
    }
}

/// Round a pulse width in microseconds to the integer the hardware consumes
///
/// # Errors
///
/// Returns an error if the value is not finite, negative, or above u32::MAX
#[allow(clippy::cast_possible_truncation)] // Rounded and range checked
#[allow(clippy::cast_sign_loss)] // Negative values rejected above
pub fn pulse_width_to_u32(value: f64) -> Result<u32> {
    let rounded = value.round();
    if rounded.is_finite() && rounded >= 0.0 && rounded <= f64::from(u32::MAX) {
        Ok(rounded as u32)
    } else {
        Err(Error::InvalidInput(format!(
            "Pulse width {value} cannot be sent to hardware"
        )))
    }
}

/// Clamp an i64 pixel coordinate into `[min, max]` and convert to usize
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Clamped into usize range first
#[allow(clippy::cast_sign_loss)] // Clamped to non-negative first
pub fn i64_to_usize_clamp(value: i64, min: usize, max: usize) -> usize {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    let lo = i64::try_from(min).unwrap_or(i64::MAX);
    let hi = i64::try_from(max).unwrap_or(i64::MAX);
    value.clamp(lo, hi) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_usize_to_i32() {
        assert_eq!(usize_to_i32(42).unwrap(), 42);
        assert_eq!(usize_to_i32(0).unwrap(), 0);
        assert_eq!(usize_to_i32(i32::MAX as usize).unwrap(), i32::MAX);

        // On 64-bit systems, this should fail
        if std::mem::size_of::<usize>() > 4 {
            assert!(usize_to_i32(i32::MAX as usize + 1).is_err());
        }
    }

    #[test]
    fn test_f64_to_i64() {
        assert_eq!(f64_to_i64(42.9).unwrap(), 42);
        assert_eq!(f64_to_i64(-42.9).unwrap(), -42);
        assert!(f64_to_i64(f64::NAN).is_err());
        assert!(f64_to_i64(f64::INFINITY).is_err());
        assert!(f64_to_i64(1e30).is_err());
    }

    #[test]
    fn test_pulse_width_to_u32() {
        assert_eq!(pulse_width_to_u32(1499.6).unwrap(), 1500);
        assert_eq!(pulse_width_to_u32(0.2).unwrap(), 0);
        assert!(pulse_width_to_u32(-3.0).is_err());
        assert!(pulse_width_to_u32(f64::NAN).is_err());
    }

    #[test]
    fn test_i64_to_usize_clamp() {
        assert_eq!(i64_to_usize_clamp(-5, 0, 639), 0);
        assert_eq!(i64_to_usize_clamp(700, 0, 639), 639);
        assert_eq!(i64_to_usize_clamp(320, 0, 639), 320);
        assert_eq!(i64_to_usize_clamp(i64::MIN, 10, 0), 0);
    }

    proptest! {
        #[test]
        fn prop_i64_to_usize_clamp_always_within_bounds(
            value in any::<i64>(),
            min in 0usize..10_000,
            max in 0usize..10_000
        ) {
            let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
            let result = i64_to_usize_clamp(value, min, max);
            prop_assert!(result >= lo);
            prop_assert!(result <= hi);
        }

        #[test]
        fn prop_f64_to_i64_integral_values(value in -1_000_000_000i64..1_000_000_000) {
            #[allow(clippy::cast_precision_loss)]
            let as_f64 = value as f64;
            prop_assert_eq!(f64_to_i64(as_f64).unwrap(), value);
        }
    }
}
