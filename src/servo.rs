//! Servo axis model: angle, pulse width and normalized value views of one
//! physical servo.
//!
//! A [`ServoObject`] owns a single authoritative `angle`. The `pulse_width`
//! and `value` views are derived from it through [`translate`], a linear map
//! between two ranges that is exact at both endpoints. Writing any view
//! converts back to an angle and clamps it to `[min_angle, max_angle]`.

use crate::{
    microcontroller::{self, PulseCommand, SharedMicroController},
    utils::safe_cast::pulse_width_to_u32,
    Error, Result,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate convention for servo angles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AngleFormat {
    /// Neutral at 0, angles in `[-range/2, range/2]`
    #[default]
    MinusToPlus,
    /// Neutral at `range/2`, angles in `[0, range]`
    ZeroToRange,
}

impl AngleFormat {
    /// `(servo_min, servo_max, center_angle)` for a servo range
    #[must_use]
    pub fn bounds(self, servo_range: f64) -> (f64, f64, f64) {
        match self {
            Self::MinusToPlus => (-servo_range / 2.0, servo_range / 2.0, 0.0),
            Self::ZeroToRange => (0.0, servo_range, servo_range / 2.0),
        }
    }
}

/// Identifier of one servo, unique within its allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServoId(u32);

impl ServoId {
    /// Raw identifier
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ServoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "servo#{}", self.0)
    }
}

/// Issues servo identifiers; owned by whatever builds the servos
#[derive(Debug, Default)]
pub struct ServoIdAllocator {
    next: u32,
}

impl ServoIdAllocator {
    /// Allocator starting at 0
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Next unused identifier
    pub fn next_id(&mut self) -> ServoId {
        let id = ServoId(self.next);
        self.next += 1;
        id
    }
}

/// Map `x` linearly from `from` to `to`, reversing direction when `flip` is set.
///
/// `from.0` maps to `to.0` and `from.1` maps to `to.1` exactly (swapped when
/// flipped). Callers guarantee `from.0 != from.1`.
#[must_use]
pub fn translate(x: f64, from: (f64, f64), to: (f64, f64), flip: bool) -> f64 {
    let mut t = (x - from.0) / (from.1 - from.0);
    if flip {
        t = 1.0 - t;
    }
    to.0.mul_add(1.0 - t, to.1 * t)
}

/// Construction parameters for a [`ServoObject`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoSettings {
    pub min_angle: f64,
    pub max_angle: f64,
    pub servo_range: f64,
    pub angle_format: AngleFormat,
    /// Defaults to the center angle when `None`
    pub initial_angle: Option<f64>,
    pub center_angle_offset: f64,
    pub min_pulse_width: f64,
    pub max_pulse_width: f64,
    pub flip: bool,
    pub step_size: f64,
    /// Output channel on the microcontroller
    pub channel: u8,
}

impl Default for ServoSettings {
    fn default() -> Self {
        Self {
            min_angle: -90.0,
            max_angle: 90.0,
            servo_range: crate::constants::DEFAULT_SERVO_RANGE,
            angle_format: AngleFormat::MinusToPlus,
            initial_angle: None,
            center_angle_offset: 0.0,
            min_pulse_width: crate::constants::DEFAULT_MIN_PULSE_WIDTH,
            max_pulse_width: crate::constants::DEFAULT_MAX_PULSE_WIDTH,
            flip: false,
            step_size: 1.0,
            channel: 0,
        }
    }
}

/// One physical servo axis
pub struct ServoObject {
    id: ServoId,
    channel: u8,
    min_angle: f64,
    max_angle: f64,
    servo_range: f64,
    angle_format: AngleFormat,
    initial_angle: f64,
    center_angle: f64,
    servo_min: f64,
    servo_max: f64,
    center_angle_offset: f64,
    min_pulse_width: f64,
    max_pulse_width: f64,
    flip: bool,
    step_size: f64,
    angle: f64,
    dirty: bool,
    write_through: bool,
    controller: Option<SharedMicroController>,
}

impl fmt::Debug for ServoObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServoObject")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("angle", &self.angle)
            .field("min_angle", &self.min_angle)
            .field("max_angle", &self.max_angle)
            .field("servo_min", &self.servo_min)
            .field("servo_max", &self.servo_max)
            .field("center_angle_offset", &self.center_angle_offset)
            .field("pulse_bounds", &(self.min_pulse_width, self.max_pulse_width))
            .field("flip", &self.flip)
            .field("dirty", &self.dirty)
            .field("write_through", &self.write_through)
            .field("attached", &self.controller.is_some())
            .finish()
    }
}

fn require_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be finite, got {value}")))
    }
}

impl ServoObject {
    /// Build and validate a servo
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `max_angle - min_angle > servo_range`,
    /// when the angle limits fall outside the format's bounds, or when the
    /// pulse bounds are not increasing.
    pub fn new(id: ServoId, settings: &ServoSettings) -> Result<Self> {
        for (name, value) in [
            ("min_angle", settings.min_angle),
            ("max_angle", settings.max_angle),
            ("servo_range", settings.servo_range),
            ("center_angle_offset", settings.center_angle_offset),
            ("min_pulse_width", settings.min_pulse_width),
            ("max_pulse_width", settings.max_pulse_width),
            ("step_size", settings.step_size),
        ] {
            require_finite(name, value)?;
        }

        if settings.servo_range <= 0.0 {
            return Err(Error::Config(format!(
                "servo_range must be positive, got {}",
                settings.servo_range
            )));
        }
        if settings.min_angle > settings.max_angle {
            return Err(Error::Config(format!(
                "min_angle {} is greater than max_angle {}",
                settings.min_angle, settings.max_angle
            )));
        }
        let span = settings.max_angle - settings.min_angle;
        if span > settings.servo_range {
            return Err(Error::Config(format!(
                "Angle span {span} (max_angle - min_angle) exceeds servo_range {}",
                settings.servo_range
            )));
        }

        let (servo_min, servo_max, center_angle) = settings.angle_format.bounds(settings.servo_range);
        if settings.min_angle < servo_min || settings.max_angle > servo_max {
            return Err(Error::Config(format!(
                "Angle limits [{}, {}] fall outside {:?} bounds [{servo_min}, {servo_max}]",
                settings.min_angle, settings.max_angle, settings.angle_format
            )));
        }
        Self::check_pulse_bounds(settings.min_pulse_width, settings.max_pulse_width)?;

        let initial_angle = settings
            .initial_angle
            .unwrap_or(center_angle)
            .clamp(settings.min_angle, settings.max_angle);
        require_finite("initial_angle", initial_angle)?;

        let mut servo = Self {
            id,
            channel: settings.channel,
            min_angle: settings.min_angle,
            max_angle: settings.max_angle,
            servo_range: settings.servo_range,
            angle_format: settings.angle_format,
            initial_angle,
            center_angle,
            servo_min,
            servo_max,
            center_angle_offset: 0.0,
            min_pulse_width: settings.min_pulse_width,
            max_pulse_width: settings.max_pulse_width,
            flip: settings.flip,
            step_size: settings.step_size,
            angle: initial_angle,
            dirty: true,
            write_through: false,
            controller: None,
        };
        servo.set_center_angle_offset(settings.center_angle_offset)?;
        servo.angle = servo.initial_angle;

        debug!("Created {:?}", servo);
        Ok(servo)
    }

    fn check_pulse_bounds(min: f64, max: f64) -> Result<()> {
        if min.is_finite() && max.is_finite() && min >= 0.0 && min < max {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Pulse width bounds must satisfy 0 <= min < max, got [{min}, {max}]"
            )))
        }
    }

    /// Bind a microcontroller; write-through stays as configured
    pub fn attach(&mut self, controller: SharedMicroController) {
        self.controller = Some(controller);
    }

    /// Drop the microcontroller binding
    pub fn detach(&mut self) -> Option<SharedMicroController> {
        self.controller.take()
    }

    /// Push every angle write straight to the microcontroller
    pub fn set_write_through(&mut self, enabled: bool) {
        self.write_through = enabled;
    }

    pub const fn write_through(&self) -> bool {
        self.write_through
    }

    pub const fn id(&self) -> ServoId {
        self.id
    }

    pub const fn channel(&self) -> u8 {
        self.channel
    }

    pub const fn min_angle(&self) -> f64 {
        self.min_angle
    }

    pub const fn max_angle(&self) -> f64 {
        self.max_angle
    }

    pub const fn servo_range(&self) -> f64 {
        self.servo_range
    }

    pub const fn angle_format(&self) -> AngleFormat {
        self.angle_format
    }

    pub const fn initial_angle(&self) -> f64 {
        self.initial_angle
    }

    pub const fn center_angle(&self) -> f64 {
        self.center_angle
    }

    pub const fn servo_min(&self) -> f64 {
        self.servo_min
    }

    pub const fn servo_max(&self) -> f64 {
        self.servo_max
    }

    pub const fn center_angle_offset(&self) -> f64 {
        self.center_angle_offset
    }

    pub const fn min_pulse_width(&self) -> f64 {
        self.min_pulse_width
    }

    pub const fn max_pulse_width(&self) -> f64 {
        self.max_pulse_width
    }

    pub const fn flip(&self) -> bool {
        self.flip
    }

    pub const fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Current angle in domain units
    pub const fn angle(&self) -> f64 {
        self.angle
    }

    /// True when the angle changed since the last hardware push
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Current pulse width in microseconds
    #[must_use]
    pub fn pulse_width(&self) -> f64 {
        translate(
            self.angle,
            (self.servo_min, self.servo_max),
            (self.min_pulse_width, self.max_pulse_width),
            self.flip,
        )
    }

    /// Current position normalized to `[-1, 1]`
    #[must_use]
    pub fn value(&self) -> f64 {
        translate(self.angle, (self.servo_min, self.servo_max), (-1.0, 1.0), self.flip)
    }

    /// Set the angle, clamped to `[min_angle, max_angle]`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error for non-finite angles (state unchanged).
    /// With write-through enabled, returns a connection error if the
    /// microcontroller is closed; the in-memory angle is updated regardless.
    pub fn set_angle(&mut self, angle: f64) -> Result<()> {
        if !angle.is_finite() {
            return Err(Error::InvalidInput(format!("Angle must be finite, got {angle}")));
        }
        self.angle = angle.clamp(self.min_angle, self.max_angle);
        self.dirty = true;

        if self.write_through && self.controller.is_some() {
            self.flush()?;
        }
        Ok(())
    }

    /// Set the position from a pulse width
    ///
    /// # Errors
    ///
    /// Same as [`ServoObject::set_angle`]
    pub fn set_pulse_width(&mut self, pulse_width: f64) -> Result<()> {
        let angle = translate(
            pulse_width,
            (self.min_pulse_width, self.max_pulse_width),
            (self.servo_min, self.servo_max),
            self.flip,
        );
        self.set_angle(angle)
    }

    /// Set the position from a normalized value in `[-1, 1]`
    ///
    /// # Errors
    ///
    /// Same as [`ServoObject::set_angle`]
    pub fn set_value(&mut self, value: f64) -> Result<()> {
        let angle = translate(value, (-1.0, 1.0), (self.servo_min, self.servo_max), self.flip);
        self.set_angle(angle)
    }

    /// Recalibrate the zero point in place.
    ///
    /// All angle-derived bounds shift by the offset difference so that their
    /// relative geometry is preserved.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, leaving the servo untouched, if the
    /// offset or any shifted bound is not finite
    pub fn set_center_angle_offset(&mut self, offset: f64) -> Result<()> {
        require_finite("center_angle_offset", offset)?;
        let diff = offset - self.center_angle_offset;
        let shifted = [
            self.min_angle - diff,
            self.max_angle - diff,
            self.initial_angle - diff,
            self.center_angle - diff,
            self.servo_min - diff,
            self.servo_max - diff,
        ];
        if !diff.is_finite() || shifted.iter().any(|v| !v.is_finite()) {
            return Err(Error::Config(format!(
                "{} center offset {offset} moves the angle limits out of range",
                self.id
            )));
        }

        [
            self.min_angle,
            self.max_angle,
            self.initial_angle,
            self.center_angle,
            self.servo_min,
            self.servo_max,
        ] = shifted;
        self.center_angle_offset = offset;

        if diff != 0.0 {
            self.angle = self.angle.clamp(self.min_angle, self.max_angle);
            self.dirty = true;
            info!("{} recalibrated: center offset {offset}", self.id);
        }
        Ok(())
    }

    fn ensure_pulse_bounds_mutable(&self) -> Result<()> {
        if let Some(controller) = &self.controller {
            let guard = microcontroller::lock(controller)?;
            if guard.has_fixed_pulse_bounds() {
                return Err(Error::InvalidOperation(format!(
                    "{} is bound to {} with fixed pulse-width bounds",
                    self.id,
                    guard.name()
                )));
            }
        }
        Ok(())
    }

    /// Change the minimum pulse width
    ///
    /// # Errors
    ///
    /// Returns an invalid-operation error if the bound microcontroller has
    /// fixed pulse bounds, or a configuration error if the bounds would no
    /// longer be increasing. State is unchanged on error.
    pub fn set_min_pulse_width(&mut self, min_pulse_width: f64) -> Result<()> {
        self.ensure_pulse_bounds_mutable()?;
        Self::check_pulse_bounds(min_pulse_width, self.max_pulse_width)?;
        self.min_pulse_width = min_pulse_width;
        self.dirty = true;
        Ok(())
    }

    /// Change the maximum pulse width
    ///
    /// # Errors
    ///
    /// Same as [`ServoObject::set_min_pulse_width`]
    pub fn set_max_pulse_width(&mut self, max_pulse_width: f64) -> Result<()> {
        self.ensure_pulse_bounds_mutable()?;
        Self::check_pulse_bounds(self.min_pulse_width, max_pulse_width)?;
        self.max_pulse_width = max_pulse_width;
        self.dirty = true;
        Ok(())
    }

    /// Pulse command for the current angle
    ///
    /// # Errors
    ///
    /// Returns an error if the pulse width cannot be represented
    pub fn pulse_command(&self) -> Result<PulseCommand> {
        Ok(PulseCommand {
            channel: self.channel,
            pulse_width: pulse_width_to_u32(self.pulse_width())?,
        })
    }

    /// Push the current pulse width to the bound microcontroller
    ///
    /// # Errors
    ///
    /// Returns a connection error if no microcontroller is bound or it is closed
    pub fn flush(&mut self) -> Result<()> {
        let command = self.pulse_command()?;
        let controller = self
            .controller
            .as_ref()
            .ok_or_else(|| Error::Connection(format!("{} has no microcontroller attached", self.id)))?;
        let mut guard = microcontroller::lock(controller)?;
        if !guard.is_open() {
            return Err(Error::Connection(format!("{} is not open", guard.name())));
        }
        guard.write(&[command])?;
        self.dirty = false;
        Ok(())
    }

    /// Return to the initial angle
    ///
    /// # Errors
    ///
    /// Same as [`ServoObject::set_angle`]
    pub fn reset(&mut self) -> Result<()> {
        self.set_angle(self.initial_angle)
    }

    /// Jump to `min_angle`
    ///
    /// # Errors
    ///
    /// Same as [`ServoObject::set_angle`]
    pub fn to_min(&mut self) -> Result<()> {
        self.set_angle(self.min_angle)
    }

    /// Jump to the center angle
    ///
    /// # Errors
    ///
    /// Same as [`ServoObject::set_angle`]
    pub fn to_center(&mut self) -> Result<()> {
        self.set_angle(self.center_angle)
    }

    /// Jump to `max_angle`
    ///
    /// # Errors
    ///
    /// Same as [`ServoObject::set_angle`]
    pub fn to_max(&mut self) -> Result<()> {
        self.set_angle(self.max_angle)
    }

    /// Move one `step_size` towards `max_angle`
    ///
    /// # Errors
    ///
    /// Same as [`ServoObject::set_angle`]
    pub fn step_up(&mut self) -> Result<()> {
        self.set_angle(self.angle + self.step_size)
    }

    /// Move one `step_size` towards `min_angle`
    ///
    /// # Errors
    ///
    /// Same as [`ServoObject::set_angle`]
    pub fn step_down(&mut self) -> Result<()> {
        self.set_angle(self.angle - self.step_size)
    }
}

/// Push every dirty servo in one microcontroller write.
///
/// Returns the number of servos flushed.
///
/// # Errors
///
/// Returns a connection error if the microcontroller is closed; dirty flags
/// are left set so the caller can retry.
pub fn flush_all(controller: &SharedMicroController, servos: &mut [&mut ServoObject]) -> Result<usize> {
    let mut commands = Vec::with_capacity(servos.len());
    for servo in servos.iter().filter(|s| s.is_dirty()) {
        commands.push(servo.pulse_command()?);
    }
    if commands.is_empty() {
        return Ok(0);
    }

    {
        let mut guard = microcontroller::lock(controller)?;
        if !guard.is_open() {
            return Err(Error::Connection(format!("{} is not open", guard.name())));
        }
        guard.write(&commands)?;
    }

    for servo in servos.iter_mut() {
        servo.dirty = false;
    }
    Ok(commands.len())
}
