//! Microcontroller handles that turn servo pulse widths into hardware output.
//!
//! Servos only depend on the [`MicroController`] trait. Hardware-specific rules
//! are exposed as capability queries ([`MicroController::has_fixed_pulse_bounds`])
//! rather than through concrete types, so a servo never needs to know which
//! board it is wired to.

use crate::{constants::DRY_RUN_HISTORY, Error, Result};
use log::{debug, info};
use serialport::SerialPort;
use std::{
    collections::VecDeque,
    io::Write,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

/// One pulse-width command for one output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseCommand {
    /// Output channel (pin or PWM slot) on the microcontroller
    pub channel: u8,
    /// Pulse width in microseconds
    pub pulse_width: u32,
}

/// Contract every servo output backend implements
pub trait MicroController: Send {
    /// Whether writes can currently reach the hardware
    fn is_open(&self) -> bool;

    /// Push pulse widths; blocks until the bytes are handed to the device
    fn write(&mut self, commands: &[PulseCommand]) -> Result<()>;

    /// Release the device
    fn close(&mut self) -> Result<()>;

    /// True when pulse-width bounds are fixed by the hardware line and must
    /// not be changed after a servo is bound to it
    fn has_fixed_pulse_bounds(&self) -> bool {
        false
    }

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Handle shared by every servo wired to the same board
pub type SharedMicroController = Arc<Mutex<dyn MicroController>>;

/// Wrap a backend so several servos can share it
pub fn shared<M: MicroController + 'static>(controller: M) -> SharedMicroController {
    Arc::new(Mutex::new(controller))
}

/// Lock a shared handle, mapping a poisoned lock to a connection error
///
/// # Errors
///
/// Returns a connection error if another thread panicked while holding the lock
pub fn lock(controller: &SharedMicroController) -> Result<MutexGuard<'_, dyn MicroController + 'static>> {
    controller
        .lock()
        .map_err(|_| Error::Connection("Microcontroller lock poisoned".to_string()))
}

/// Serial-attached board (Arduino style) speaking `"<channel>:<pulse_us>\n"`
pub struct SerialMicroController {
    port_path: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialMicroController {
    /// Open the serial port
    ///
    /// # Errors
    ///
    /// Returns a serial error if the port cannot be opened
    pub fn open(port_path: &str, baud_rate: u32) -> Result<Self> {
        info!("Opening microcontroller on {} @ {} bps", port_path, baud_rate);
        let port = serialport::new(port_path, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(Self {
            port_path: port_path.to_string(),
            port: Some(port),
        })
    }

    /// Encode commands in the line protocol
    #[must_use]
    pub fn encode(commands: &[PulseCommand]) -> String {
        commands
            .iter()
            .map(|c| format!("{}:{}\n", c.channel, c.pulse_width))
            .collect()
    }
}

impl MicroController for SerialMicroController {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, commands: &[PulseCommand]) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::Connection(format!("Serial port {} is closed", self.port_path)))?;
        let payload = Self::encode(commands);
        debug!("serial {} <- {:?}", self.port_path, payload);
        port.write_all(payload.as_bytes())?;
        port.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            info!("Closed microcontroller on {}", self.port_path);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "serial"
    }
}

/// Backend that records commands instead of driving hardware.
///
/// Used when no serial port is configured, and in tests. It can pretend to be
/// a fixed-pin hardware line whose pulse bounds are immutable.
#[derive(Debug)]
pub struct DryRunMicroController {
    open: bool,
    fixed_pulse_bounds: bool,
    history: VecDeque<Vec<PulseCommand>>,
    write_count: u64,
}

impl Default for DryRunMicroController {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunMicroController {
    /// Open dry-run backend with mutable pulse bounds
    #[must_use]
    pub fn new() -> Self {
        Self {
            open: true,
            fixed_pulse_bounds: false,
            history: VecDeque::with_capacity(DRY_RUN_HISTORY),
            write_count: 0,
        }
    }

    /// Open dry-run backend that reports fixed pulse bounds
    #[must_use]
    pub fn with_fixed_pulse_bounds() -> Self {
        Self {
            fixed_pulse_bounds: true,
            ..Self::new()
        }
    }

    /// The most recent batches, oldest first, at most [`DRY_RUN_HISTORY`]
    #[must_use]
    pub const fn history(&self) -> &VecDeque<Vec<PulseCommand>> {
        &self.history
    }

    /// Latest batch written
    #[must_use]
    pub fn last_write(&self) -> Option<&[PulseCommand]> {
        self.history.back().map(Vec::as_slice)
    }

    /// Batches written since creation, including ones dropped from the history
    #[must_use]
    pub const fn write_count(&self) -> u64 {
        self.write_count
    }
}

impl MicroController for DryRunMicroController {
    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, commands: &[PulseCommand]) -> Result<()> {
        if !self.open {
            return Err(Error::Connection("Dry-run microcontroller is closed".to_string()));
        }
        debug!("dry-run <- {:?}", commands);
        if self.history.len() == DRY_RUN_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(commands.to_vec());
        self.write_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn has_fixed_pulse_bounds(&self) -> bool {
        self.fixed_pulse_bounds
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires a serial device
    fn test_serial_open_missing_port() {
        assert!(SerialMicroController::open("/dev/does-not-exist", 115_200).is_err());
    }

    #[test]
    fn test_encode_line_protocol() {
        let commands = [
            PulseCommand {
                channel: 0,
                pulse_width: 1500,
            },
            PulseCommand {
                channel: 1,
                pulse_width: 1250,
            },
        ];
        assert_eq!(SerialMicroController::encode(&commands), "0:1500\n1:1250\n");
    }

    #[test]
    fn test_dry_run_records_and_closes() {
        let mut mc = DryRunMicroController::new();
        assert!(mc.is_open());
        assert!(!mc.has_fixed_pulse_bounds());
        let cmd = PulseCommand {
            channel: 3,
            pulse_width: 900,
        };
        mc.write(&[cmd]).unwrap();
        assert_eq!(mc.last_write(), Some(&[cmd][..]));
        assert_eq!(mc.write_count(), 1);

        mc.close().unwrap();
        assert!(!mc.is_open());
        assert!(matches!(mc.write(&[cmd]), Err(Error::Connection(_))));
    }

    #[test]
    fn test_dry_run_history_is_bounded() {
        let mut mc = DryRunMicroController::new();
        let total = DRY_RUN_HISTORY * 3 + 5;
        for i in 0..total {
            let pulse_width = u32::try_from(i).unwrap();
            mc.write(&[PulseCommand { channel: 0, pulse_width }]).unwrap();
        }
        assert_eq!(mc.history().len(), DRY_RUN_HISTORY);
        assert_eq!(mc.write_count(), total as u64);
        let last = u32::try_from(total - 1).unwrap();
        assert_eq!(mc.last_write().unwrap()[0].pulse_width, last);
        let oldest = u32::try_from(total - DRY_RUN_HISTORY).unwrap();
        assert_eq!(mc.history().front().unwrap()[0].pulse_width, oldest);
    }

    #[test]
    fn test_shared_handle_lock() {
        let handle = shared(DryRunMicroController::with_fixed_pulse_bounds());
        let guard = lock(&handle).unwrap();
        assert!(guard.has_fixed_pulse_bounds());
        assert_eq!(guard.name(), "dry-run");
    }
}
