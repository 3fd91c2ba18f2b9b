//! Loop lifecycle shared by the capture and detector loops.
//!
//! Both loops walk `Starting → Running → Stopping → Stopped` and poll a
//! [`CancellationToken`] once per iteration. Operator interrupts, the
//! supervisor and tests all stop a loop by cancelling its token.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Loop state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl LoopState {
    /// Whether moving to `next` is a legal transition
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Running)
                | (Self::Starting, Self::Stopping)
                | (Self::Running, Self::Stopping)
                | (Self::Stopping, Self::Stopped)
        )
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Cooperative stop flag; clones share the flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every holder of this token to stop
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep up to `timeout`, waking early on cancellation.
    /// Returns whether the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let slice = Duration::from_millis(5);
        while !self.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(slice.min(deadline - now));
        }
        true
    }
}

/// Events-per-second meter, refreshed once per window
#[derive(Debug, Clone)]
pub struct FrequencyCounter {
    window: Duration,
    window_start: Instant,
    count: u64,
    total: u64,
    hz: f64,
}

impl FrequencyCounter {
    /// Meter refreshed every `window`
    #[must_use]
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            window_start: now,
            count: 0,
            total: 0,
            hz: 0.0,
        }
    }

    /// Record one event at `now`; returns the new rate when a window closes
    #[allow(clippy::cast_precision_loss)]
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.count += 1;
        self.total += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window || elapsed.is_zero() {
            return None;
        }
        self.hz = self.count as f64 / elapsed.as_secs_f64();
        self.count = 0;
        self.window_start = now;
        Some(self.hz)
    }

    /// Rate measured over the last closed window
    pub const fn hz(&self) -> f64 {
        self.hz
    }

    /// Events since construction
    pub const fn total(&self) -> u64 {
        self.total
    }
}
