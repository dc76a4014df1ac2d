//! Countdown timer for time-limited exams.
//!
//! [`CountdownTimer`] is the pure state machine (`idle -> running -> expired`)
//! and [`Ticker`] is the recurring task that drives it by sending
//! [`SessionSignal::Tick`] once per period.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

use crate::signal::{SessionSignal, SignalSender};

/// Phase of the countdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    /// Not started, or stopped.
    #[default]
    Idle,
    /// Counting down.
    Running,
    /// Reached zero. Terminal until the timer is reset.
    Expired,
}

/// Result of applying one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The timer was not running; nothing changed.
    Ignored,
    /// One second was consumed and time remains.
    Ticked {
        /// Seconds left after this tick.
        remaining: u64,
    },
    /// This tick consumed the last second. Returned exactly once per start.
    Expired,
}

/// Remaining-time counter decremented once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountdownTimer {
    total: u64,
    remaining: u64,
    phase: TimerPhase,
}

impl CountdownTimer {
    /// Creates an idle timer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total: 0,
            remaining: 0,
            phase: TimerPhase::Idle,
        }
    }

    /// Starts counting down from `total_secs`.
    pub fn start(&mut self, total_secs: u64) {
        self.total = total_secs;
        self.remaining = total_secs;
        self.phase = TimerPhase::Running;
    }

    /// Consumes one second.
    ///
    /// # Examples
    ///
    /// ```
    /// use proctor_session::{CountdownTimer, TickOutcome};
    ///
    /// let mut timer = CountdownTimer::new();
    /// timer.start(2);
    /// assert_eq!(timer.tick(), TickOutcome::Ticked { remaining: 1 });
    /// assert_eq!(timer.tick(), TickOutcome::Expired);
    /// assert_eq!(timer.tick(), TickOutcome::Ignored);
    /// assert_eq!(timer.remaining(), 0);
    /// ```
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != TimerPhase::Running {
            return TickOutcome::Ignored;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.phase = TimerPhase::Expired;
            TickOutcome::Expired
        } else {
            TickOutcome::Ticked {
                remaining: self.remaining,
            }
        }
    }

    /// Stops a running timer, keeping the remaining time.
    pub fn stop(&mut self) {
        if self.phase == TimerPhase::Running {
            self.phase = TimerPhase::Idle;
        }
    }

    /// Returns the timer to its initial idle state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Seconds left.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Seconds the timer was started with.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> TimerPhase {
        self.phase
    }

    /// Returns `true` while counting down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    /// Remaining time formatted as a clock.
    #[must_use]
    pub fn display(&self) -> String {
        format_clock(self.remaining)
    }
}

/// Formats seconds as `MM:SS`, or `H:MM:SS` from one hour up.
///
/// # Examples
///
/// ```
/// use proctor_session::format_clock;
///
/// assert_eq!(format_clock(0), "00:00");
/// assert_eq!(format_clock(95), "01:35");
/// assert_eq!(format_clock(3725), "1:02:05");
/// ```
#[must_use]
pub fn format_clock(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Recurring task that sends one [`SessionSignal::Tick`] per period.
///
/// Stopping (or dropping) the ticker aborts the task immediately. A tick
/// already queued in the channel is filtered out by its epoch.
#[derive(Debug, Default)]
pub struct Ticker {
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Creates a stopped ticker.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Starts ticking every `period`, replacing any running task.
    ///
    /// The first tick arrives one full period after the call. Must be called
    /// from within a Tokio runtime.
    pub fn start(&mut self, period: Duration, epoch: u64, signals: SignalSender) {
        self.stop();
        debug!(epoch, period_ms = period.as_millis(), "Starting countdown ticker");
        self.handle = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if signals.send(SessionSignal::Tick { epoch }).is_err() {
                    break;
                }
            }
        }));
    }

    /// Cancels the scheduled ticks.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Returns `true` while a tick task is scheduled.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
