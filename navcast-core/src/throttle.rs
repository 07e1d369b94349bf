//! Rate limiting for outgoing position and heading sentences.
//!
//! Two stimulus sources compete for position sends: the periodic timer and
//! push updates from the location provider. While the timer is running, a
//! send opens a busy window of `interval * 1.1`; every position request that
//! arrives inside the window is suppressed. Heading updates are limited
//! independently to one per [`HEADING_MIN_INTERVAL_MS`].
//!
//! Like [`ConnectionStateMachine`](crate::connection::ConnectionStateMachine)
//! this is a pure state machine. The owner passes the current monotonic time
//! in milliseconds, so it never reads a clock itself.

use crate::config::TimerInterval;

/// Minimum spacing between two accepted heading updates (10 Hz)
pub const HEADING_MIN_INTERVAL_MS: u64 = 100;

/// Busy window as a multiple of the timer interval, in tenths
const BUSY_WINDOW_TENTHS: u64 = 11;

/// Why a request was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppressed {
    /// A position send is still inside its busy window
    Busy { remaining_ms: u64 },
    /// The previous heading was accepted less than 100 ms ago
    TooSoon { since_last_ms: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct UpdateThrottler {
    /// Timer interval while the periodic timer runs
    timer: Option<TimerInterval>,
    /// End of the current position busy window
    busy_until_ms: Option<u64>,
    /// Time of the last accepted heading update
    last_heading_ms: Option<u64>,
}

impl UpdateThrottler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start gating position sends on `interval`.
    pub fn timer_started(&mut self, interval: TimerInterval) {
        self.timer = Some(interval);
    }

    /// Stop gating; pending busy windows are dropped.
    pub fn timer_stopped(&mut self) {
        self.timer = None;
        self.busy_until_ms = None;
    }

    pub fn timer_active(&self) -> bool {
        self.timer.is_some()
    }

    /// Forget all history, as at the start of a new session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Length of the busy window for the running timer.
    pub fn busy_window_ms(&self) -> Option<u64> {
        self.timer.map(|t| t.as_millis() * BUSY_WINDOW_TENTHS / 10)
    }

    pub fn is_busy(&self, now_ms: u64) -> bool {
        self.busy_until_ms.is_some_and(|until| now_ms < until)
    }

    /// Ask to dispatch a position send.
    ///
    /// Without a running timer every request is accepted. Otherwise the
    /// request is accepted only outside a busy window, and acceptance opens
    /// a new window immediately, before the caller dispatches anything.
    pub fn try_position(&mut self, now_ms: u64) -> Result<(), Suppressed> {
        let Some(window) = self.busy_window_ms() else {
            return Ok(());
        };
        if let Some(until) = self.busy_until_ms {
            if now_ms < until {
                return Err(Suppressed::Busy {
                    remaining_ms: until - now_ms,
                });
            }
        }
        self.busy_until_ms = Some(now_ms + window);
        Ok(())
    }

    /// Ask to dispatch a heading send.
    ///
    /// Rejected updates do not move the reference point; only accepted ones
    /// do.
    pub fn try_heading(&mut self, now_ms: u64) -> Result<(), Suppressed> {
        if let Some(last) = self.last_heading_ms {
            let since_last_ms = now_ms.saturating_sub(last);
            if since_last_ms < HEADING_MIN_INTERVAL_MS {
                return Err(Suppressed::TooSoon { since_last_ms });
            }
        }
        self.last_heading_ms = Some(now_ms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_rate_limit() {
        let mut throttler = UpdateThrottler::new();
        let mut accepted = Vec::new();
        // One update every 20 ms for one second
        for i in 0..50u64 {
            let now = 1000 + i * 20;
            if throttler.try_heading(now).is_ok() {
                accepted.push(now);
            }
        }
        assert_eq!(accepted.first(), Some(&1000));
        for pair in accepted.windows(2) {
            assert!(pair[1] - pair[0] >= HEADING_MIN_INTERVAL_MS);
        }
        assert_eq!(accepted.len(), 10);
    }

    #[test]
    fn test_heading_measured_from_last_accepted() {
        let mut throttler = UpdateThrottler::new();
        assert!(throttler.try_heading(0).is_ok());
        assert_eq!(
            throttler.try_heading(90),
            Err(Suppressed::TooSoon { since_last_ms: 90 })
        );
        // Still 100 ms after the accepted update, not after the dropped one
        assert!(throttler.try_heading(100).is_ok());
    }

    #[test]
    fn test_position_without_timer_never_busy() {
        let mut throttler = UpdateThrottler::new();
        for now in [0, 1, 2, 3] {
            assert!(throttler.try_position(now).is_ok());
        }
        assert!(!throttler.is_busy(3));
    }

    #[test]
    fn test_push_suppressed_inside_busy_window() {
        let mut throttler = UpdateThrottler::new();
        throttler.timer_started(TimerInterval::One);
        assert_eq!(throttler.busy_window_ms(), Some(1100));

        // Timer-triggered send at t=1000
        assert!(throttler.try_position(1000).is_ok());
        // Push update 50 ms later
        assert_eq!(
            throttler.try_position(1050),
            Err(Suppressed::Busy { remaining_ms: 1050 })
        );
        assert!(throttler.try_position(2099).is_err());
        // Window has elapsed
        assert!(throttler.try_position(2100).is_ok());
        assert!(throttler.is_busy(2101));
    }

    #[test]
    fn test_heading_independent_of_busy_window() {
        let mut throttler = UpdateThrottler::new();
        throttler.timer_started(TimerInterval::Three);
        assert!(throttler.try_position(0).is_ok());
        assert!(throttler.is_busy(10));
        assert!(throttler.try_heading(10).is_ok());
    }

    #[test]
    fn test_timer_stop_clears_busy() {
        let mut throttler = UpdateThrottler::new();
        throttler.timer_started(TimerInterval::Ten);
        assert_eq!(throttler.busy_window_ms(), Some(11_000));
        assert!(throttler.try_position(0).is_ok());
        throttler.timer_stopped();
        assert!(!throttler.is_busy(1));
        assert!(throttler.try_position(1).is_ok());
    }
}
