//! Sender configuration.
//!
//! The configuration is supplied by the shell (settings file, command line,
//! app preferences) and read by the session at the points where it matters:
//! the endpoint and timer when a session starts, the heading settings when a
//! heading sentence is built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::sample::HeadingMode;

/// Default UDP port for NMEA 0183 over IP
pub const DEFAULT_PORT: u16 = 10110;

pub const DEFAULT_HOST: &str = "192.168.1.1";

/// Destination of the datagram channel.
///
/// A channel never changes its endpoint; a new endpoint needs a new channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    /// Port 0 and an empty host can never be opened.
    pub fn is_valid(&self) -> bool {
        self.port != 0 && !self.host.trim().is_empty()
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Allowed periodic timer intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum TimerInterval {
    #[default]
    One,
    Three,
    Five,
    Ten,
}

impl TimerInterval {
    pub const ALL: [TimerInterval; 4] = [
        TimerInterval::One,
        TimerInterval::Three,
        TimerInterval::Five,
        TimerInterval::Ten,
    ];

    pub fn as_secs(self) -> u64 {
        match self {
            TimerInterval::One => 1,
            TimerInterval::Three => 3,
            TimerInterval::Five => 5,
            TimerInterval::Ten => 10,
        }
    }

    pub fn as_millis(self) -> u64 {
        self.as_secs() * 1000
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

impl TryFrom<u64> for TimerInterval {
    type Error = String;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        TimerInterval::ALL
            .into_iter()
            .find(|t| t.as_secs() == secs)
            .ok_or_else(|| format!("Invalid timer interval {}s, expected 1, 3, 5 or 10", secs))
    }
}

impl From<TimerInterval> for u64 {
    fn from(t: TimerInterval) -> u64 {
        t.as_secs()
    }
}

impl std::str::FromStr for TimerInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs: u64 = s
            .trim()
            .trim_end_matches('s')
            .parse()
            .map_err(|_| format!("Invalid timer interval '{}'", s))?;
        TimerInterval::try_from(secs)
    }
}

impl fmt::Display for TimerInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.as_secs())
    }
}

/// Everything the session needs from the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SenderConfig {
    pub endpoint: Endpoint,
    pub heading_enabled: bool,
    pub heading_mode: HeadingMode,
    /// Read the magnetic field for true-heading sentences and vice versa
    pub swap_heading_fields: bool,
    pub timer_enabled: bool,
    pub timer_interval: TimerInterval,
    pub show_error_history: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            endpoint: Endpoint::default(),
            heading_enabled: true,
            heading_mode: HeadingMode::True,
            swap_heading_fields: false,
            timer_enabled: false,
            timer_interval: TimerInterval::One,
            show_error_history: false,
        }
    }
}
