//! Session status as seen by observers.
//!
//! The session controller is the only writer. Observers receive clones.

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use crate::connection::ConnectionStatus;
use crate::nmea::SentenceFamily;
use crate::sample::PositionSample;

/// Number of error messages kept; the oldest is dropped first
pub const ERROR_LOG_CAPACITY: usize = 4;

/// Bounded list of timestamped error messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorLog {
    entries: VecDeque<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `[HH:MM:SS] message`, evicting the oldest entry when full.
    pub fn push(&mut self, at: NaiveTime, message: impl AsRef<str>) {
        if self.entries.len() == ERROR_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries
            .push_back(format!("[{}] {}", at.format("%H:%M:%S"), message.as_ref()));
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// What was last delivered successfully.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSent {
    /// Timestamp of the last delivered position sample
    pub time: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub heading: Option<f64>,
    /// Last delivered line per sentence family, without terminator
    pub sentences: BTreeMap<SentenceFamily, String>,
}

impl LastSent {
    pub fn record_position(&mut self, family: SentenceFamily, line: &str, sample: &PositionSample) {
        self.sentences.insert(family, line.trim_end().to_string());
        self.time = Some(sample.timestamp);
        self.latitude = Some(sample.latitude);
        self.longitude = Some(sample.longitude);
    }

    pub fn record_heading(&mut self, line: &str, heading: f64) {
        self.sentences
            .insert(SentenceFamily::Heading, line.trim_end().to_string());
        self.heading = Some(heading);
    }

    pub fn sentence(&self, family: SentenceFamily) -> Option<&str> {
        self.sentences.get(&family).map(String::as_str)
    }
}

/// Snapshot published to observers after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Set once the channel is ready, cleared on stop
    pub is_sending: bool,
    pub connection_status: ConnectionStatus,
    pub last_sent: LastSent,
    pub errors: ErrorLog,
}
