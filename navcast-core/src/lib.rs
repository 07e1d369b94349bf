//! # Navcast Core
//!
//! Platform-independent NMEA 0183 encoding and delivery logic for streaming
//! a device's position and heading to chartplotters.
//!
//! This crate contains pure encoding and state logic with **zero I/O
//! dependencies**. The socket, timers and the location provider live in the
//! shell (`navcast-server`), which drives the state machines here and owns
//! the async runtime.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  navcast-core (platform-independent, no tokio/async deps)   │
//! │  ├── sample/      (position and heading samples)           │
//! │  ├── nmea/        (sentence encoding & checksums)          │
//! │  ├── throttle/    (busy window, heading rate limit)        │
//! │  ├── connection/  (channel state machine)                  │
//! │  ├── status/      (observer snapshot, error log)           │
//! │  └── source/      (SampleSource / SampleSink traits)       │
//! └─────────────────────────────────────────────────────────────┘
//!                             ▲
//!                ┌────────────┴────────────┐
//!                │  navcast-server         │
//!                │  (tokio UDP, session)   │
//!                └─────────────────────────┘
//! ```
//!
//! ## Sentences
//!
//! | Sentence | Content                               |
//! |----------|---------------------------------------|
//! | GPRMC    | time, position, speed, course, date   |
//! | GPGGA    | time, position, fix data, altitude    |
//! | GPVTG    | course and speed over ground          |
//! | GPHDT    | true heading                          |
//! | GPHDM    | magnetic heading                      |
//!
//! ## Example: Encoding a Position
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use navcast_core::nmea;
//! use navcast_core::PositionSample;
//!
//! let sample = PositionSample {
//!     timestamp: Utc.with_ymd_and_hms(2025, 8, 3, 12, 0, 0).unwrap(),
//!     latitude: 48.1173,
//!     longitude: 11.5167,
//!     speed: Some(5.0),
//!     course: Some(84.4),
//!     altitude: 520.0,
//! };
//! for sentence in nmea::encode_position(&sample) {
//!     let line = sentence.to_wire();
//!     assert!(line.starts_with("$GP"));
//!     assert!(line.ends_with('\n'));
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod nmea;
pub mod sample;
pub mod source;
pub mod status;
pub mod throttle;

// Re-export commonly used types
pub use config::{Endpoint, SenderConfig, TimerInterval};
pub use connection::{ChannelState, ConnectionStateMachine, ConnectionStatus};
pub use error::ChannelError;
pub use nmea::{Sentence, SentenceFamily};
pub use sample::{HeadingMode, HeadingSample, PositionSample, Sample};
pub use source::{SampleSink, SampleSource};
pub use status::{ErrorLog, LastSent, SessionStatus};
pub use throttle::{Suppressed, UpdateThrottler};
