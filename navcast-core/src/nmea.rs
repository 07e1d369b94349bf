//! NMEA 0183 sentence encoding
//!
//! Pure functions for building the position and heading sentences that are
//! streamed to chartplotters. No I/O operations - just returns formatted
//! strings ready to send.
//!
//! A sentence *body* is everything between the leading `$` and the `*`
//! checksum delimiter, e.g. `GPHDT,123.456,T`. The wire form adds the
//! framing: `$GPHDT,123.456,T*32\n`.

use serde::{Deserialize, Serialize};

use crate::sample::{HeadingMode, PositionSample};

// =============================================================================
// Constants
// =============================================================================

/// Meters per second to knots
pub const KNOTS_PER_MPS: f64 = 1.94384;

/// Meters per second to kilometers per hour
pub const KMH_PER_MPS: f64 = 3.6;

/// Value substituted for unknown speed or course before encoding
pub const UNKNOWN_VALUE: f64 = 0.0;

/// GGA fix quality indicator (1 = GPS fix)
pub const FIX_QUALITY: u8 = 1;

/// GGA satellite count placeholder
pub const SATELLITES_IN_USE: u8 = 8;

/// GGA horizontal dilution of precision placeholder
pub const HDOP: f64 = 1.0;

/// GGA geoid separation placeholder
pub const GEOID_SEPARATION: f64 = 0.0;

// =============================================================================
// Sentence
// =============================================================================

/// Sentence families emitted by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentenceFamily {
    /// GPRMC, recommended minimum navigation data
    Rmc,
    /// GPGGA, fix data
    Gga,
    /// GPVTG, track and speed over ground
    Vtg,
    /// GPHDT or GPHDM
    Heading,
}

impl SentenceFamily {
    pub const ALL: [SentenceFamily; 4] = [
        SentenceFamily::Rmc,
        SentenceFamily::Gga,
        SentenceFamily::Vtg,
        SentenceFamily::Heading,
    ];
}

impl std::fmt::Display for SentenceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentenceFamily::Rmc => write!(f, "RMC"),
            SentenceFamily::Gga => write!(f, "GGA"),
            SentenceFamily::Vtg => write!(f, "VTG"),
            SentenceFamily::Heading => write!(f, "HDT/HDM"),
        }
    }
}

/// An encoded sentence body together with its family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub family: SentenceFamily,
    pub body: String,
}

impl Sentence {
    fn new(family: SentenceFamily, body: String) -> Self {
        Sentence { family, body }
    }

    /// Wire-ready line including `$`, checksum and terminator
    pub fn to_wire(&self) -> String {
        to_wire(&self.body)
    }
}

// =============================================================================
// Checksum and framing
// =============================================================================

/// XOR of every byte of the sentence body.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Frame a body as `$<body>*<HH>\n`.
pub fn to_wire(body: &str) -> String {
    format!("${}*{:02X}\n", body, checksum(body))
}

// =============================================================================
// Coordinates
// =============================================================================

/// A coordinate split into whole degrees and decimal minutes.
///
/// Both parts are magnitudes; the sign lives in the hemisphere letter only.
/// Minutes are rounded to the three decimals that go on the wire, carrying
/// into the degrees when they reach 60.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegreesMinutes {
    pub degrees: u32,
    pub minutes: f64,
    pub hemisphere: char,
}

impl DegreesMinutes {
    pub fn latitude(value: f64) -> Self {
        Self::split(value, if value >= 0.0 { 'N' } else { 'S' })
    }

    pub fn longitude(value: f64) -> Self {
        Self::split(value, if value >= 0.0 { 'E' } else { 'W' })
    }

    fn split(value: f64, hemisphere: char) -> Self {
        let whole = value.trunc();
        let mut degrees = whole.abs() as u32;
        let mut minutes = (((value - whole) * 60.0).abs() * 1000.0).round() / 1000.0;
        if minutes >= 60.0 {
            degrees += 1;
            minutes -= 60.0;
        }
        DegreesMinutes {
            degrees,
            minutes,
            hemisphere,
        }
    }

    /// `ddmm.mmm,H` with `width` digits of degrees.
    fn field(&self, width: usize) -> String {
        format!(
            "{:0width$}{:06.3},{}",
            self.degrees,
            self.minutes,
            self.hemisphere,
            width = width
        )
    }
}

fn latitude_field(value: f64) -> String {
    DegreesMinutes::latitude(value).field(2)
}

fn longitude_field(value: f64) -> String {
    DegreesMinutes::longitude(value).field(3)
}

// =============================================================================
// Position sentences
// =============================================================================

/// A position sample with unknown values already substituted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub sample: PositionSample,
    /// Speed over ground in m/s
    pub speed: f64,
    /// Course over ground in degrees true
    pub course: f64,
}

impl Fix {
    /// Substitute [`UNKNOWN_VALUE`] for missing or negative speed and course.
    pub fn from_sample(sample: &PositionSample) -> Self {
        let known = |v: Option<f64>| v.filter(|v| v.is_finite() && *v >= 0.0);
        Fix {
            sample: *sample,
            speed: known(sample.speed).unwrap_or(UNKNOWN_VALUE),
            course: known(sample.course).unwrap_or(UNKNOWN_VALUE),
        }
    }

    pub fn speed_knots(&self) -> f64 {
        self.speed * KNOTS_PER_MPS
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed * KMH_PER_MPS
    }

    fn utc_time(&self) -> String {
        self.sample.timestamp.format("%H%M%S%.3f").to_string()
    }

    fn utc_date(&self) -> String {
        self.sample.timestamp.format("%d%m%y").to_string()
    }
}

/// GPRMC body. The status field is always `A` (valid).
pub fn encode_rmc(fix: &Fix) -> String {
    format!(
        "GPRMC,{},A,{},{},{:.1},{:.1},{},,",
        fix.utc_time(),
        latitude_field(fix.sample.latitude),
        longitude_field(fix.sample.longitude),
        fix.speed_knots(),
        fix.course,
        fix.utc_date()
    )
}

/// GPGGA body with placeholder quality, satellite and dilution values.
pub fn encode_gga(fix: &Fix) -> String {
    format!(
        "GPGGA,{},{},{},{},{:02},{:.1},{:.1},M,{:.1},M,,",
        fix.utc_time(),
        latitude_field(fix.sample.latitude),
        longitude_field(fix.sample.longitude),
        FIX_QUALITY,
        SATELLITES_IN_USE,
        HDOP,
        fix.sample.altitude,
        GEOID_SEPARATION
    )
}

/// GPVTG body. Magnetic course mirrors the true course.
pub fn encode_vtg(fix: &Fix) -> String {
    format!(
        "GPVTG,{:.1},T,{:.1},M,{:.1},N,{:.1},K,",
        fix.course,
        fix.course,
        fix.speed_knots(),
        fix.speed_kmh()
    )
}

/// All sentences derived from one position sample, in send order.
pub fn encode_position(sample: &PositionSample) -> [Sentence; 3] {
    let fix = Fix::from_sample(sample);
    [
        Sentence::new(SentenceFamily::Rmc, encode_rmc(&fix)),
        Sentence::new(SentenceFamily::Gga, encode_gga(&fix)),
        Sentence::new(SentenceFamily::Vtg, encode_vtg(&fix)),
    ]
}

// =============================================================================
// Heading sentences
// =============================================================================

/// GPHDT (true) or GPHDM (magnetic) body for an already selected heading.
pub fn encode_heading(heading: f64, mode: HeadingMode) -> Sentence {
    let tag = match mode {
        HeadingMode::True => "HDT",
        HeadingMode::Magnetic => "HDM",
    };
    Sentence::new(
        SentenceFamily::Heading,
        format!("GP{},{:.3},{}", tag, heading, mode.unit()),
    )
}

// =============================================================================
// Tests
// =============================================================================
