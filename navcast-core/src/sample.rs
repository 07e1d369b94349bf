//! Raw samples delivered by a location/heading provider.
//!
//! Samples are plain values. Nothing in this crate mutates a sample after it
//! has been produced; the encoder only derives sentences from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single position fix as reported by the platform location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// UTC instant of the fix
    pub timestamp: DateTime<Utc>,
    /// Latitude in degrees, positive north (-90..90)
    pub latitude: f64,
    /// Longitude in degrees, positive east (-180..180)
    pub longitude: f64,
    /// Speed over ground in m/s, `None` when unknown
    #[serde(default)]
    pub speed: Option<f64>,
    /// Course over ground in degrees true, `None` when unknown
    #[serde(default)]
    pub course: Option<f64>,
    /// Altitude in meters
    #[serde(default)]
    pub altitude: f64,
}

/// A compass reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadingSample {
    pub timestamp: DateTime<Utc>,
    /// Heading relative to magnetic north in degrees
    #[serde(default)]
    pub magnetic_heading: Option<f64>,
    /// Heading relative to true north in degrees
    #[serde(default)]
    pub true_heading: Option<f64>,
}

/// Either kind of sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Sample {
    Position(PositionSample),
    Heading(HeadingSample),
}

impl Sample {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Sample::Position(p) => p.timestamp,
            Sample::Heading(h) => h.timestamp,
        }
    }
}

impl From<PositionSample> for Sample {
    fn from(p: PositionSample) -> Self {
        Sample::Position(p)
    }
}

impl From<HeadingSample> for Sample {
    fn from(h: HeadingSample) -> Self {
        Sample::Heading(h)
    }
}

/// Which heading reference to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingMode {
    Magnetic,
    #[default]
    True,
}

impl HeadingMode {
    /// Unit letter that terminates the heading sentence
    pub fn unit(self) -> char {
        match self {
            HeadingMode::Magnetic => 'M',
            HeadingMode::True => 'T',
        }
    }
}

impl std::fmt::Display for HeadingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeadingMode::Magnetic => write!(f, "magnetic"),
            HeadingMode::True => write!(f, "true"),
        }
    }
}

impl std::str::FromStr for HeadingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "hdt" => Ok(HeadingMode::True),
            "magnetic" | "m" | "hdm" => Ok(HeadingMode::Magnetic),
            _ => Err(format!("Invalid heading mode '{}', expected true or magnetic", s)),
        }
    }
}

impl HeadingSample {
    /// The heading value that goes out for `mode`.
    ///
    /// With `swap_fields` set the magnetic field is read for `True` and the
    /// true field for `Magnetic`, reproducing the field assignment older
    /// versions of the iOS sender put on the wire.
    pub fn value_for(&self, mode: HeadingMode, swap_fields: bool) -> Option<f64> {
        match (mode, swap_fields) {
            (HeadingMode::True, false) | (HeadingMode::Magnetic, true) => self.true_heading,
            (HeadingMode::Magnetic, false) | (HeadingMode::True, true) => self.magnetic_heading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn heading() -> HeadingSample {
        HeadingSample {
            timestamp: Utc.with_ymd_and_hms(2025, 8, 3, 12, 0, 0).unwrap(),
            magnetic_heading: Some(10.0),
            true_heading: Some(14.5),
        }
    }

    #[test]
    fn test_heading_value_for_mode() {
        let h = heading();
        assert_eq!(h.value_for(HeadingMode::True, false), Some(14.5));
        assert_eq!(h.value_for(HeadingMode::Magnetic, false), Some(10.0));
    }

    #[test]
    fn test_heading_value_swapped() {
        let h = heading();
        assert_eq!(h.value_for(HeadingMode::True, true), Some(10.0));
        assert_eq!(h.value_for(HeadingMode::Magnetic, true), Some(14.5));
    }

    #[test]
    fn test_heading_mode_from_str() {
        assert_eq!("true".parse::<HeadingMode>(), Ok(HeadingMode::True));
        assert_eq!("HDM".parse::<HeadingMode>(), Ok(HeadingMode::Magnetic));
        assert!("north".parse::<HeadingMode>().is_err());
    }

    #[test]
    fn test_sample_json() {
        let json = r#"{"type":"position","timestamp":"2025-08-03T12:00:00Z","latitude":48.1173,"longitude":-122.4783,"speed":2.5}"#;
        let sample: Sample = serde_json::from_str(json).unwrap();
        match sample {
            Sample::Position(p) => {
                assert_eq!(p.latitude, 48.1173);
                assert_eq!(p.speed, Some(2.5));
                assert_eq!(p.course, None);
                assert_eq!(p.altitude, 0.0);
            }
            Sample::Heading(_) => panic!("expected a position sample"),
        }
    }
}
