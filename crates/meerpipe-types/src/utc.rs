//! Observation UTC timestamps.
//!
//! Observations are keyed by their start time in the MeerTime directory
//! convention `YYYY-MM-DD-HH:MM:SS`. The catalog speaks ISO-8601, so both
//! forms parse into the same value and render back in either form.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Directory-convention timestamp format.
const OBS_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

/// ISO-8601 format with an explicit UTC offset.
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+00:00";

/// Start time of an observation, always in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObsUtc(NaiveDateTime);

impl ObsUtc {
    /// Parse either `YYYY-MM-DD-HH:MM:SS` or an ISO-8601 timestamp.
    ///
    /// Offsets are folded into UTC; fractional seconds are dropped.
    pub fn parse(value: &str) -> Result<Self, Error> {
        let trimmed = value.trim();
        let invalid = || Error::InvalidUtc {
            value: value.to_string(),
        };

        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, OBS_FORMAT) {
            return Ok(Self(dt));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self::truncated(dt.naive_utc()));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(Self::truncated(dt));
            }
        }
        Err(invalid())
    }

    fn truncated(dt: NaiveDateTime) -> Self {
        use chrono::Timelike;
        Self(dt.with_nanosecond(0).unwrap_or(dt))
    }

    /// Render as ISO-8601 with a `+00:00` offset, as the catalog expects.
    pub fn to_iso8601(&self) -> String {
        self.0.format(ISO_FORMAT).to_string()
    }

    /// The underlying naive UTC datetime.
    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for ObsUtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(OBS_FORMAT))
    }
}

impl FromStr for ObsUtc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ObsUtc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObsUtc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
