//! Observation jobs.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utc::ObsUtc;

/// Receiver band an observation was recorded with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Band {
    Uhf,
    LBand,
    SBand,
    /// Any band label the pipeline has no special handling for.
    Other(String),
}

impl Band {
    /// Derive the band from a centre frequency in MHz.
    pub fn from_frequency_mhz(freq: f64) -> Self {
        if freq < 1000.0 {
            Band::Uhf
        } else if freq < 2000.0 {
            Band::LBand
        } else {
            Band::SBand
        }
    }

    /// Directory label used in template paths.
    pub fn as_str(&self) -> &str {
        match self {
            Band::Uhf => "UHF",
            Band::LBand => "LBAND",
            Band::SBand => "SBAND",
            Band::Other(label) => label,
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Band {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "UHF" => Band::Uhf,
            "LBAND" | "L-BAND" | "L" => Band::LBand,
            "SBAND" | "S-BAND" | "S" => Band::SBand,
            _ => Band::Other(value.trim().to_string()),
        }
    }
}

impl From<Band> for String {
    fn from(band: Band) -> Self {
        band.as_str().to_string()
    }
}

impl FromStr for Band {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Band::from(s.to_string()))
    }
}

/// Identity of an observation: pulsar name plus start time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub pulsar: String,
    pub utc: ObsUtc,
}

impl JobKey {
    pub fn new(pulsar: impl Into<String>, utc: ObsUtc) -> Self {
        Self {
            pulsar: pulsar.into(),
            utc,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pulsar, self.utc)
    }
}

/// A fully resolved unit of work: one observation of one pulsar.
///
/// Created once by the selector and resolver, then shared read-only by
/// every stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationJob {
    pub pulsar: String,
    pub utc: ObsUtc,
    pub project_code: String,
    pub band: Band,
    /// Approximate integration length; drives the resource ceilings.
    pub duration_secs: f64,
    pub ephemeris: PathBuf,
    pub template: PathBuf,
}

impl ObservationJob {
    pub fn key(&self) -> JobKey {
        JobKey::new(self.pulsar.clone(), self.utc)
    }

    /// File stem shared by the products of this observation.
    pub fn stem(&self) -> String {
        format!("{}_{}", self.pulsar, self.utc)
    }
}
