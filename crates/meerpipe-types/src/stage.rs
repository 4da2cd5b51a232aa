//! Pipeline stage identifiers and their output categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Combine sub-integration files with `psradd`.
    Combine,
    /// Combine then polarisation-calibrate with `pac`.
    Calibrate,
    /// RFI zapping.
    Clean,
    /// Flux calibration of the raw and cleaned archives.
    FluxCalibrate,
    /// Diagnostic plots (sink).
    PlotImages,
    /// Time/frequency/polarisation scrunching.
    Decimate,
    /// Times of arrival.
    GenerateToas,
}

impl StageKind {
    pub const ALL: [StageKind; 7] = [
        StageKind::Combine,
        StageKind::Calibrate,
        StageKind::Clean,
        StageKind::FluxCalibrate,
        StageKind::PlotImages,
        StageKind::Decimate,
        StageKind::GenerateToas,
    ];

    /// Short identifier used for task ids, work directories and config keys.
    pub fn id(&self) -> &'static str {
        match self {
            StageKind::Combine => "combine",
            StageKind::Calibrate => "calibrate",
            StageKind::Clean => "clean",
            StageKind::FluxCalibrate => "fluxcal",
            StageKind::PlotImages => "images",
            StageKind::Decimate => "decimate",
            StageKind::GenerateToas => "toas",
        }
    }

    /// Output directory category the stage publishes into.
    pub fn category(&self) -> StageCategory {
        match self {
            StageKind::Combine | StageKind::Calibrate => StageCategory::Calibrated,
            StageKind::Clean => StageCategory::Cleaned,
            StageKind::FluxCalibrate => StageCategory::Fluxcal,
            StageKind::PlotImages => StageCategory::Images,
            StageKind::Decimate => StageCategory::Decimated,
            StageKind::GenerateToas => StageCategory::Timing,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for StageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .into_iter()
            .find(|stage| stage.id() == s)
            .ok_or_else(|| Error::UnknownStage(s.to_string()))
    }
}

/// Output directory categories under `{output}/{pulsar}/{utc}/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCategory {
    Calibrated,
    Cleaned,
    Images,
    Decimated,
    Fluxcal,
    Timing,
}

impl StageCategory {
    pub fn dir_name(&self) -> &'static str {
        match self {
            StageCategory::Calibrated => "calibrated",
            StageCategory::Cleaned => "cleaned",
            StageCategory::Images => "images",
            StageCategory::Decimated => "decimated",
            StageCategory::Fluxcal => "fluxcal",
            StageCategory::Timing => "timing",
        }
    }
}
