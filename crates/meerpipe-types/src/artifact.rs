//! Stage artifacts and per-job run records.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::ObservationJob;
use crate::stage::StageKind;

/// Paths produced by one stage and consumed by the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageArtifact {
    /// Discovered inputs: the observation header and its sub-integration files.
    Raw {
        header: PathBuf,
        archives: Vec<PathBuf>,
    },
    /// Output of combine or calibrate.
    Combined { archive: PathBuf },
    /// RFI-zapped archive.
    Cleaned { archive: PathBuf },
    /// Flux-calibrated versions of the combined and cleaned archives.
    FluxCalibrated { raw: PathBuf, cleaned: PathBuf },
    Images { files: Vec<PathBuf> },
    Decimated { archives: Vec<PathBuf> },
    /// One `.tim` per decimated archive, plus residual files when enabled.
    Timing {
        toas: Vec<PathBuf>,
        residuals: Vec<PathBuf>,
    },
}

impl StageArtifact {
    /// Every path the artifact carries, in a stable order.
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            StageArtifact::Raw { header, archives } => {
                let mut paths = vec![header.clone()];
                paths.extend(archives.iter().cloned());
                paths
            }
            StageArtifact::Combined { archive } | StageArtifact::Cleaned { archive } => {
                vec![archive.clone()]
            }
            StageArtifact::FluxCalibrated { raw, cleaned } => vec![raw.clone(), cleaned.clone()],
            StageArtifact::Images { files } => files.clone(),
            StageArtifact::Decimated { archives } => archives.clone(),
            StageArtifact::Timing { toas, residuals } => {
                toas.iter().chain(residuals.iter()).cloned().collect()
            }
        }
    }

    /// Rewrite every path, keeping the artifact's shape.
    pub fn try_map_paths<E>(
        self,
        mut f: impl FnMut(&Path) -> Result<PathBuf, E>,
    ) -> Result<Self, E> {
        fn each<E>(
            paths: Vec<PathBuf>,
            f: &mut impl FnMut(&Path) -> Result<PathBuf, E>,
        ) -> Result<Vec<PathBuf>, E> {
            paths.iter().map(|p| f(p)).collect()
        }

        Ok(match self {
            StageArtifact::Raw { header, archives } => StageArtifact::Raw {
                header: f(&header)?,
                archives: each(archives, &mut f)?,
            },
            StageArtifact::Combined { archive } => StageArtifact::Combined {
                archive: f(&archive)?,
            },
            StageArtifact::Cleaned { archive } => StageArtifact::Cleaned {
                archive: f(&archive)?,
            },
            StageArtifact::FluxCalibrated { raw, cleaned } => StageArtifact::FluxCalibrated {
                raw: f(&raw)?,
                cleaned: f(&cleaned)?,
            },
            StageArtifact::Images { files } => StageArtifact::Images {
                files: each(files, &mut f)?,
            },
            StageArtifact::Decimated { archives } => StageArtifact::Decimated {
                archives: each(archives, &mut f)?,
            },
            StageArtifact::Timing { toas, residuals } => StageArtifact::Timing {
                toas: each(toas, &mut f)?,
                residuals: each(residuals, &mut f)?,
            },
        })
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            StageArtifact::Raw { .. } => "raw",
            StageArtifact::Combined { .. } => "combined",
            StageArtifact::Cleaned { .. } => "cleaned",
            StageArtifact::FluxCalibrated { .. } => "fluxcal",
            StageArtifact::Images { .. } => "images",
            StageArtifact::Decimated { .. } => "decimated",
            StageArtifact::Timing { .. } => "timing",
        }
    }
}

/// Resource ceilings attached to one stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceTags {
    pub attempt: u32,
    pub time_limit_secs: f64,
    pub memory_mb: f64,
}

/// Outcome of a single stage within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub attempts: u32,
    /// Tags of the last attempt made.
    pub resources: Option<ResourceTags>,
    pub artifact: Option<StageArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Written to `summary.json` when a job finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job: ObservationJob,
    pub status: JobStatus,
    pub stages: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobSummary {
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }

    /// The record for a stage, if it ran.
    pub fn stage(&self, stage: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}
