//! The per-job stage graph.
//!
//! ```text
//! combine | calibrate -> clean -> fluxcal -> images
//!                                         -> decimate -> toas
//! ```
//!
//! The first stage is chosen by the `fluxcal` switch. Every job gets the
//! same graph.

use meerpipe_types::{ObservationJob, ResourceTags, StageKind};
use serde::Serialize;

use crate::resources::resource_tags;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStage {
    pub kind: StageKind,
    pub depends_on: Vec<StageKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<PlannedStage>,
}

/// A stage as a dry run shows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePreview {
    pub stage: StageKind,
    pub depends_on: Vec<StageKind>,
    pub resources: ResourceTags,
}

impl StagePlan {
    pub fn new(fluxcal: bool) -> Self {
        let first = if fluxcal {
            StageKind::Calibrate
        } else {
            StageKind::Combine
        };
        let stage = |kind, deps: &[StageKind]| PlannedStage {
            kind,
            depends_on: deps.to_vec(),
        };
        Self {
            stages: vec![
                stage(first, &[]),
                stage(StageKind::Clean, &[first]),
                stage(StageKind::FluxCalibrate, &[StageKind::Clean]),
                stage(StageKind::PlotImages, &[StageKind::FluxCalibrate]),
                stage(StageKind::Decimate, &[StageKind::FluxCalibrate]),
                stage(StageKind::GenerateToas, &[StageKind::Decimate]),
            ],
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.fluxcal)
    }

    /// Stages in an order where every dependency comes first.
    pub fn stages(&self) -> &[PlannedStage] {
        &self.stages
    }

    pub fn first(&self) -> StageKind {
        self.stages[0].kind
    }

    /// First-attempt resource tags for every stage of a job.
    pub fn preview(&self, settings: &Settings, job: &ObservationJob) -> Vec<StagePreview> {
        self.stages
            .iter()
            .map(|s| StagePreview {
                stage: s.kind,
                depends_on: s.depends_on.clone(),
                resources: resource_tags(settings.resource_factors(s.kind), 1, job.duration_secs),
            })
            .collect()
    }
}
