//! Per-job record of stage attempts and published artifacts.
//!
//! Artifacts are append-only: once a stage has published, its artifact is
//! never replaced. A stage that fails with a non-retryable error is marked
//! so that later engine retries fail fast without invoking any tool.

use std::collections::{BTreeMap, HashMap};

use meerpipe_types::{JobKey, ResourceTags, StageArtifact, StageKind, StageRecord};
use parking_lot::RwLock;

use crate::error::{PipelineError, Result};

#[derive(Debug, Default, Clone)]
struct StageState {
    attempts: u32,
    resources: Option<ResourceTags>,
    artifact: Option<StageArtifact>,
    error: Option<String>,
    fatal: bool,
}

#[derive(Debug)]
struct JobLedger {
    raw: StageArtifact,
    stages: BTreeMap<StageKind, StageState>,
}

#[derive(Debug, Default)]
pub struct ArtifactLedger {
    jobs: RwLock<HashMap<JobKey, JobLedger>>,
}

impl ArtifactLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a job from its discovered inputs, discarding any
    /// earlier record for the same observation.
    pub fn register(&self, key: JobKey, raw: StageArtifact) {
        self.jobs.write().insert(
            key,
            JobLedger {
                raw,
                stages: BTreeMap::new(),
            },
        );
    }

    pub fn remove(&self, key: &JobKey) {
        self.jobs.write().remove(key);
    }

    pub fn raw(&self, key: &JobKey) -> Result<StageArtifact> {
        self.jobs
            .read()
            .get(key)
            .map(|job| job.raw.clone())
            .ok_or_else(|| PipelineError::Lookup(format!("job {key} is not registered")))
    }

    /// Every artifact published so far for a job.
    pub fn published(&self, key: &JobKey) -> BTreeMap<StageKind, StageArtifact> {
        let jobs = self.jobs.read();
        let Some(job) = jobs.get(key) else {
            return BTreeMap::new();
        };
        job.stages
            .iter()
            .filter_map(|(stage, state)| Some((*stage, state.artifact.clone()?)))
            .collect()
    }

    /// Claim the next attempt number for a stage.
    pub fn begin_attempt(&self, key: &JobKey, stage: StageKind) -> Result<u32> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(key)
            .ok_or_else(|| PipelineError::Lookup(format!("job {key} is not registered")))?;
        let state = job.stages.entry(stage).or_default();

        if state.fatal {
            return Err(PipelineError::ExecutionFailed(format!(
                "{stage} failed permanently: {}",
                state.error.as_deref().unwrap_or("unknown error")
            )));
        }
        if state.artifact.is_some() {
            return Err(PipelineError::ExecutionFailed(format!(
                "{stage} already published for {key}"
            )));
        }
        state.attempts += 1;
        Ok(state.attempts)
    }

    pub fn record_success(
        &self,
        key: &JobKey,
        stage: StageKind,
        tags: ResourceTags,
        artifact: StageArtifact,
    ) -> Result<()> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(key)
            .ok_or_else(|| PipelineError::Lookup(format!("job {key} is not registered")))?;
        let state = job.stages.entry(stage).or_default();
        if state.artifact.is_some() {
            return Err(PipelineError::ExecutionFailed(format!(
                "{stage} already published for {key}"
            )));
        }
        state.resources = Some(tags);
        state.artifact = Some(artifact);
        state.error = None;
        Ok(())
    }

    pub fn record_failure(
        &self,
        key: &JobKey,
        stage: StageKind,
        tags: Option<ResourceTags>,
        error: &PipelineError,
    ) {
        let mut jobs = self.jobs.write();
        let Some(job) = jobs.get_mut(key) else {
            return;
        };
        let state = job.stages.entry(stage).or_default();
        if tags.is_some() {
            state.resources = tags;
        }
        state.error = Some(error.to_string());
        state.fatal |= !error.is_retryable();
    }

    /// Stage records in pipeline order.
    pub fn records(&self, key: &JobKey) -> Vec<StageRecord> {
        let jobs = self.jobs.read();
        let Some(job) = jobs.get(key) else {
            return Vec::new();
        };
        job.stages
            .iter()
            .map(|(stage, state)| StageRecord {
                stage: *stage,
                attempts: state.attempts,
                resources: state.resources,
                artifact: state.artifact.clone(),
                error: state.error.clone(),
            })
            .collect()
    }
}
