//! Runs one attempt of one stage for one job.
//!
//! An attempt gets a fresh directory under the work tree and a deadline
//! derived from its resource tags. Only a successful attempt publishes;
//! a failed one leaves its files where they are.

use std::fs;
use std::sync::Arc;

use meerpipe_types::{JobKey, ObservationJob, ResourceTags, StageArtifact, StageKind};
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};

use crate::error::{PipelineError, Result};
use crate::ledger::ArtifactLedger;
use crate::publish::publish_artifact;
use crate::resources::{resource_tags, time_limit};
use crate::runner::ToolRunner;
use crate::settings::Settings;
use crate::stages::{StageEnv, StageInputs, run_stage};

#[derive(Clone)]
pub struct StageExecutor {
    settings: Arc<Settings>,
    runner: Arc<dyn ToolRunner>,
    ledger: Arc<ArtifactLedger>,
}

impl StageExecutor {
    pub fn new(
        settings: Arc<Settings>,
        runner: Arc<dyn ToolRunner>,
        ledger: Arc<ArtifactLedger>,
    ) -> Self {
        Self {
            settings,
            runner,
            ledger,
        }
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn ledger(&self) -> &Arc<ArtifactLedger> {
        &self.ledger
    }

    /// Run the next attempt of `stage` and publish its outputs.
    pub async fn run_attempt(
        &self,
        job: &ObservationJob,
        stage: StageKind,
    ) -> Result<StageArtifact> {
        let key = job.key();
        let attempt = self.ledger.begin_attempt(&key, stage)?;
        let tags = resource_tags(self.settings.resource_factors(stage), attempt, job.duration_secs);

        let span = info_span!(
            "stage",
            pulsar = %job.pulsar,
            utc = %job.utc,
            stage = %stage,
            attempt
        );
        async move {
            info!(
                time_limit_secs = tags.time_limit_secs,
                memory_mb = tags.memory_mb,
                "stage attempt starting"
            );
            match self.attempt(job, &key, stage, tags).await {
                Ok(artifact) => {
                    self.ledger
                        .record_success(&key, stage, tags, artifact.clone())?;
                    info!(artifact = artifact.label(), "stage published");
                    Ok(artifact)
                }
                Err(e) => {
                    self.ledger.record_failure(&key, stage, Some(tags), &e);
                    if e.is_retryable() {
                        warn!(error = %e, "stage attempt failed");
                    } else {
                        error!(error = %e, "stage failed, not retryable");
                    }
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        job: &ObservationJob,
        key: &JobKey,
        stage: StageKind,
        tags: ResourceTags,
    ) -> Result<StageArtifact> {
        let work_dir = self.settings.attempt_dir(key, stage, tags.attempt);
        if work_dir.exists() {
            fs::remove_dir_all(&work_dir).map_err(|e| PipelineError::io(&work_dir, e))?;
        }
        fs::create_dir_all(&work_dir).map_err(|e| PipelineError::io(&work_dir, e))?;

        let inputs = StageInputs::new(self.ledger.raw(key)?, self.ledger.published(key));
        let env = StageEnv {
            job,
            settings: &self.settings,
            runner: self.runner.as_ref(),
            stage,
            work_dir,
            time_limit_secs: tags.time_limit_secs,
            deadline: Instant::now() + time_limit(&tags),
        };
        let artifact = run_stage(&env, &inputs).await?;

        let settings = self.settings.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || publish_artifact(&settings, &key, stage, artifact))
            .await
            .map_err(|e| PipelineError::Runtime(format!("publish task failed: {e}")))?
    }
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor")
            .field("work_dir", &self.settings.work_dir)
            .field("output_dir", &self.settings.output_dir)
            .finish()
    }
}
