//! Running jobs through the stage workflow.
//!
//! One workflow is registered per `Pipeline`; each job is a separate
//! execution of it with the job in its context. Jobs run concurrently up to
//! `engine.max_concurrent_jobs` and share nothing beyond their own
//! `(pulsar, utc)` namespace.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use chrono::Utc;
use cloacina_workflow::context::Context;
use futures::StreamExt;
use meerpipe_types::{JobStatus, JobSummary, ObservationJob};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::engine::{ExecutionStatus, WorkflowEngine};
use crate::error::{PipelineError, Result};
use crate::executor::StageExecutor;
use crate::index::ObservationIndex;
use crate::ledger::ArtifactLedger;
use crate::publish::{prepare_output, write_summary};
use crate::runner::ToolRunner;
use crate::settings::Settings;
use crate::stager::StagePlan;
use crate::task::{JOB_CONTEXT_KEY, StageTask, retry_policy};

pub struct Pipeline {
    settings: Arc<Settings>,
    index: Arc<ObservationIndex>,
    executor: StageExecutor,
    engine: WorkflowEngine,
    plan: StagePlan,
    workflow: String,
}

impl Pipeline {
    /// Start the engine and register the stage workflow.
    pub async fn new(
        settings: Arc<Settings>,
        index: Arc<ObservationIndex>,
        runner: Arc<dyn ToolRunner>,
    ) -> Result<Self> {
        fs::create_dir_all(&settings.work_dir)
            .map_err(|e| PipelineError::io(&settings.work_dir, e))?;

        let engine = WorkflowEngine::new(&settings.database_url(), &settings.engine).await?;
        let ledger = Arc::new(ArtifactLedger::new());
        let executor = StageExecutor::new(settings.clone(), runner, ledger);
        let plan = StagePlan::from_settings(&settings);

        // Cloacina's registries are process-wide, so the name must be unique.
        let workflow = format!("meerpipe-{}", Uuid::new_v4().simple());
        let policy = retry_policy(&settings.engine);
        let tasks = plan
            .stages()
            .iter()
            .map(|planned| {
                planned.depends_on.iter().fold(
                    StageTask::for_stage(planned.kind, executor.clone())
                        .with_retry_policy(policy.clone()),
                    |task, dep| task.with_dependency_id(dep.id()),
                )
            })
            .collect();
        engine
            .register_stage_workflow(&workflow, "Per-observation pulsar timing stages", tasks)
            .await?;

        Ok(Self {
            settings,
            index,
            executor,
            engine,
            plan,
            workflow,
        })
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Process one job to completion. Failures are reported in the summary.
    pub async fn run_job(&self, job: ObservationJob) -> JobSummary {
        let key = job.key();
        let span = info_span!("job", pulsar = %job.pulsar, utc = %job.utc);
        async move {
            let started_at = Utc::now();
            info!(project = %job.project_code, band = %job.band, "job starting");

            let outcome = self.execute_job(&job).await;
            let stages = self.executor.ledger().records(&key);
            self.executor.ledger().remove(&key);

            let (status, error) = match outcome {
                Ok(()) => (JobStatus::Completed, None),
                Err(e) => {
                    let detail = stages
                        .iter()
                        .rev()
                        .find_map(|r| r.error.as_ref().map(|msg| format!("{}: {msg}", r.stage)))
                        .unwrap_or_else(|| e.to_string());
                    (JobStatus::Failed, Some(detail))
                }
            };
            let summary = JobSummary {
                job,
                status,
                stages,
                error,
                started_at,
                finished_at: Utc::now(),
            };

            match write_summary(&self.settings, &summary) {
                Ok(path) => info!(summary = %path.display(), "summary written"),
                Err(e) => warn!(error = %e, "could not write summary"),
            }
            match &summary.error {
                None => info!("job completed"),
                Some(e) => error!(error = %e, "job failed"),
            }
            summary
        }
        .instrument(span)
        .await
    }

    async fn execute_job(&self, job: &ObservationJob) -> Result<()> {
        let key = job.key();
        let files = self.index.require(&key)?;
        prepare_output(&self.settings, &key)?;
        self.executor.ledger().register(key.clone(), files.to_artifact());

        let job_value = serde_json::to_value(job)
            .map_err(|e| PipelineError::ExecutionFailed(format!("cannot serialize job: {e}")))?;
        let mut ctx = Context::new();
        ctx.insert(JOB_CONTEXT_KEY, job_value)
            .map_err(|e| PipelineError::ExecutionFailed(e.to_string()))?;

        let result = self.engine.execute(&self.workflow, ctx).await?;
        match result.status {
            ExecutionStatus::Completed => {}
            ExecutionStatus::Failed(message) => return Err(PipelineError::ExecutionFailed(message)),
            ExecutionStatus::Running => {
                return Err(PipelineError::ExecutionFailed(format!(
                    "execution {} did not finish",
                    result.execution_id
                )));
            }
        }

        let published = self.executor.ledger().published(&key);
        match self
            .plan
            .stages()
            .iter()
            .find(|s| !published.contains_key(&s.kind))
        {
            Some(missing) => Err(PipelineError::ExecutionFailed(format!(
                "{} did not publish any output",
                missing.kind
            ))),
            None => Ok(()),
        }
    }

    /// Process every job, at most `engine.max_concurrent_jobs` at a time.
    ///
    /// Summaries come back in the order the jobs were given. A job listed
    /// twice runs once.
    pub async fn run_all(&self, jobs: Vec<ObservationJob>) -> Vec<JobSummary> {
        let mut seen = HashSet::new();
        let jobs: Vec<ObservationJob> = jobs
            .into_iter()
            .filter(|job| {
                let fresh = seen.insert(job.key());
                if !fresh {
                    warn!(observation = %job.key(), "duplicate job skipped");
                }
                fresh
            })
            .collect();
        if jobs.is_empty() {
            info!("no jobs to run");
            return Vec::new();
        }

        let limit = self.settings.engine.max_concurrent_jobs.max(1);
        info!(jobs = jobs.len(), concurrency = limit, "running jobs");

        let mut summaries: Vec<(usize, JobSummary)> =
            futures::stream::iter(jobs.into_iter().enumerate())
                .map(|(i, job)| async move { (i, self.run_job(job).await) })
                .buffer_unordered(limit)
                .collect()
                .await;
        summaries.sort_by_key(|(i, _)| *i);
        summaries.into_iter().map(|(_, s)| s).collect()
    }

    pub async fn shutdown(self) -> Result<()> {
        self.engine.shutdown().await
    }
}
