//! Workflow engine wrapper around Cloacina's `DefaultRunner`.
//!
//! Owns workflow registration, execution and shutdown. Scheduling features
//! of the runner (cron, triggers) are switched off; every job is a direct
//! execution of the stage workflow.

use std::collections::HashMap;
use std::sync::Arc;

use cloacina::prelude::*;
use meerpipe_config::EngineConfig;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::resources::ENGINE_TASK_TIMEOUT;
use crate::task::StageTask;

/// Result of one workflow execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    /// Final context, when it could be serialized.
    pub output: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    Completed,
    Failed(String),
    Running,
}

pub struct WorkflowEngine {
    runner: DefaultRunner,
    workflows: Arc<RwLock<HashMap<String, Workflow>>>,
}

impl WorkflowEngine {
    /// Start a runner backed by the SQLite database at `database_url`.
    pub async fn new(database_url: &str, config: &EngineConfig) -> Result<Self, PipelineError> {
        let mut runner_config = DefaultRunnerConfig::default();
        runner_config.max_concurrent_tasks = config.max_concurrent_tasks;
        runner_config.task_timeout = ENGINE_TASK_TIMEOUT;
        runner_config.pipeline_timeout = None;
        runner_config.enable_cron_scheduling = false;
        runner_config.enable_trigger_scheduling = false;

        let runner = DefaultRunner::with_config(database_url, runner_config)
            .await
            .map_err(|e| PipelineError::InitFailed(e.to_string()))?;

        info!(database = database_url, "workflow engine initialized");

        Ok(Self {
            runner,
            workflows: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub async fn register_workflow(&self, workflow: Workflow) -> Result<(), PipelineError> {
        let name = workflow.name().to_string();

        let wf = workflow.clone();
        cloacina::register_workflow_constructor(name.clone(), move || wf.clone());
        self.workflows.write().await.insert(name.clone(), workflow);

        info!(workflow = %name, "workflow registered");
        Ok(())
    }

    /// Build a workflow from stage tasks and register it.
    ///
    /// Each task is also registered in Cloacina's global task registry under
    /// `public::embedded::{name}::{task}` so the executor can find it.
    pub async fn register_stage_workflow(
        &self,
        name: &str,
        description: &str,
        tasks: Vec<StageTask>,
    ) -> Result<(), PipelineError> {
        if tasks.is_empty() {
            return Err(PipelineError::InvalidWorkflow(format!("{name} has no tasks")));
        }
        let mut builder = Workflow::builder(name).description(description);

        for task in tasks {
            let task = Arc::new(task.resolve_workflow_name(name));
            debug!(workflow = name, task = task.id(), "registering task");

            let namespace =
                cloacina_workflow::TaskNamespace::new("public", "embedded", name, task.id());
            let task_clone = task.clone();
            cloacina::register_task_constructor(namespace, move || task_clone.clone());

            builder = builder
                .add_task(task)
                .map_err(|e| PipelineError::InvalidWorkflow(e.to_string()))?;
        }

        let workflow = builder
            .build()
            .map_err(|e| PipelineError::InvalidWorkflow(e.to_string()))?;

        self.register_workflow(workflow).await
    }

    /// Execute a registered workflow and wait for it to finish.
    pub async fn execute(
        &self,
        workflow_name: &str,
        context: Context<serde_json::Value>,
    ) -> Result<ExecutionResult, PipelineError> {
        if !self.has_workflow(workflow_name).await {
            return Err(PipelineError::WorkflowNotFound(workflow_name.to_string()));
        }

        let result = self
            .runner
            .execute(workflow_name, context)
            .await
            .map_err(|e| PipelineError::ExecutionFailed(e.to_string()))?;

        let status = match result.status {
            PipelineStatus::Completed => ExecutionStatus::Completed,
            PipelineStatus::Failed => {
                ExecutionStatus::Failed(result.error_message.unwrap_or_default())
            }
            PipelineStatus::Running => ExecutionStatus::Running,
            PipelineStatus::Cancelled => ExecutionStatus::Failed("Cancelled".to_string()),
            _ => ExecutionStatus::Failed("Unknown status".to_string()),
        };

        let context_data = result.final_context.into_data();
        let output = match serde_json::to_value(&context_data) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Failed to serialize execution output: {e}");
                None
            }
        };

        Ok(ExecutionResult {
            execution_id: result.execution_id.to_string(),
            status,
            output,
        })
    }

    pub async fn has_workflow(&self, name: &str) -> bool {
        self.workflows.read().await.contains_key(name)
    }

    /// Drain running executions and stop the runner.
    pub async fn shutdown(self) -> Result<(), PipelineError> {
        info!("workflow engine shutting down");
        self.runner
            .shutdown()
            .await
            .map_err(|e| PipelineError::ShutdownFailed(e.to_string()))?;
        Ok(())
    }
}
