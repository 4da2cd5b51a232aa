//! Stage tasks for the workflow engine.
//!
//! `StageTask` implements Cloacina's `Task` trait directly, without macros,
//! so the per-job graph can be assembled at runtime from a `StagePlan`.
//! The job travels in the execution context under [`JOB_CONTEXT_KEY`]; each
//! task stores its published artifact under its stage id.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cloacina_workflow::context::Context;
use cloacina_workflow::error::TaskError;
use cloacina_workflow::namespace::TaskNamespace;
use cloacina_workflow::retry::RetryPolicy;
use cloacina_workflow::task::Task;
use meerpipe_config::EngineConfig;
use meerpipe_types::{ObservationJob, StageKind};
use serde_json::Value;

use crate::executor::StageExecutor;

/// Context key holding the serialized `ObservationJob`.
pub const JOB_CONTEXT_KEY: &str = "job";

/// Placeholder workflow id until the task is registered.
const PENDING_WORKFLOW: &str = "__pending__";

/// The async body of a task: owned context in, updated context out.
pub type TaskFn = Arc<
    dyn Fn(
            Context<Value>,
        )
            -> Pin<Box<dyn Future<Output = std::result::Result<Context<Value>, TaskError>> + Send>>
        + Send
        + Sync,
>;

pub struct StageTask {
    id: String,
    dependencies: Vec<TaskNamespace>,
    retry_policy: RetryPolicy,
    execute_fn: TaskFn,
}

impl StageTask {
    pub fn new(id: impl Into<String>, execute_fn: TaskFn) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            retry_policy: RetryPolicy::default(),
            execute_fn,
        }
    }

    /// A task that runs one attempt of `stage` per invocation.
    pub fn for_stage(stage: StageKind, executor: StageExecutor) -> Self {
        let execute_fn: TaskFn = Arc::new(move |ctx| {
            let executor = executor.clone();
            Box::pin(async move { run_stage_task(&executor, stage, ctx).await })
        });
        Self::new(stage.id(), execute_fn)
    }

    /// Depend on another task of the same workflow by id.
    pub fn with_dependency_id(mut self, task_id: &str) -> Self {
        self.dependencies.push(TaskNamespace::new(
            "public",
            "embedded",
            PENDING_WORKFLOW,
            task_id,
        ));
        self
    }

    /// Fill in the workflow name on dependencies added by id.
    pub(crate) fn resolve_workflow_name(mut self, workflow_name: &str) -> Self {
        for ns in &mut self.dependencies {
            if ns.workflow_id == PENDING_WORKFLOW {
                ns.workflow_id = workflow_name.to_string();
            }
        }
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// Retry policy for stage tasks from the engine settings.
pub fn retry_policy(engine: &EngineConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: i32::try_from(engine.max_attempts).unwrap_or(i32::MAX),
        initial_delay: Duration::from_millis(engine.retry_delay_ms),
        ..Default::default()
    }
}

async fn run_stage_task(
    executor: &StageExecutor,
    stage: StageKind,
    mut ctx: Context<Value>,
) -> std::result::Result<Context<Value>, TaskError> {
    let make_err = |message: String| TaskError::ExecutionFailed {
        message,
        task_id: stage.id().to_string(),
        timestamp: chrono::Utc::now(),
    };

    let job: ObservationJob = ctx
        .get(JOB_CONTEXT_KEY)
        .cloned()
        .ok_or_else(|| make_err(format!("context has no '{JOB_CONTEXT_KEY}'")))
        .and_then(|v| {
            serde_json::from_value(v).map_err(|e| make_err(format!("bad job in context: {e}")))
        })?;

    let artifact = executor
        .run_attempt(&job, stage)
        .await
        .map_err(|e| make_err(e.to_string()))?;
    let value = serde_json::to_value(&artifact)
        .map_err(|e| make_err(format!("cannot serialize artifact: {e}")))?;

    if ctx.get(stage.id()).is_some() {
        ctx.update(stage.id(), value)
            .map_err(|e| make_err(format!("Context update failed: {e}")))?;
    } else {
        ctx.insert(stage.id(), value)
            .map_err(|e| make_err(format!("Context insert failed: {e}")))?;
    }
    Ok(ctx)
}

impl std::fmt::Debug for StageTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageTask")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[async_trait]
impl Task for StageTask {
    async fn execute(
        &self,
        context: Context<Value>,
    ) -> std::result::Result<Context<Value>, TaskError> {
        (self.execute_fn)(context).await
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[TaskNamespace] {
        &self.dependencies
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.clone()
    }
}
