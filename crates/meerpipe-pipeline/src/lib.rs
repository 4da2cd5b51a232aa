//! The meerpipe pulsar timing pipeline, powered by Cloacina.
//!
//! Observations are selected (manifest or catalog), resolved into jobs with
//! concrete ephemeris and template paths, and run through a fixed stage
//! graph by the workflow engine:
//!
//! ```text
//! combine | calibrate ─▶ clean ─▶ fluxcal ─┬─▶ images
//!                                         └─▶ decimate ─▶ toas
//! ```
//!
//! Each stage shells out to the external pulsar tools through a
//! [`ToolRunner`], publishes into `{output}/{pulsar}/{utc}/{category}/` and
//! is retried with growing resource ceilings when an attempt fails.

pub mod command;
pub mod engine;
pub mod error;
pub mod executor;
pub mod header;
pub mod index;
pub mod ledger;
pub mod manifest;
pub mod projects;
pub mod publish;
pub mod residuals;
pub mod resolver;
pub mod resources;
pub mod run;
pub mod runner;
pub mod selector;
pub mod settings;
pub mod stager;
pub mod stages;
pub mod task;

pub use command::ToolCommand;
pub use engine::{ExecutionResult, ExecutionStatus, WorkflowEngine};
pub use error::{PipelineError, Result};
pub use executor::StageExecutor;
pub use header::ObsHeader;
pub use index::{ObservationFiles, ObservationIndex};
pub use ledger::ArtifactLedger;
pub use manifest::{InvalidRow, Manifest, ManifestRow, read_manifest, write_manifest};
pub use projects::ProjectCodes;
pub use resolver::Resolver;
pub use run::Pipeline;
pub use runner::{ProcessRunner, ToolOutput, ToolRunner};
pub use selector::{Candidate, ObservationCatalog, Rejection, Selection, Selector};
pub use settings::{Settings, SettingsOverrides};
pub use stager::{PlannedStage, StagePlan, StagePreview};
pub use task::StageTask;
