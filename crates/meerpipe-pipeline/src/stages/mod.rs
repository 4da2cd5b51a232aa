//! Stage implementations.
//!
//! Each stage is a function of the job and the artifacts already published
//! for it. It writes only into its own attempt directory and returns the
//! artifact it produced; publishing happens afterwards in the executor.

pub mod clean;
pub mod combine;
pub mod decimate;
pub mod fluxcal;
pub mod images;
pub mod toas;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use meerpipe_config::ToolsConfig;
use meerpipe_types::{ObservationJob, StageArtifact, StageKind};
use tokio::time::Instant;

use crate::command::ToolCommand;
use crate::error::{PipelineError, Result};
use crate::runner::{ToolOutput, ToolRunner, run_checked};
use crate::settings::Settings;

/// Everything a stage attempt may touch.
pub struct StageEnv<'a> {
    pub job: &'a ObservationJob,
    pub settings: &'a Settings,
    pub runner: &'a dyn ToolRunner,
    pub stage: StageKind,
    /// Fresh directory owned by this attempt.
    pub work_dir: PathBuf,
    pub time_limit_secs: f64,
    pub deadline: Instant,
}

impl StageEnv<'_> {
    pub fn tools(&self) -> &ToolsConfig {
        &self.settings.tools
    }

    /// Path of a file inside the attempt directory.
    pub fn output(&self, name: impl AsRef<Path>) -> PathBuf {
        self.work_dir.join(name)
    }

    /// Run a tool with whatever is left of the attempt's time ceiling.
    pub async fn run(&self, cmd: &ToolCommand) -> Result<ToolOutput> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(self.exceeded());
        }
        run_checked(self.runner, cmd, remaining)
            .await
            .map_err(|e| match e {
                PipelineError::ResourceExceeded { .. } => self.exceeded(),
                other => other,
            })
    }

    /// A file the last tool was expected to write.
    pub fn expect(&self, path: PathBuf) -> Result<PathBuf> {
        if path.is_file() {
            Ok(path)
        } else {
            Err(PipelineError::Lookup(format!(
                "{} did not produce {}",
                self.stage,
                path.display()
            )))
        }
    }

    fn exceeded(&self) -> PipelineError {
        PipelineError::ResourceExceeded {
            stage: self.stage.id().to_string(),
            limit_secs: self.time_limit_secs,
        }
    }
}

/// Artifacts available to a stage: the discovered inputs plus whatever
/// earlier stages published.
#[derive(Debug, Clone)]
pub struct StageInputs {
    raw: StageArtifact,
    published: BTreeMap<StageKind, StageArtifact>,
}

impl StageInputs {
    pub fn new(raw: StageArtifact, published: BTreeMap<StageKind, StageArtifact>) -> Self {
        Self { raw, published }
    }

    pub fn raw(&self) -> Result<(&Path, &[PathBuf])> {
        match &self.raw {
            StageArtifact::Raw { header, archives } => Ok((header, archives)),
            other => Err(unexpected("raw", other)),
        }
    }

    /// Output of whichever first stage ran.
    pub fn combined(&self) -> Result<&Path> {
        [StageKind::Calibrate, StageKind::Combine]
            .iter()
            .find_map(|stage| match self.published.get(stage) {
                Some(StageArtifact::Combined { archive }) => Some(archive.as_path()),
                _ => None,
            })
            .ok_or_else(|| missing("combined archive"))
    }

    pub fn cleaned(&self) -> Result<&Path> {
        match self.published.get(&StageKind::Clean) {
            Some(StageArtifact::Cleaned { archive }) => Ok(archive),
            Some(other) => Err(unexpected("cleaned", other)),
            None => Err(missing("cleaned archive")),
        }
    }

    /// `(raw, cleaned)` flux-calibrated archives.
    pub fn fluxcal(&self) -> Result<(&Path, &Path)> {
        match self.published.get(&StageKind::FluxCalibrate) {
            Some(StageArtifact::FluxCalibrated { raw, cleaned }) => Ok((raw, cleaned)),
            Some(other) => Err(unexpected("fluxcal", other)),
            None => Err(missing("flux-calibrated archives")),
        }
    }

    pub fn decimated(&self) -> Result<&[PathBuf]> {
        match self.published.get(&StageKind::Decimate) {
            Some(StageArtifact::Decimated { archives }) => Ok(archives),
            Some(other) => Err(unexpected("decimated", other)),
            None => Err(missing("decimated archives")),
        }
    }
}

fn missing(what: &str) -> PipelineError {
    PipelineError::Lookup(format!("no {what} published"))
}

fn unexpected(wanted: &str, got: &StageArtifact) -> PipelineError {
    PipelineError::Lookup(format!("expected {wanted} artifact, found {}", got.label()))
}

/// `a/b/name.ext` → `name`.
pub(crate) fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| PipelineError::Lookup(format!("{} has no file name", path.display())))
}

/// Run one stage.
pub async fn run_stage(env: &StageEnv<'_>, inputs: &StageInputs) -> Result<StageArtifact> {
    match env.stage {
        StageKind::Combine => combine::combine(env, inputs).await,
        StageKind::Calibrate => combine::calibrate(env, inputs).await,
        StageKind::Clean => clean::run(env, inputs).await,
        StageKind::FluxCalibrate => fluxcal::run(env, inputs).await,
        StageKind::PlotImages => images::run(env, inputs).await,
        StageKind::Decimate => decimate::run(env, inputs).await,
        StageKind::GenerateToas => toas::run(env, inputs).await,
    }
}
