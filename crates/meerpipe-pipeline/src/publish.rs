//! The output tree: `{output}/{pulsar}/{utc}/{category}/`.

use std::fs;
use std::path::{Path, PathBuf};

use meerpipe_types::{JobKey, JobSummary, StageArtifact, StageKind};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::settings::Settings;

pub const SUMMARY_FILE: &str = "summary.json";

/// Get a job's output directory ready before its first stage runs.
///
/// With overwrite enabled any previous outputs are removed first.
pub fn prepare_output(settings: &Settings, key: &JobKey) -> Result<PathBuf> {
    let dir = settings.job_output_dir(key);
    if settings.overwrite && dir.exists() {
        info!(observation = %key, path = %dir.display(), "removing previous outputs");
        fs::remove_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
    }
    fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
    Ok(dir)
}

/// Copy a stage's outputs into its category directory.
///
/// Returns the artifact rewritten to point at the published copies. Nothing
/// from the attempt directory is referenced afterwards.
pub fn publish_artifact(
    settings: &Settings,
    key: &JobKey,
    stage: StageKind,
    artifact: StageArtifact,
) -> Result<StageArtifact> {
    let dest_dir = settings
        .job_output_dir(key)
        .join(stage.category().dir_name());
    fs::create_dir_all(&dest_dir).map_err(|e| PipelineError::io(&dest_dir, e))?;

    artifact.try_map_paths(|src| copy_into(src, &dest_dir))
}

fn copy_into(src: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| PipelineError::Lookup(format!("output {} has no file name", src.display())))?;
    let dest = dest_dir.join(name);
    fs::copy(src, &dest).map_err(|e| PipelineError::io(src, e))?;
    debug!(from = %src.display(), to = %dest.display(), "published");
    Ok(dest)
}

/// Write `summary.json` into the job's output directory.
pub fn write_summary(settings: &Settings, summary: &JobSummary) -> Result<PathBuf> {
    let dir = settings.job_output_dir(&summary.job.key());
    fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
    let path = dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| PipelineError::io(&path, std::io::Error::other(e)))?;
    fs::write(&path, json).map_err(|e| PipelineError::io(&path, e))?;
    Ok(path)
}
