//! Flux calibration of the combined and cleaned archives.
//!
//! `fluxcal` writes `.fluxcal` files next to its inputs, so both archives
//! are linked into the attempt directory first and the tool runs there.

use std::fs;
use std::path::{Path, PathBuf};

use meerpipe_types::StageArtifact;

use super::{StageEnv, StageInputs, file_stem};
use crate::command::ToolCommand;
use crate::error::{PipelineError, Result};

const EXTENSION: &str = "fluxcal";

pub async fn run(env: &StageEnv<'_>, inputs: &StageInputs) -> Result<StageArtifact> {
    let (header, _) = inputs.raw()?;
    let raw = stage_copy(env, inputs.combined()?)?;
    let cleaned = stage_copy(env, inputs.cleaned()?)?;

    let cmd = ToolCommand::new(&env.tools().fluxcal)
        .args(["-psrname", env.job.pulsar.as_str()])
        .args(["-obsname".to_string(), env.job.utc.to_string()])
        .arg("-obsheader")
        .input(header)?
        .arg("-cleanedfile")
        .input(&cleaned)?
        .arg("-rawfile")
        .input(&raw)?
        .arg("-parfile")
        .input(&env.job.ephemeris)?
        .current_dir(&env.work_dir);
    env.run(&cmd).await?;

    Ok(StageArtifact::FluxCalibrated {
        raw: env.expect(calibrated_name(env, &raw)?)?,
        cleaned: env.expect(calibrated_name(env, &cleaned)?)?,
    })
}

fn calibrated_name(env: &StageEnv<'_>, input: &Path) -> Result<PathBuf> {
    Ok(env.output(format!("{}.{EXTENSION}", file_stem(input)?)))
}

/// Hard-link `src` into the attempt directory, copying across filesystems.
fn stage_copy(env: &StageEnv<'_>, src: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| PipelineError::Lookup(format!("{} has no file name", src.display())))?;
    let dest = env.output(name);
    if dest.exists() {
        fs::remove_file(&dest).map_err(|e| PipelineError::io(&dest, e))?;
    }
    if fs::hard_link(src, &dest).is_err() {
        fs::copy(src, &dest).map_err(|e| PipelineError::io(src, e))?;
    }
    Ok(dest)
}
