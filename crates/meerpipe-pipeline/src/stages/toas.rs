//! Times of arrival, one `.tim` per decimated archive.
//!
//! Archives with fewer channels than the template are timed against the
//! template as a frequency-resolved portrait.

use std::path::{Path, PathBuf};

use meerpipe_types::StageArtifact;
use tracing::{debug, info};

use super::{StageEnv, StageInputs, file_stem};
use crate::command::ToolCommand;
use crate::error::{PipelineError, Result};
use crate::residuals;

const TOA_FORMAT: &str = "tempo2 IPTA";
const TOA_FLAGS: &str = "chan rcvr snr length subint";

pub async fn run(env: &StageEnv<'_>, inputs: &StageInputs) -> Result<StageArtifact> {
    let archives = inputs.decimated()?;
    let template_nchan = channel_count(env, &env.job.template).await?;
    debug!(template_nchan, "template channel count");

    let mut toas = Vec::with_capacity(archives.len());
    let mut residual_files = Vec::new();
    for archive in archives {
        let nchan = channel_count(env, archive).await?;
        let tim = generate(env, archive, nchan < template_nchan).await?;
        if env.settings.residuals {
            let (raw, comp) = residuals_for(env, &tim).await?;
            residual_files.push(raw);
            residual_files.push(comp);
        }
        toas.push(tim);
    }

    Ok(StageArtifact::Timing {
        toas,
        residuals: residual_files,
    })
}

/// Channel count reported by `vap -nc -c nchan`.
async fn channel_count(env: &StageEnv<'_>, archive: &Path) -> Result<u32> {
    let cmd = ToolCommand::new(&env.tools().vap)
        .args(["-nc", "-c", "nchan"])
        .input(archive)?;
    let output = env.run(&cmd).await?;
    parse_nchan(&output.stdout).ok_or_else(|| PipelineError::ToolOutput {
        tool: cmd.program().to_string(),
        message: format!("no channel count for {}", archive.display()),
    })
}

/// The last field of the last non-empty line.
pub fn parse_nchan(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())?
        .split_whitespace()
        .last()?
        .parse()
        .ok()
}

async fn generate(env: &StageEnv<'_>, archive: &Path, portrait: bool) -> Result<PathBuf> {
    let tim = env.output(format!("{}.tim", file_stem(archive)?));

    let mut cmd = ToolCommand::new(&env.tools().pat).arg("-jp");
    if portrait {
        cmd = cmd.arg("-P");
    }
    let cmd = cmd
        .args(["-f", TOA_FORMAT, "-C", TOA_FLAGS, "-s"])
        .input(&env.job.template)?
        .args(["-A", "FDM"])
        .input(archive)?
        .stdout_to(&tim);
    env.run(&cmd).await?;

    env.expect(tim)
}

async fn residuals_for(env: &StageEnv<'_>, tim: &Path) -> Result<(PathBuf, PathBuf)> {
    let cmd = residuals::tempo2_command(env.tools(), &env.job.ephemeris, tim)?;
    let output = env.run(&cmd).await?;
    let parsed = residuals::parse_general2(&output.stdout)?;

    if let Some(stats) = residuals::weighted_stats(&parsed) {
        info!(
            tim = %tim.display(),
            count = stats.count,
            weighted_mean = stats.weighted_mean,
            weighted_rms = stats.weighted_rms,
            "residuals"
        );
    }
    residuals::write_residual_files(&env.work_dir, &file_stem(tim)?, &parsed)
}
