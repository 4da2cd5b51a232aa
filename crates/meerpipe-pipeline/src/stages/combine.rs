//! First stage: combine sub-integrations, optionally calibrating.
//!
//! Both variants produce a single `{stem}.ar` in the attempt directory.

use std::path::{Path, PathBuf};

use meerpipe_types::StageArtifact;
use tracing::warn;

use super::{StageEnv, StageInputs};
use crate::command::ToolCommand;
use crate::error::Result;

/// Sub-integrations to combine.
///
/// The first and last files are usually partial and are dropped unless
/// edge sub-integrations were asked for. With fewer than three files there
/// would be nothing left, so everything is kept.
pub fn select_subints(archives: &[PathBuf], use_edge_subints: bool) -> Vec<PathBuf> {
    if use_edge_subints {
        return archives.to_vec();
    }
    if archives.len() < 3 {
        warn!(
            count = archives.len(),
            "too few sub-integrations to drop the edges, keeping all"
        );
        return archives.to_vec();
    }
    archives[1..archives.len() - 1].to_vec()
}

fn psradd(env: &StageEnv<'_>, inputs: &StageInputs, output: &Path) -> Result<ToolCommand> {
    let (_, archives) = inputs.raw()?;
    let selected = select_subints(archives, env.settings.use_edge_subints);

    let mut cmd = ToolCommand::new(&env.tools().psradd)
        .arg("-E")
        .input(&env.job.ephemeris)?
        .arg("-o")
        .path(output);
    for archive in &selected {
        cmd = cmd.input(archive)?;
    }
    Ok(cmd)
}

pub async fn combine(env: &StageEnv<'_>, inputs: &StageInputs) -> Result<StageArtifact> {
    let output = env.output(format!("{}.ar", env.job.stem()));
    env.run(&psradd(env, inputs, &output)?).await?;
    Ok(StageArtifact::Combined {
        archive: env.expect(output)?,
    })
}

/// `psradd` into `{stem}.add`, then `pac` writes the calibrated `{stem}.ar`.
pub async fn calibrate(env: &StageEnv<'_>, inputs: &StageInputs) -> Result<StageArtifact> {
    let stem = env.job.stem();
    let added = env.output(format!("{stem}.add"));
    env.run(&psradd(env, inputs, &added)?).await?;

    let pac = ToolCommand::new(&env.tools().pac)
        .args(["-XP", "-O"])
        .path(&env.work_dir)
        .args(["-e", "ar"])
        .input(&env.expect(added)?)?;
    env.run(&pac).await?;

    Ok(StageArtifact::Combined {
        archive: env.expect(env.output(format!("{stem}.ar")))?,
    })
}
