//! RFI zapping of the combined archive.

use meerpipe_types::StageArtifact;

use super::{StageEnv, StageInputs, file_stem};
use crate::command::ToolCommand;
use crate::error::Result;

pub async fn run(env: &StageEnv<'_>, inputs: &StageInputs) -> Result<StageArtifact> {
    let combined = inputs.combined()?;
    let output = env.output(format!("{}_zap.ar", file_stem(combined)?));

    let cmd = ToolCommand::new(&env.tools().clean)
        .arg("-a")
        .input(combined)?
        .arg("-T")
        .input(&env.job.template)?
        .arg("-o")
        .path(&output);
    env.run(&cmd).await?;

    Ok(StageArtifact::Cleaned {
        archive: env.expect(output)?,
    })
}
