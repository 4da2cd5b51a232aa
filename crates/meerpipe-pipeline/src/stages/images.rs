//! Diagnostic plots of the flux-calibrated archives.

use std::path::Path;

use meerpipe_types::StageArtifact;

use super::{StageEnv, StageInputs, file_stem};
use crate::command::ToolCommand;
use crate::error::Result;

/// `(suffix, psrplot options)` for each plot.
const PLOTS: [(&str, &[&str]); 5] = [
    ("profile", &["-p", "flux", "-jFTDp"]),
    ("polarisation", &["-p", "Scyl", "-jFTD"]),
    ("phase_freq", &["-p", "freq", "-jTDp"]),
    ("phase_time", &["-p", "time", "-jFDp"]),
    ("bandpass", &["-p", "b", "-x", "-jT", "-lpol=0,1", "-c", "log=1"]),
];

pub async fn run(env: &StageEnv<'_>, inputs: &StageInputs) -> Result<StageArtifact> {
    let (raw, cleaned) = inputs.fluxcal()?;
    let mut files = Vec::with_capacity(PLOTS.len() * 2);
    for archive in [raw, cleaned] {
        for (suffix, options) in PLOTS {
            files.push(plot(env, archive, suffix, options).await?);
        }
    }
    Ok(StageArtifact::Images { files })
}

async fn plot(
    env: &StageEnv<'_>,
    archive: &Path,
    suffix: &str,
    options: &[&str],
) -> Result<std::path::PathBuf> {
    let image = env.output(format!("{}.{suffix}.png", file_stem(archive)?));
    let cmd = ToolCommand::new(&env.tools().psrplot)
        .args(options.iter().copied())
        .arg("-D")
        .arg(format!("{}/png", image.display()))
        .input(archive)?;
    env.run(&cmd).await?;
    env.expect(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{Fixture, touch_all};
    use meerpipe_types::StageKind;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_five_plots_per_archive() {
        let fx = Fixture::new();
        let env = fx.env(StageKind::PlotImages);
        let raw = fx.touch(&["fluxcal/obs.fluxcal"]).remove(0);
        let cleaned = fx.touch(&["fluxcal/obs_zap.fluxcal"]).remove(0);
        let expected: Vec<_> = ["obs", "obs_zap"]
            .iter()
            .flat_map(|stem| {
                PLOTS
                    .iter()
                    .map(|(suffix, _)| env.output(format!("{stem}.{suffix}.png")))
                    .collect::<Vec<_>>()
            })
            .collect();
        touch_all(&expected);

        let inputs = StageInputs::new(
            StageArtifact::Raw {
                header: "obs.header".into(),
                archives: vec![],
            },
            BTreeMap::from([(
                StageKind::FluxCalibrate,
                StageArtifact::FluxCalibrated { raw, cleaned },
            )]),
        );
        let artifact = run(&env, &inputs).await.unwrap();
        assert_eq!(artifact, StageArtifact::Images { files: expected });
        assert_eq!(fx.runner.calls.lock().len(), 10);

        let first = fx.runner.calls.lock()[0].display();
        assert!(first.contains("-jFTDp"), "{first}");
        assert!(first.contains("obs.profile.png/png"), "{first}");
    }
}
