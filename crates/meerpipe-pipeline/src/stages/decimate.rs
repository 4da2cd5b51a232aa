//! Time, frequency and polarisation scrunching of the cleaned,
//! flux-calibrated archive.
//!
//! Each `(time_subs, freq_subs)` pair yields a full-Stokes archive and a
//! total-intensity archive with the configured phase rotation, named
//! `{stem}.{f}ch4p{t}t.ar` and `{stem}.{f}ch1p{t}t.ar`.

use std::path::{Path, PathBuf};

use meerpipe_types::StageArtifact;

use super::{StageEnv, StageInputs, file_stem};
use crate::command::ToolCommand;
use crate::error::Result;

/// Extension for one decimated product.
pub fn extension(time_subs: u32, freq_subs: u32, npol: u32) -> String {
    format!("{freq_subs}ch{npol}p{time_subs}t.ar")
}

pub async fn run(env: &StageEnv<'_>, inputs: &StageInputs) -> Result<StageArtifact> {
    let (_, cleaned) = inputs.fluxcal()?;
    let stem = file_stem(cleaned)?;
    let decimation = &env.settings.decimation;

    let mut archives = Vec::new();
    for &t in &decimation.time_subs {
        for &f in &decimation.freq_subs {
            archives.push(pam(env, cleaned, &stem, t, f, None).await?);
            archives.push(
                pam(env, cleaned, &stem, t, f, Some(decimation.pscrunch_rotation)).await?,
            );
        }
    }
    Ok(StageArtifact::Decimated { archives })
}

/// One `pam` call; `rotation` selects the pscrunched variant.
async fn pam(
    env: &StageEnv<'_>,
    input: &Path,
    stem: &str,
    time_subs: u32,
    freq_subs: u32,
    rotation: Option<f64>,
) -> Result<PathBuf> {
    let npol = if rotation.is_some() { 1 } else { 4 };
    let ext = extension(time_subs, freq_subs, npol);

    let mut cmd = ToolCommand::new(&env.tools().pam)
        .args(["--setnsub".to_string(), time_subs.to_string()])
        .args(["--setnchn".to_string(), freq_subs.to_string()]);
    if let Some(turns) = rotation {
        cmd = cmd.args(["-p".to_string(), "-r".to_string(), turns.to_string()]);
    }
    let cmd = cmd
        .args(["-e", ext.as_str(), "-u"])
        .path(&env.work_dir)
        .input(input)?;
    env.run(&cmd).await?;

    env.expect(env.output(format!("{stem}.{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{Fixture, touch_all};
    use meerpipe_types::StageKind;
    use std::collections::BTreeMap;

    #[test]
    fn test_extension() {
        assert_eq!(extension(1, 32, 4), "32ch4p1t.ar");
        assert_eq!(extension(8, 16, 1), "16ch1p8t.ar");
    }

    #[tokio::test]
    async fn test_two_outputs_per_pair() {
        let mut fx = Fixture::new();
        fx.settings.decimation.time_subs = vec![1, 4];
        fx.settings.decimation.freq_subs = vec![1, 16, 32];
        let env = fx.env(StageKind::Decimate);

        let raw = fx.touch(&["fluxcal/obs.fluxcal"]).remove(0);
        let cleaned = fx.touch(&["fluxcal/obs_zap.fluxcal"]).remove(0);
        let mut expected = Vec::new();
        for t in [1, 4] {
            for f in [1, 16, 32] {
                for npol in [4, 1] {
                    expected.push(env.output(format!("obs_zap.{}", extension(t, f, npol))));
                }
            }
        }
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
        let StageArtifact::Decimated { archives } = run(&env, &inputs).await.unwrap() else {
            panic!("expected decimated archives");
        };
        assert_eq!(archives.len(), 2 * 2 * 3);
        assert_eq!(archives, expected);

        let calls = fx.runner.calls.lock();
        let pscrunched = calls[1].display();
        assert!(pscrunched.contains("-p -r 0.5"), "{pscrunched}");
        assert!(!calls[0].display().contains(" -r "));
    }
}
