//! End-to-end runs of the stage workflow against stand-in tools.
//!
//! `FakeTools` writes whatever file each real tool would write, so every
//! stage sees the inputs it expects and publishes real files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meerpipe_catalog::{CatalogObservation, ObservationFilter, ObservationListing};
use meerpipe_config::MeerpipeConfig;
use meerpipe_pipeline::{
    ObservationCatalog, ObservationIndex, Pipeline, PipelineError, Resolver, Selector, Settings,
    SettingsOverrides, ToolCommand, ToolOutput, ToolRunner,
};
use meerpipe_types::{JobStatus, ObsUtc, StageArtifact, StageKind};
use parking_lot::Mutex;
use tempfile::TempDir;

const PULSAR: &str = "J0437-4715";
const UTC: &str = "2021-01-01-00:00:00";

#[derive(Default)]
struct FakeTools {
    calls: Mutex<Vec<(String, Duration)>>,
    /// Remaining failures per program.
    failures: Mutex<HashMap<String, u32>>,
}

impl FakeTools {
    fn failing(program: &str, times: u32) -> Self {
        let tools = Self::default();
        tools.failures.lock().insert(program.to_string(), times);
        tools
    }

    fn count(&self, program: &str) -> usize {
        self.calls.lock().iter().filter(|(p, _)| p == program).count()
    }

    fn timeouts(&self, program: &str) -> Vec<Duration> {
        self.calls
            .lock()
            .iter()
            .filter(|(p, _)| p == program)
            .map(|(_, t)| *t)
            .collect()
    }
}

fn after<'a>(args: &'a [String], flag: &str) -> &'a str {
    let i = args.iter().position(|a| a == flag).unwrap();
    &args[i + 1]
}

fn stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .unwrap()
        .to_string_lossy()
        .into_owned()
}

fn touch(path: impl AsRef<Path>) {
    fs::write(path, b"fake").unwrap();
}

#[async_trait]
impl ToolRunner for FakeTools {
    async fn run(
        &self,
        cmd: &ToolCommand,
        timeout: Duration,
    ) -> meerpipe_pipeline::Result<ToolOutput> {
        let program = cmd.program().to_string();
        self.calls.lock().push((program.clone(), timeout));

        if let Some(left) = self.failures.lock().get_mut(&program) {
            if *left > 0 {
                *left -= 1;
                return Ok(ToolOutput {
                    code: Some(137),
                    stderr: "killed".into(),
                    ..Default::default()
                });
            }
        }

        let args = cmd.get_args();
        let last = args.last().map(String::as_str).unwrap_or_default();
        let mut stdout = String::new();
        match program.as_str() {
            "psradd" | "clean_archive.py" => touch(after(args, "-o")),
            "pac" => touch(Path::new(after(args, "-O")).join(format!("{}.ar", stem(last)))),
            "fluxcal" => {
                let dir = cmd.get_current_dir().unwrap();
                for flag in ["-rawfile", "-cleanedfile"] {
                    touch(dir.join(format!("{}.fluxcal", stem(after(args, flag)))));
                }
            }
            "psrplot" => touch(after(args, "-D").trim_end_matches("/png")),
            "pam" => touch(Path::new(after(args, "-u")).join(format!(
                "{}.{}",
                stem(last),
                after(args, "-e")
            ))),
            "vap" => stdout = format!("filename nchan\n{last} 32\n"),
            "pat" => stdout = "FORMAT 1\n".to_string(),
            other => panic!("unexpected tool {other}"),
        }
        Ok(ToolOutput {
            code: Some(0),
            stdout,
            ..Default::default()
        })
    }
}

struct Layout {
    tmp: TempDir,
    ephemeris: PathBuf,
    template: PathBuf,
}

impl Layout {
    /// One observation on disk with four sub-integrations.
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let obs = tmp.path().join("input").join(PULSAR).join(UTC).join("2").join("816");
        fs::create_dir_all(&obs).unwrap();
        fs::write(
            obs.join("obs.header"),
            "PROPOSAL_ID SCI-20180516-MB-05\nFREQ 815.734\n",
        )
        .unwrap();
        for i in 0..4 {
            touch(obs.join(format!("{i:04}.ar")));
        }
        let ephemeris = tmp.path().join(format!("{PULSAR}.par"));
        let template = tmp.path().join(format!("{PULSAR}.std"));
        touch(&ephemeris);
        touch(&template);
        Self {
            tmp,
            ephemeris,
            template,
        }
    }

    fn settings(&self, toml: &str, overrides: SettingsOverrides) -> Arc<Settings> {
        let mut config = MeerpipeConfig::from_toml("[engine]\nretry_delay_ms = 10\n").unwrap();
        config.merge(MeerpipeConfig::from_toml(toml).unwrap());
        let root = self.tmp.path();
        let overrides = SettingsOverrides {
            input_dir: Some(root.join("input")),
            output_dir: Some(root.join("out")),
            work_dir: Some(root.join("work")),
            ephemerides_dir: Some(root.join("ephemerides")),
            templates_dir: Some(root.join("templates")),
            ..overrides
        };
        Arc::new(Settings::from_config(&config, overrides).unwrap())
    }

    fn manifest(&self, rows: &[String]) -> PathBuf {
        let path = self.tmp.path().join("manifest.csv");
        fs::write(&path, rows.join("\n")).unwrap();
        path
    }

    fn row(&self) -> String {
        format!(
            "{PULSAR},{UTC},P001,UHF,64,{},{}",
            self.ephemeris.display(),
            self.template.display()
        )
    }

    fn output(&self) -> PathBuf {
        self.tmp.path().join("out").join(PULSAR).join(UTC)
    }
}

async fn pipeline(settings: Arc<Settings>, tools: Arc<FakeTools>) -> Pipeline {
    let index = Arc::new(ObservationIndex::build(&settings.input_dir).unwrap());
    Pipeline::new(settings, index, tools).await.unwrap()
}

#[tokio::test]
async fn test_manifest_job_runs_every_stage() {
    let layout = Layout::new();
    let settings = layout.settings("", SettingsOverrides::default());
    let tools = Arc::new(FakeTools::default());
    let pipeline = pipeline(settings.clone(), tools.clone()).await;

    let index = Arc::new(ObservationIndex::build(&settings.input_dir).unwrap());
    let selection = Selector::new(settings.clone(), index)
        .select_from_manifest(&layout.manifest(&[layout.row()]))
        .unwrap();
    let jobs = Resolver::new(settings.clone()).resolve_all(selection.candidates);
    assert_eq!(jobs[0].project_code, "P001");
    assert_eq!(jobs[0].ephemeris, layout.ephemeris);

    let summaries = pipeline.run_all(jobs).await;
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.status, JobStatus::Completed, "{:?}", summary.error);

    let ran: Vec<StageKind> = summary.stages.iter().map(|r| r.stage).collect();
    assert_eq!(
        ran,
        vec![
            StageKind::Combine,
            StageKind::Clean,
            StageKind::FluxCalibrate,
            StageKind::PlotImages,
            StageKind::Decimate,
            StageKind::GenerateToas,
        ]
    );
    assert!(summary.stages.iter().all(|r| r.attempts == 1));
    assert_eq!(tools.count("pac"), 0);

    // Edge sub-integrations dropped: two of four archives combined.
    let combined = layout
        .output()
        .join("calibrated")
        .join(format!("{PULSAR}_{UTC}.ar"));
    assert!(combined.is_file());

    let images = fs::read_dir(layout.output().join("images")).unwrap().count();
    assert_eq!(images, 10);
    let decimated = fs::read_dir(layout.output().join("decimated")).unwrap().count();
    assert_eq!(decimated, 6);

    let Some(StageArtifact::Timing { toas, residuals }) = summary
        .stage(StageKind::GenerateToas)
        .and_then(|r| r.artifact.clone())
    else {
        panic!("toas did not publish");
    };
    assert_eq!(toas.len(), 6);
    assert!(residuals.is_empty());
    assert!(toas.iter().all(|t| t.starts_with(layout.output().join("timing"))));
    assert_eq!(fs::read_to_string(&toas[0]).unwrap(), "FORMAT 1\n");

    let written: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(layout.output().join("summary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(written["status"], "completed");
    assert_eq!(written["stages"].as_array().unwrap().len(), 6);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fluxcal_branch_calibrates_first() {
    let layout = Layout::new();
    let settings = layout.settings(
        "",
        SettingsOverrides {
            fluxcal: Some(true),
            ..Default::default()
        },
    );
    let tools = Arc::new(FakeTools::default());
    let pipeline = pipeline(settings.clone(), tools.clone()).await;

    let jobs = Resolver::new(settings.clone()).resolve_all(
        Selector::new(
            settings.clone(),
            Arc::new(ObservationIndex::build(&settings.input_dir).unwrap()),
        )
        .select_from_manifest(&layout.manifest(&[layout.row()]))
        .unwrap()
        .candidates,
    );
    let summary = pipeline.run_all(jobs).await.remove(0);
    assert!(summary.is_success(), "{:?}", summary.error);
    assert_eq!(summary.stages[0].stage, StageKind::Calibrate);
    assert_eq!(tools.count("pac"), 1);
    assert!(summary.stage(StageKind::Combine).is_none());
    assert_eq!(summary.stages.len(), 6);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_attempt_retries_with_larger_ceiling() {
    let layout = Layout::new();
    let settings = layout.settings("", SettingsOverrides::default());
    let tools = Arc::new(FakeTools::failing("clean_archive.py", 1));
    let pipeline = pipeline(settings.clone(), tools.clone()).await;

    let jobs = Resolver::new(settings.clone()).resolve_all(
        Selector::new(
            settings.clone(),
            Arc::new(ObservationIndex::build(&settings.input_dir).unwrap()),
        )
        .select_from_manifest(&layout.manifest(&[layout.row()]))
        .unwrap()
        .candidates,
    );
    let summary = pipeline.run_all(jobs).await.remove(0);
    assert!(summary.is_success(), "{:?}", summary.error);

    let clean = summary.stage(StageKind::Clean).unwrap();
    assert_eq!(clean.attempts, 2);
    // Clean factor 2.0 over 64 s, second attempt.
    assert_eq!(clean.resources.unwrap().time_limit_secs, 256.0);
    assert!(clean.error.is_none());

    let timeouts = tools.timeouts("clean_archive.py");
    assert_eq!(timeouts.len(), 2);
    assert!(timeouts[1] > timeouts[0]);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_template_fails_only_that_job() {
    let layout = Layout::new();
    let settings = layout.settings("", SettingsOverrides::default());
    let tools = Arc::new(FakeTools::default());
    let pipeline = pipeline(settings.clone(), tools.clone()).await;

    let broken = format!(
        "{PULSAR},{UTC},P001,UHF,64,{},{}",
        layout.ephemeris.display(),
        layout.tmp.path().join("missing.std").display()
    );
    let unknown = "J1909-3744,2021-02-01-00:00:00,P001,L-band,64".to_string();
    let jobs = Resolver::new(settings.clone()).resolve_all(
        Selector::new(
            settings.clone(),
            Arc::new(ObservationIndex::build(&settings.input_dir).unwrap()),
        )
        .select_from_manifest(&layout.manifest(&[broken, unknown]))
        .unwrap()
        .candidates,
    );

    let summaries = pipeline.run_all(jobs).await;
    assert_eq!(summaries.len(), 2);

    let first = &summaries[0];
    assert_eq!(first.status, JobStatus::Failed);
    let clean = first.stage(StageKind::Clean).unwrap();
    assert_eq!(clean.attempts, 1);
    assert!(first.error.as_deref().unwrap().starts_with("clean:"));
    assert!(first.stage(StageKind::Combine).unwrap().artifact.is_some());
    assert!(first.stage(StageKind::GenerateToas).is_none());
    assert_eq!(tools.count("clean_archive.py"), 0);

    // No observation on disk: lookup failure, no stages.
    let second = &summaries[1];
    assert_eq!(second.status, JobStatus::Failed);
    assert!(second.stages.is_empty());
    assert!(second.error.as_deref().unwrap().contains("obs.header"));

    pipeline.shutdown().await.unwrap();
}

struct StubCatalog(Vec<CatalogObservation>);

#[async_trait]
impl ObservationCatalog for StubCatalog {
    async fn list_observations(
        &self,
        _filter: &ObservationFilter,
    ) -> meerpipe_pipeline::Result<ObservationListing> {
        Ok(ObservationListing {
            observations: self.0.clone(),
            malformed: Vec::new(),
        })
    }
}

#[tokio::test]
async fn test_catalog_selection_joins_header() {
    let layout = Layout::new();
    let settings = layout.settings(
        "",
        SettingsOverrides {
            ephemeris: Some(layout.ephemeris.display().to_string()),
            template: Some(layout.template.display().to_string()),
            ..Default::default()
        },
    );
    let tools = Arc::new(FakeTools::default());
    let pipeline = pipeline(settings.clone(), tools).await;

    let catalog = StubCatalog(vec![
        CatalogObservation {
            pulsar: PULSAR.into(),
            utc: ObsUtc::parse(UTC).unwrap(),
            project_code: None,
            project_short: None,
        },
        CatalogObservation {
            pulsar: "J1909-3744".into(),
            utc: ObsUtc::parse("2021-02-01-00:00:00").unwrap(),
            project_code: None,
            project_short: Some("PTA".into()),
        },
    ]);
    let selector = Selector::new(
        settings.clone(),
        Arc::new(ObservationIndex::build(&settings.input_dir).unwrap()),
    );
    let selection = selector
        .select_from_catalog(&catalog, &ObservationFilter::default())
        .await
        .unwrap();
    assert_eq!(selection.candidates.len(), 1);
    assert_eq!(selection.rejected.len(), 1);
    assert!(matches!(selection.rejected[0].error, PipelineError::Lookup(_)));

    let candidate = &selection.candidates[0];
    assert_eq!(candidate.project_code, "PTA");
    assert_eq!(candidate.band.as_str(), "UHF");
    assert_eq!(candidate.duration_secs, 32.0);

    let summary = pipeline
        .run_all(Resolver::new(settings.clone()).resolve_all(selection.candidates))
        .await
        .remove(0);
    assert!(summary.is_success(), "{:?}", summary.error);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_catalog_runs_nothing() {
    let layout = Layout::new();
    let settings = layout.settings("", SettingsOverrides::default());
    let tools = Arc::new(FakeTools::default());
    let pipeline = pipeline(settings.clone(), tools.clone()).await;

    let selection = Selector::new(
        settings.clone(),
        Arc::new(ObservationIndex::build(&settings.input_dir).unwrap()),
    )
    .select_from_catalog(&StubCatalog(Vec::new()), &ObservationFilter::default())
    .await
    .unwrap();
    assert!(selection.candidates.is_empty());

    let summaries = pipeline
        .run_all(Resolver::new(settings).resolve_all(selection.candidates))
        .await;
    assert!(summaries.is_empty());
    assert!(tools.calls.lock().is_empty());

    pipeline.shutdown().await.unwrap();
}
