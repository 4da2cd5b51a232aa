//! The immutable run settings.
//!
//! Built once from the merged config layers plus command-line overrides,
//! then shared read-only by the selector, resolver, stager and executor.

use std::collections::HashMap;
use std::path::PathBuf;

use meerpipe_config::{
    DecimationConfig, EngineConfig, MeerpipeConfig, ResourceFactors, ToolsConfig,
};
use meerpipe_types::{JobKey, StageKind};

use crate::error::Result;
use crate::projects::ProjectCodes;

/// Values given on the command line. `None` leaves the config value in place.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub ephemerides_dir: Option<PathBuf>,
    pub templates_dir: Option<PathBuf>,
    pub overwrite: Option<bool>,
    pub use_edge_subints: Option<bool>,
    pub fluxcal: Option<bool>,
    /// Ephemeris applied to every job without its own.
    pub ephemeris: Option<String>,
    /// Template applied to every job without its own.
    pub template: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
    pub ephemerides_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub overwrite: bool,
    pub subint_seconds: f64,
    pub use_edge_subints: bool,
    pub fluxcal: bool,
    pub decimation: DecimationConfig,
    pub residuals: bool,
    pub tools: ToolsConfig,
    pub engine: EngineConfig,
    pub ephemeris_override: Option<String>,
    pub template_override: Option<String>,
    resources: HashMap<StageKind, ResourceFactors>,
    projects: ProjectCodes,
}

impl Settings {
    /// Validate the config and apply overrides on top of it.
    pub fn from_config(config: &MeerpipeConfig, overrides: SettingsOverrides) -> Result<Self> {
        config.validate()?;

        let paths = config.paths();
        let observation = config.observation();
        let resources = StageKind::ALL
            .into_iter()
            .map(|stage| (stage, config.resource_factors(stage.id())))
            .collect();

        Ok(Self {
            input_dir: overrides.input_dir.unwrap_or(paths.input_dir),
            output_dir: overrides.output_dir.unwrap_or(paths.output_dir),
            work_dir: overrides.work_dir.unwrap_or(paths.work_dir),
            ephemerides_dir: overrides.ephemerides_dir.unwrap_or(paths.ephemerides_dir),
            templates_dir: overrides.templates_dir.unwrap_or(paths.templates_dir),
            overwrite: overrides.overwrite.unwrap_or(paths.overwrite),
            subint_seconds: observation.subint_seconds,
            use_edge_subints: overrides
                .use_edge_subints
                .unwrap_or(observation.use_edge_subints),
            fluxcal: overrides.fluxcal.unwrap_or(observation.fluxcal),
            decimation: config.decimation(),
            residuals: config.timing().residuals,
            tools: config.tools(),
            engine: config.engine(),
            ephemeris_override: overrides.ephemeris,
            template_override: overrides.template,
            resources,
            projects: ProjectCodes::new(&config.projects),
        })
    }

    pub fn resource_factors(&self, stage: StageKind) -> ResourceFactors {
        self.resources
            .get(&stage)
            .copied()
            .unwrap_or_else(|| ResourceFactors::default_for(stage.id()))
    }

    pub fn projects(&self) -> &ProjectCodes {
        &self.projects
    }

    /// Engine database URL; relative database paths live under the work dir.
    pub fn database_url(&self) -> String {
        let path = match &self.engine.database {
            Some(db) if db.is_absolute() => db.clone(),
            Some(db) => self.work_dir.join(db),
            None => self.work_dir.join("meerpipe.db"),
        };
        format!("sqlite://{}", path.display())
    }

    /// `{output}/{pulsar}/{utc}`
    pub fn job_output_dir(&self, key: &JobKey) -> PathBuf {
        self.output_dir
            .join(&key.pulsar)
            .join(key.utc.to_string())
    }

    /// `{work}/{pulsar}/{utc}/{stage}/attempt-{n}`
    pub fn attempt_dir(&self, key: &JobKey, stage: StageKind, attempt: u32) -> PathBuf {
        self.work_dir
            .join(&key.pulsar)
            .join(key.utc.to_string())
            .join(stage.id())
            .join(format!("attempt-{attempt}"))
    }
}
