//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [paths]                  # input/output/work roots, ephemerides, templates
//! [catalog]                # observation catalog endpoint
//! [engine]                 # workflow engine sizing and retries
//! [observation]            # sub-integration length, edge handling, flux-cal branch
//! [decimation]             # time/frequency scrunch products
//! [timing]                 # residual generation
//! [tools]                  # external binary names
//! [resources.clean]        # per-stage resource factors
//! [projects]               # proposal ID → short code
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeerpipeConfig {
    pub paths: Option<PathsConfig>,
    pub catalog: Option<CatalogConfig>,
    pub engine: Option<EngineConfig>,
    pub observation: Option<ObservationConfig>,
    pub decimation: Option<DecimationConfig>,
    pub timing: Option<TimingConfig>,
    pub tools: Option<ToolsConfig>,

    /// Per-stage resource factors keyed by stage id.
    #[serde(default)]
    pub resources: HashMap<String, ResourceFactors>,

    /// Extra proposal ID → short code mappings.
    #[serde(default)]
    pub projects: HashMap<String, String>,
}

impl MeerpipeConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole; `resources` and `projects` merge per key.
    pub fn merge(&mut self, other: MeerpipeConfig) {
        if other.paths.is_some() {
            self.paths = other.paths;
        }

        if other.catalog.is_some() {
            self.catalog = other.catalog;
        }

        if other.engine.is_some() {
            self.engine = other.engine;
        }

        if other.observation.is_some() {
            self.observation = other.observation;
        }

        if other.decimation.is_some() {
            self.decimation = other.decimation;
        }

        if other.timing.is_some() {
            self.timing = other.timing;
        }

        if other.tools.is_some() {
            self.tools = other.tools;
        }

        for (stage, factors) in other.resources {
            self.resources.insert(stage, factors);
        }

        for (pid, code) in other.projects {
            self.projects.insert(pid, code);
        }
    }

    pub fn paths(&self) -> PathsConfig {
        self.paths.clone().unwrap_or_default()
    }

    pub fn catalog(&self) -> CatalogConfig {
        self.catalog.clone().unwrap_or_default()
    }

    pub fn engine(&self) -> EngineConfig {
        self.engine.clone().unwrap_or_default()
    }

    pub fn observation(&self) -> ObservationConfig {
        self.observation.clone().unwrap_or_default()
    }

    pub fn decimation(&self) -> DecimationConfig {
        self.decimation.clone().unwrap_or_default()
    }

    pub fn timing(&self) -> TimingConfig {
        self.timing.clone().unwrap_or_default()
    }

    pub fn tools(&self) -> ToolsConfig {
        self.tools.clone().unwrap_or_default()
    }

    /// Resource factors for a stage: the configured entry, else the built-in default.
    pub fn resource_factors(&self, stage_id: &str) -> ResourceFactors {
        self.resources
            .get(stage_id)
            .copied()
            .unwrap_or_else(|| ResourceFactors::default_for(stage_id))
    }

    /// Check values that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<()> {
        let engine = self.engine();
        if engine.max_concurrent_jobs == 0 {
            return Err(invalid("engine.max_concurrent_jobs", "must be at least 1"));
        }
        if engine.max_attempts == 0 {
            return Err(invalid("engine.max_attempts", "must be at least 1"));
        }

        if !is_positive(self.observation().subint_seconds) {
            return Err(invalid("observation.subint_seconds", "must be a positive number"));
        }

        let decimation = self.decimation();
        if decimation.time_subs.is_empty() || decimation.freq_subs.is_empty() {
            return Err(invalid(
                "decimation",
                "time_subs and freq_subs must not be empty",
            ));
        }
        if decimation.time_subs.contains(&0) || decimation.freq_subs.contains(&0) {
            return Err(invalid("decimation", "sub-interval counts must be positive"));
        }
        if has_duplicates(&decimation.time_subs) {
            return Err(invalid("decimation.time_subs", "must not repeat a count"));
        }
        if has_duplicates(&decimation.freq_subs) {
            return Err(invalid("decimation.freq_subs", "must not repeat a count"));
        }
        if !decimation.pscrunch_rotation.is_finite() {
            return Err(invalid("decimation.pscrunch_rotation", "must be a finite number"));
        }

        for (stage, factors) in &self.resources {
            if !is_positive(factors.time_factor) || !is_positive(factors.memory_factor) {
                return Err(invalid(
                    &format!("resources.{stage}"),
                    "factors must be positive numbers",
                ));
            }
        }

        Ok(())
    }
}

/// False for NaN and infinities as well as for zero and negatives.
fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn has_duplicates(counts: &[u32]) -> bool {
    let mut seen = std::collections::HashSet::new();
    counts.iter().any(|c| !seen.insert(c))
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Paths
// ─────────────────────────────────────────────────────────────────────────────

/// Filesystem roots.
///
/// ```toml
/// [paths]
/// input_dir = "/data/timing"
/// output_dir = "/data/timing_processed"
/// work_dir = "/scratch/meerpipe"
/// ephemerides_dir = "/data/meertime_ephemerides"
/// templates_dir = "/data/meertime_templates"
/// overwrite = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of `{pulsar}/{utc}/{beam}/{freq}/` observation directories.
    pub input_dir: PathBuf,
    /// Root of the published output tree.
    pub output_dir: PathBuf,
    /// Root for per-attempt working directories.
    pub work_dir: PathBuf,
    pub ephemerides_dir: PathBuf,
    pub templates_dir: PathBuf,
    /// Remove a job's existing output tree before processing it.
    pub overwrite: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("timing"),
            output_dir: PathBuf::from("timing_processed"),
            work_dir: PathBuf::from("work"),
            ephemerides_dir: PathBuf::from("ephemerides"),
            templates_dir: PathBuf::from("templates"),
            overwrite: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Observation catalog endpoint.
///
/// The token is better supplied through `MEERPIPE_CATALOG_TOKEN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: "https://pulsars.org.au/api".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl CatalogConfig {
    pub fn has_plaintext_token(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Workflow engine configuration.
///
/// ```toml
/// [engine]
/// database = "meerpipe.db"
/// max_concurrent_jobs = 4
/// max_concurrent_tasks = 8
/// max_attempts = 3
/// retry_delay_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database for engine state. Relative paths resolve from the work dir.
    pub database: Option<PathBuf>,
    /// Jobs processed at the same time.
    pub max_concurrent_jobs: usize,
    /// Stage executions the engine runs at the same time across all jobs.
    pub max_concurrent_tasks: usize,
    /// Attempts per stage before the job fails.
    pub max_attempts: u32,
    /// Initial delay between attempts.
    pub retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: None,
            max_concurrent_jobs: 4,
            max_concurrent_tasks: 8,
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observation handling
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Length of one sub-integration file, in seconds.
    pub subint_seconds: f64,
    /// Keep the first and last sub-integration files when combining.
    pub use_edge_subints: bool,
    /// Calibrate with `pac` after combining.
    pub fluxcal: bool,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            subint_seconds: 8.0,
            use_edge_subints: false,
            fluxcal: false,
        }
    }
}

/// Decimation products.
///
/// ```toml
/// [decimation]
/// time_subs = [1]
/// freq_subs = [1, 16, 32]
/// pscrunch_rotation = 0.5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimationConfig {
    pub time_subs: Vec<u32>,
    pub freq_subs: Vec<u32>,
    /// Phase rotation (turns) applied to the pscrunched variant.
    pub pscrunch_rotation: f64,
}

impl Default for DecimationConfig {
    fn default() -> Self {
        Self {
            time_subs: vec![1],
            freq_subs: vec![1, 16, 32],
            pscrunch_rotation: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Run `tempo2` on each `.tim` file and write residuals.
    pub residuals: bool,
}

/// External binaries. Values are program names or absolute paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub psradd: String,
    pub pac: String,
    pub clean: String,
    pub fluxcal: String,
    pub psrplot: String,
    pub pam: String,
    pub vap: String,
    pub pat: String,
    pub tempo2: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            psradd: "psradd".to_string(),
            pac: "pac".to_string(),
            clean: "clean_archive.py".to_string(),
            fluxcal: "fluxcal".to_string(),
            psrplot: "psrplot".to_string(),
            pam: "pam".to_string(),
            vap: "vap".to_string(),
            pat: "pat".to_string(),
            tempo2: "tempo2".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resources
// ─────────────────────────────────────────────────────────────────────────────

/// Multipliers applied to `attempt × estimated_duration`.
///
/// Time is in seconds of wall clock, memory in MB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceFactors {
    pub time_factor: f64,
    pub memory_factor: f64,
}

impl ResourceFactors {
    /// Built-in factors for a stage id.
    pub fn default_for(stage_id: &str) -> Self {
        let (time_factor, memory_factor) = match stage_id {
            "combine" => (0.5, 4.0),
            "calibrate" => (0.75, 4.0),
            "clean" => (2.0, 8.0),
            "fluxcal" => (0.5, 4.0),
            "images" => (0.25, 4.0),
            "decimate" => (0.5, 4.0),
            "toas" => (1.0, 2.0),
            _ => (1.0, 4.0),
        };
        Self {
            time_factor,
            memory_factor,
        }
    }
}
