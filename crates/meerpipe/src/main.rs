//! MeerPipe - pulsar timing pipeline for MeerKAT observations
//!
//! Main entry point for the meerpipe CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use meerpipe_pipeline::{Settings, SettingsOverrides};
use meerpipe_types::ObsUtc;
use tracing::{debug, warn};

mod commands;

use commands::{list, plan, run};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// MeerPipe - pulsar timing pipeline for MeerKAT observations
///
/// Observations come from a manifest (--list_in) or from a catalog query
/// built from the filter flags.
#[derive(Parser, Debug)]
#[command(name = "meerpipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Manifest CSV of observations to process (skips the catalog)
    #[arg(long = "list_in", value_name = "FILE")]
    pub list_in: Option<PathBuf>,

    /// Earliest observation UTC (YYYY-MM-DD-HH:MM:SS)
    #[arg(long = "utcs", value_name = "UTC")]
    pub utcs: Option<ObsUtc>,

    /// Latest observation UTC (YYYY-MM-DD-HH:MM:SS)
    #[arg(long = "utce", value_name = "UTC")]
    pub utce: Option<ObsUtc>,

    /// Project (proposal) ID to select
    #[arg(long = "obs_pid", value_name = "PID")]
    pub obs_pid: Option<String>,

    /// Pulsar to select
    #[arg(long = "pulsar", value_name = "JNAME")]
    pub pulsar: Option<String>,

    /// Write the selected jobs to processing_jobs.csv and exit
    #[arg(long = "list_out")]
    pub list_out: bool,

    /// Keep the first and last sub-integrations when combining
    #[arg(long = "use_edge_subints")]
    pub use_edge_subints: bool,

    /// Calibrate with pac after combining
    #[arg(long = "fluxcal")]
    pub fluxcal: bool,

    /// Root of the default ephemeris tree
    #[arg(long = "ephemerides_dir", value_name = "DIR")]
    pub ephemerides_dir: Option<PathBuf>,

    /// Root of the default template tree
    #[arg(long = "templates_dir", value_name = "DIR")]
    pub templates_dir: Option<PathBuf>,

    /// Ephemeris for every job without its own
    #[arg(long = "ephemeris", value_name = "FILE")]
    pub ephemeris: Option<String>,

    /// Template for every job without its own
    #[arg(long = "template", value_name = "FILE")]
    pub template: Option<String>,

    /// Root of the output tree
    #[arg(long = "out_dir", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Root of the observation input tree
    #[arg(long = "input_dir", value_name = "DIR")]
    pub input_dir: Option<PathBuf>,

    /// Scratch directory for stage attempts
    #[arg(long = "work_dir", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Extra config file, applied after the discovered ones
    #[arg(long, value_name = "FILE", env = "MEERPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Remove a job's previous outputs before it runs
    #[arg(long)]
    pub overwrite: bool,

    /// Print the stage plan for each job without running anything
    #[arg(long = "dry_run")]
    pub dry_run: bool,

    /// Output as JSON (for scripting)
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        let flag = |set: bool| set.then_some(true);
        SettingsOverrides {
            input_dir: self.input_dir.clone(),
            output_dir: self.out_dir.clone(),
            work_dir: self.work_dir.clone(),
            ephemerides_dir: self.ephemerides_dir.clone(),
            templates_dir: self.templates_dir.clone(),
            overwrite: flag(self.overwrite),
            use_edge_subints: flag(self.use_edge_subints),
            fluxcal: flag(self.fluxcal),
            ephemeris: self.ephemeris.clone(),
            template: self.template.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "meerpipe=debug,meerpipe_pipeline=debug,meerpipe_catalog=debug,meerpipe_config=debug,info"
    } else {
        "meerpipe=info,meerpipe_pipeline=info,meerpipe_catalog=info,warn"
    };

    let log_dir = meerpipe_config::config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "meerpipe.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "meerpipe=trace,meerpipe_pipeline=trace,meerpipe_catalog=trace,meerpipe_config=trace,info",
                )),
        )
        .init();

    let loaded = meerpipe_config::load_config_with_options(None, None, cli.config.as_deref())
        .context("failed to load configuration")?;
    for warning in &loaded.warnings {
        warn!("{warning}");
    }
    for path in loaded.loaded_from() {
        debug!(path = %path.display(), "config layer loaded");
    }

    let settings = Arc::new(
        Settings::from_config(&loaded.config, cli.overrides()).context("invalid configuration")?,
    );

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
    };
    let filters = commands::SelectArgs {
        list_in: cli.list_in.clone(),
        start: cli.utcs,
        end: cli.utce,
        pulsar: cli.pulsar.clone(),
        project: cli.obs_pid.clone(),
    };
    let selected = commands::select(&filters, &loaded.config, &settings).await?;

    if cli.list_out {
        list::run(&selected, &ctx)
    } else if cli.dry_run {
        plan::run(&selected, &settings, &ctx)
    } else {
        run::run(selected, settings, &ctx).await
    }
}
