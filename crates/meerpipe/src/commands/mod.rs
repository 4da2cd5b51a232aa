//! CLI command handlers.

pub mod list;
pub mod plan;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use meerpipe_catalog::{CatalogClient, ObservationFilter};
use meerpipe_config::{MeerpipeConfig, resolve_catalog_token};
use meerpipe_pipeline::{ObservationIndex, Rejection, Resolver, Selection, Selector, Settings};
use meerpipe_types::{ObsUtc, ObservationJob};
use serde::Serialize;
use tracing::debug;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Where observations come from.
#[derive(Debug, Clone, Default)]
pub struct SelectArgs {
    pub list_in: Option<PathBuf>,
    pub start: Option<ObsUtc>,
    pub end: Option<ObsUtc>,
    pub pulsar: Option<String>,
    pub project: Option<String>,
}

impl SelectArgs {
    fn filter(&self) -> ObservationFilter {
        ObservationFilter {
            start: self.start,
            end: self.end,
            pulsar: self.pulsar.clone(),
            project: self.project.clone(),
        }
    }
}

/// An observation or input row that never became a job.
#[derive(Debug, Serialize)]
pub struct Rejected {
    pub observation: String,
    pub error: String,
}

impl From<Rejection> for Rejected {
    fn from(rejection: Rejection) -> Self {
        Self {
            observation: rejection.observation,
            error: rejection.error.to_string(),
        }
    }
}

impl Rejected {
    fn print(&self) {
        println!(
            "{} {} rejected: {}",
            console::style("✗").red(),
            self.observation,
            self.error
        );
    }
}

/// Resolved jobs plus the observation index they were checked against.
pub struct Selected {
    pub jobs: Vec<ObservationJob>,
    pub rejected: Vec<Rejected>,
    pub index: Arc<ObservationIndex>,
}

/// Select and resolve the jobs for this run.
pub async fn select(
    args: &SelectArgs,
    config: &MeerpipeConfig,
    settings: &Arc<Settings>,
) -> Result<Selected> {
    let index = Arc::new(
        ObservationIndex::build(&settings.input_dir).context("failed to index input directory")?,
    );
    debug!(observations = index.len(), "input indexed");

    let selector = Selector::new(settings.clone(), index.clone());
    let selection: Selection = match &args.list_in {
        Some(path) => selector
            .select_from_manifest(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?,
        None => {
            let client = catalog_client(config)?;
            selector
                .select_from_catalog(&client, &args.filter())
                .await
                .context("catalog query failed")?
        }
    };

    let jobs = Resolver::new(settings.clone()).resolve_all(selection.candidates);
    let rejected = selection
        .rejected
        .into_iter()
        .map(Rejected::from)
        .collect();
    Ok(Selected {
        jobs,
        rejected,
        index,
    })
}

fn catalog_client(config: &MeerpipeConfig) -> Result<CatalogClient> {
    let catalog = config.catalog();
    let mut builder = CatalogClient::builder()
        .base_url(catalog.url.clone())
        .timeout(Duration::from_secs(catalog.timeout_secs))
        .user_agent(concat!("meerpipe/", env!("CARGO_PKG_VERSION")));

    if let Some(token) = resolve_catalog_token(catalog.token.as_deref()) {
        debug!(source = %token.source, "catalog token resolved");
        builder = builder.auth_token(token.value);
    }
    builder.build().context("invalid catalog configuration")
}
