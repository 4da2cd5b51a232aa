//! Observation selection.
//!
//! Produces the ordered candidates to process, either from a manifest file
//! or from a catalog query joined against the observation index.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use meerpipe_catalog::{CatalogClient, CatalogObservation, ObservationFilter, ObservationListing};
use meerpipe_types::{Band, JobKey, ObsUtc};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::header::ObsHeader;
use crate::index::ObservationIndex;
use crate::manifest::read_manifest;
use crate::settings::Settings;

/// An observation chosen for processing, ephemeris and template still pending.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub pulsar: String,
    pub utc: ObsUtc,
    pub project_code: String,
    pub band: Band,
    pub duration_secs: f64,
    /// Per-observation override, used verbatim when not a null sentinel.
    pub ephemeris: Option<String>,
    pub template: Option<String>,
}

impl Candidate {
    pub fn key(&self) -> JobKey {
        JobKey::new(self.pulsar.clone(), self.utc)
    }
}

/// An observation, manifest row or catalog record that never became a candidate.
#[derive(Debug)]
pub struct Rejection {
    /// `pulsar/utc` when known, otherwise where the bad input came from.
    pub observation: String,
    pub error: PipelineError,
}

/// Candidates plus the observations that could not be turned into one.
///
/// A rejected observation never stops the others from being selected.
#[derive(Debug, Default)]
pub struct Selection {
    pub candidates: Vec<Candidate>,
    pub rejected: Vec<Rejection>,
}

impl Selection {
    fn reject(&mut self, observation: impl Into<String>, error: PipelineError) {
        let observation = observation.into();
        warn!(%observation, %error, "observation rejected");
        self.rejected.push(Rejection { observation, error });
    }
}

/// Approximate integration length from the number of sub-integration files.
pub fn estimate_duration(archive_count: usize, subint_seconds: f64) -> f64 {
    archive_count as f64 * subint_seconds
}

/// Source of catalog observations.
#[async_trait]
pub trait ObservationCatalog: Send + Sync {
    async fn list_observations(&self, filter: &ObservationFilter) -> Result<ObservationListing>;
}

#[async_trait]
impl ObservationCatalog for CatalogClient {
    async fn list_observations(&self, filter: &ObservationFilter) -> Result<ObservationListing> {
        Ok(self.observations().list(filter).await?)
    }
}

pub struct Selector {
    settings: Arc<Settings>,
    index: Arc<ObservationIndex>,
}

impl Selector {
    pub fn new(settings: Arc<Settings>, index: Arc<ObservationIndex>) -> Self {
        Self { settings, index }
    }

    /// Candidates from a manifest, in file order. The catalog is not consulted.
    ///
    /// Rows that cannot be parsed are rejected one by one; only an
    /// unreadable file fails the selection.
    pub fn select_from_manifest(&self, path: &Path) -> Result<Selection> {
        let manifest = read_manifest(path)?;
        let candidates: Vec<Candidate> = manifest
            .rows
            .into_iter()
            .map(|row| Candidate {
                pulsar: row.pulsar,
                utc: row.utc,
                project_code: row.project_id,
                band: row.band,
                duration_secs: row.duration_secs,
                ephemeris: row.ephemeris,
                template: row.template,
            })
            .collect();

        let mut selection = Selection {
            candidates,
            rejected: Vec::new(),
        };
        for invalid in manifest.invalid {
            selection.reject(format!("{} line {}", path.display(), invalid.line), invalid.error);
        }

        info!(
            selected = selection.candidates.len(),
            rejected = selection.rejected.len(),
            manifest = %path.display(),
            "selected from manifest"
        );
        Ok(selection)
    }

    /// Candidates from a catalog query, in catalog order.
    ///
    /// Each record is joined against the on-disk header for its project
    /// code and band. Records without a header are rejected with a lookup
    /// error and malformed records with a selection error; only a failed
    /// query fails the whole selection.
    pub async fn select_from_catalog(
        &self,
        catalog: &dyn ObservationCatalog,
        filter: &ObservationFilter,
    ) -> Result<Selection> {
        if filter.is_unconstrained() {
            warn!("catalog query has no filters");
        }
        let listing = catalog.list_observations(filter).await?;

        let mut selection = Selection::default();
        for (i, malformed) in listing.malformed.into_iter().enumerate() {
            selection.reject(
                format!("catalog record {}", i + 1),
                PipelineError::Selection(malformed.to_string()),
            );
        }
        let mut seen = HashSet::new();
        for record in listing.observations {
            let key = JobKey::new(record.pulsar.clone(), record.utc);
            if !seen.insert(key.clone()) {
                debug!(observation = %key, "duplicate catalog record skipped");
                continue;
            }
            match self.candidate_for(&record) {
                Ok(candidate) => selection.candidates.push(candidate),
                Err(e) => selection.reject(key.to_string(), e),
            }
        }

        info!(
            selected = selection.candidates.len(),
            rejected = selection.rejected.len(),
            "selected from catalog"
        );
        Ok(selection)
    }

    fn candidate_for(&self, record: &CatalogObservation) -> Result<Candidate> {
        let key = JobKey::new(record.pulsar.clone(), record.utc);
        let files = self.index.require(&key)?;
        if files.archives.is_empty() {
            return Err(PipelineError::Lookup(format!("no archives found for {key}")));
        }
        let header = ObsHeader::load(&files.header)?;

        let projects = self.settings.projects();
        let project_code = header
            .proposal_id()
            .or(record.project_code.as_deref())
            .map(|pid| projects.short_code(pid))
            .or_else(|| record.project_short.clone())
            .ok_or_else(|| PipelineError::Lookup(format!("no proposal id for {key}")))?;

        let band = header.band().ok_or_else(|| {
            PipelineError::Lookup(format!("{} has no usable FREQ", files.header.display()))
        })?;

        Ok(Candidate {
            pulsar: record.pulsar.clone(),
            utc: record.utc,
            project_code,
            band,
            duration_secs: estimate_duration(files.archives.len(), self.settings.subint_seconds),
            ephemeris: None,
            template: None,
        })
    }
}
