//! Ephemeris and template path resolution.
//!
//! An explicit override is used verbatim. Anything else falls back to the
//! per-project default layout:
//!
//! ```text
//! {ephemerides_dir}/{project}/{pulsar}.par
//! {templates_dir}/{project}/{band}/{pulsar}.std
//! ```
//!
//! Nothing here checks that the files exist.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use meerpipe_types::{Band, ObservationJob};

use crate::selector::Candidate;
use crate::settings::Settings;

/// Whether a user-supplied value means "no value".
pub fn is_null_sentinel(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("none") || value.eq_ignore_ascii_case("null")
}

/// The first value that is not a null sentinel.
fn explicit<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> Option<PathBuf> {
    values
        .into_iter()
        .flatten()
        .find(|v| !is_null_sentinel(v))
        .map(|v| PathBuf::from(v.trim()))
}

pub fn default_ephemeris(ephemerides_dir: &Path, project: &str, pulsar: &str) -> PathBuf {
    ephemerides_dir.join(project).join(format!("{pulsar}.par"))
}

pub fn default_template(templates_dir: &Path, project: &str, band: &Band, pulsar: &str) -> PathBuf {
    templates_dir
        .join(project)
        .join(band.as_str())
        .join(format!("{pulsar}.std"))
}

/// Turns candidates into jobs.
#[derive(Debug, Clone)]
pub struct Resolver {
    settings: Arc<Settings>,
}

impl Resolver {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Precedence: the candidate's own value, then the run-wide override,
    /// then the default path.
    pub fn resolve(&self, candidate: Candidate) -> ObservationJob {
        let settings = &self.settings;

        let ephemeris = explicit([
            candidate.ephemeris.as_deref(),
            settings.ephemeris_override.as_deref(),
        ])
        .unwrap_or_else(|| {
            default_ephemeris(
                &settings.ephemerides_dir,
                &candidate.project_code,
                &candidate.pulsar,
            )
        });

        let template = explicit([
            candidate.template.as_deref(),
            settings.template_override.as_deref(),
        ])
        .unwrap_or_else(|| {
            default_template(
                &settings.templates_dir,
                &candidate.project_code,
                &candidate.band,
                &candidate.pulsar,
            )
        });

        ObservationJob {
            pulsar: candidate.pulsar,
            utc: candidate.utc,
            project_code: candidate.project_code,
            band: candidate.band,
            duration_secs: candidate.duration_secs,
            ephemeris,
            template,
        }
    }

    pub fn resolve_all(&self, candidates: Vec<Candidate>) -> Vec<ObservationJob> {
        candidates.into_iter().map(|c| self.resolve(c)).collect()
    }
}
