//! Index of observations on disk.
//!
//! Observations live at `{input_dir}/{pulsar}/{utc}/{beam}/{freq}/`, holding
//! an `obs.header` and the `*.ar` sub-integration files. The tree is globbed
//! once; everything downstream looks observations up by `(pulsar, utc)`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use meerpipe_types::{JobKey, ObsUtc, StageArtifact};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

const HEADER_FILE: &str = "obs.header";

/// Files discovered for one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationFiles {
    pub header: PathBuf,
    /// Sub-integration archives in name order.
    pub archives: Vec<PathBuf>,
}

impl ObservationFiles {
    pub fn to_artifact(&self) -> StageArtifact {
        StageArtifact::Raw {
            header: self.header.clone(),
            archives: self.archives.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObservationIndex {
    entries: BTreeMap<JobKey, ObservationFiles>,
}

impl ObservationIndex {
    /// Glob the input tree. A missing input directory gives an empty index.
    pub fn build(input_dir: &Path) -> Result<Self> {
        let pattern = input_dir.join("*/*/*/*").join(HEADER_FILE);
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern)
            .map_err(|e| PipelineError::Lookup(format!("bad input pattern {pattern}: {e}")))?;

        let mut headers: Vec<PathBuf> = paths.filter_map(|entry| entry.ok()).collect();
        headers.sort();

        let mut entries = BTreeMap::new();
        for header in headers {
            let Some(key) = key_for_header(&header) else {
                debug!(path = %header.display(), "skipping header outside pulsar/utc layout");
                continue;
            };
            if entries.contains_key(&key) {
                warn!(observation = %key, path = %header.display(), "duplicate observation directory ignored");
                continue;
            }
            let dir = header.parent().unwrap_or(input_dir);
            let archives = list_archives(dir)?;
            entries.insert(key, ObservationFiles { header, archives });
        }

        debug!(count = entries.len(), input = %input_dir.display(), "observation index built");
        Ok(Self { entries })
    }

    pub fn get(&self, key: &JobKey) -> Option<&ObservationFiles> {
        self.entries.get(key)
    }

    /// Files for an observation, or a lookup error naming it.
    pub fn require(&self, key: &JobKey) -> Result<&ObservationFiles> {
        self.get(key)
            .ok_or_else(|| PipelineError::Lookup(format!("no {HEADER_FILE} found for {key}")))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `.../{pulsar}/{utc}/{beam}/{freq}/obs.header` → `(pulsar, utc)`.
fn key_for_header(header: &Path) -> Option<JobKey> {
    let freq_dir = header.parent()?;
    let beam_dir = freq_dir.parent()?;
    let utc_dir = beam_dir.parent()?;
    let pulsar_dir = utc_dir.parent()?;

    let utc = ObsUtc::parse(&utc_dir.file_name()?.to_string_lossy()).ok()?;
    let pulsar = pulsar_dir.file_name()?.to_string_lossy().into_owned();
    Some(JobKey::new(pulsar, utc))
}

fn list_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join("*.ar");
    let pattern = pattern.to_string_lossy();
    let mut archives: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| PipelineError::Lookup(format!("bad archive pattern {pattern}: {e}")))?
        .filter_map(|entry| entry.ok())
        .collect();
    archives.sort();
    Ok(archives)
}
