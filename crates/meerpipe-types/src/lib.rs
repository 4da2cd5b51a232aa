//! Shared types for the meerpipe pulsar timing pipeline.

pub mod artifact;
pub mod error;
pub mod job;
pub mod stage;
pub mod utc;

pub use artifact::{JobStatus, JobSummary, ResourceTags, StageArtifact, StageRecord};
pub use error::{Error, Result};
pub use job::{Band, JobKey, ObservationJob};
pub use stage::{StageCategory, StageKind};
pub use utc::ObsUtc;
