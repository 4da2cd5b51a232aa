//! Per-attempt resource ceilings.

use std::time::Duration;

use meerpipe_config::ResourceFactors;
use meerpipe_types::ResourceTags;

/// Ceilings for one attempt: `attempt × duration × factor`.
///
/// The ceiling grows linearly with the attempt number; retries are not
/// delayed any longer because of it.
pub fn resource_tags(factors: ResourceFactors, attempt: u32, duration_secs: f64) -> ResourceTags {
    let scale = f64::from(attempt.max(1)) * duration_secs.max(0.0);
    ResourceTags {
        attempt: attempt.max(1),
        time_limit_secs: scale * factors.time_factor,
        memory_mb: scale * factors.memory_factor,
    }
}

/// Longest timeout ever handed to a subprocess.
const MAX_TIME_LIMIT: Duration = Duration::from_secs(10 * 365 * 86_400);

/// Timeout the engine puts on one stage execution.
///
/// Sits above every per-attempt ceiling, so an attempt always ends through
/// its own time limit and its failure reaches the ledger.
pub const ENGINE_TASK_TIMEOUT: Duration = Duration::from_secs(MAX_TIME_LIMIT.as_secs() + 86_400);

/// The time ceiling as a timeout.
pub fn time_limit(tags: &ResourceTags) -> Duration {
    Duration::try_from_secs_f64(tags.time_limit_secs)
        .unwrap_or(MAX_TIME_LIMIT)
        .min(MAX_TIME_LIMIT)
}
