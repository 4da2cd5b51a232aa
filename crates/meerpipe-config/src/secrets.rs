//! Catalog token resolution.
//!
//! Resolution order:
//! 1. `MEERPIPE_CATALOG_TOKEN` environment variable
//! 2. Config file (with warning at load time)

/// Environment variable holding the catalog bearer token.
pub const CATALOG_TOKEN_ENV: &str = "MEERPIPE_CATALOG_TOKEN";

/// A resolved secret with provenance.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub value: String,
    pub source: SecretSource,
}

// The value never reaches logs through Debug.
impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    EnvVar(String),
    /// Config file (plaintext — not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve the catalog token from the environment, then the config value.
pub fn resolve_catalog_token(config_value: Option<&str>) -> Option<ResolvedSecret> {
    resolve_with(|name| std::env::var(name).ok(), config_value)
}

fn resolve_with(
    env: impl Fn(&str) -> Option<String>,
    config_value: Option<&str>,
) -> Option<ResolvedSecret> {
    if let Some(value) = env(CATALOG_TOKEN_ENV)
        && !value.is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(CATALOG_TOKEN_ENV.to_string()),
        });
    }

    config_value
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_wins_over_config() {
        let secret = resolve_with(|_| Some("from-env".into()), Some("from-file")).unwrap();
        assert_eq!(secret.value, "from-env");
        assert_eq!(
            secret.source,
            SecretSource::EnvVar(CATALOG_TOKEN_ENV.to_string())
        );
    }

    #[test]
    fn test_empty_env_falls_back_to_config() {
        let secret = resolve_with(|_| Some(String::new()), Some("from-file")).unwrap();
        assert_eq!(secret.source, SecretSource::ConfigFile);
    }

    #[test]
    fn test_nothing_configured() {
        assert!(resolve_with(|_| None, None).is_none());
        assert!(resolve_with(|_| None, Some("")).is_none());
    }

    #[test]
    fn test_debug_redacts_value() {
        let secret = resolve_with(|_| None, Some("hunter2")).unwrap();
        assert!(!format!("{secret:?}").contains("hunter2"));
    }
}
