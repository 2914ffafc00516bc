//! Engine configuration.
//!
//! Loaded from TOML, then overridden from the environment:
//!
//! ```toml
//! default_timeout_ms = 30000
//! rollback_timeout_ms = 30000
//! history_limit = 100
//!
//! [default_retry]
//! max_attempts = 3
//! initial_delay_ms = 100
//! max_delay_ms = 5000
//! backoff_multiplier = 2.0
//! ```

use std::path::Path;
use std::time::Duration;

use apollo_resilience::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Overrides `default_timeout_ms`.
pub const ENV_DEFAULT_TIMEOUT_MS: &str = "APOLLO_DEFAULT_TIMEOUT_MS";
/// Overrides `default_retry.max_attempts`.
pub const ENV_DEFAULT_MAX_ATTEMPTS: &str = "APOLLO_DEFAULT_MAX_ATTEMPTS";
/// Overrides `history_limit`.
pub const ENV_HISTORY_LIMIT: &str = "APOLLO_HISTORY_LIMIT";

/// Engine-wide defaults. Node settings win over workflow settings, which win
/// over these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-attempt node timeout when neither node nor workflow sets one.
    pub default_timeout_ms: u64,
    /// Retry policy when neither node nor workflow sets one.
    pub default_retry: RetryPolicy,
    /// Timeout for each rollback handler call.
    pub rollback_timeout_ms: u64,
    /// Finished execution records kept for [`recent_executions`](crate::WorkflowEngine::recent_executions).
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            default_retry: RetryPolicy::exponential(3, 100, 5_000),
            rollback_timeout_ms: 30_000,
            history_limit: 100,
        }
    }
}

impl EngineConfig {
    /// Parse from a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::Config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Apply `APOLLO_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, EngineError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, EngineError> {
        if let Some(v) = lookup(ENV_DEFAULT_TIMEOUT_MS) {
            self.default_timeout_ms = parse_env(ENV_DEFAULT_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_DEFAULT_MAX_ATTEMPTS) {
            self.default_retry.max_attempts = parse_env(ENV_DEFAULT_MAX_ATTEMPTS, &v)?;
        }
        if let Some(v) = lookup(ENV_HISTORY_LIMIT) {
            self.history_limit = parse_env(ENV_HISTORY_LIMIT, &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check invariants.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.default_timeout_ms == 0 {
            return Err(EngineError::Config("default_timeout_ms must be positive".into()));
        }
        if self.rollback_timeout_ms == 0 {
            return Err(EngineError::Config("rollback_timeout_ms must be positive".into()));
        }
        self.default_retry
            .validate()
            .map_err(|e| EngineError::Config(format!("default_retry: {e}")))
    }

    /// Set the default node timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the default retry policy.
    #[must_use]
    pub fn with_default_retry(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    /// Set the rollback handler timeout.
    #[must_use]
    pub fn with_rollback_timeout(mut self, timeout: Duration) -> Self {
        self.rollback_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set how many finished records are retained.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Default node timeout.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Rollback handler timeout.
    #[must_use]
    pub fn rollback_timeout(&self) -> Duration {
        Duration::from_millis(self.rollback_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, EngineError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| EngineError::Config(format!("{key}={value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_timeout(), Duration::from_secs(30));
        assert_eq!(config.default_retry.max_attempts, 3);
        assert_eq!(config.default_retry.max_delay_ms, 5_000);
        assert_eq!(config.history_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r"
            history_limit = 10

            [default_retry]
            max_attempts = 5
            ",
        )
        .unwrap();
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.default_retry.max_attempts, 5);
        assert_eq!(config.default_retry.initial_delay_ms, 100);
        assert_eq!(config.default_timeout_ms, 30_000);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("history_limit = \"lots\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = EngineConfig::from_toml_str("default_timeout_ms = 0").unwrap_err();
        assert!(err.to_string().contains("default_timeout_ms"));
    }

    #[test]
    fn env_overrides_apply() {
        let config = EngineConfig::default()
            .with_overrides_from(vars(&[
                (ENV_DEFAULT_TIMEOUT_MS, "250"),
                (ENV_DEFAULT_MAX_ATTEMPTS, "7"),
                (ENV_HISTORY_LIMIT, " 3 "),
            ]))
            .unwrap();
        assert_eq!(config.default_timeout(), Duration::from_millis(250));
        assert_eq!(config.default_retry.max_attempts, 7);
        assert_eq!(config.history_limit, 3);
    }

    #[test]
    fn unparsable_env_value_is_reported() {
        let err = EngineConfig::default()
            .with_overrides_from(vars(&[(ENV_HISTORY_LIMIT, "many")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_HISTORY_LIMIT));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "rollback_timeout_ms = 500\n").unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.rollback_timeout(), Duration::from_millis(500));
    }
}
