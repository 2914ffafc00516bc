//! Configuration presets for common scenarios

use super::{Config, Format};

impl Config {
    /// Create configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // APOLLO_LOG wins over RUST_LOG
        if let Some(level) = lookup("APOLLO_LOG").or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }

        if let Some(format) = lookup("APOLLO_LOG_FORMAT").as_deref().and_then(Format::parse) {
            config.format = format;
        }

        if config.format == Format::Json {
            config.ansi = false;
        }

        config
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            source: true,
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            ansi: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn apollo_log_takes_precedence() {
        let config = Config::from_lookup(lookup(&[
            ("APOLLO_LOG", "debug"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn falls_back_to_rust_log() {
        let config = Config::from_lookup(lookup(&[("RUST_LOG", "apollo_engine=trace")]));
        assert_eq!(config.level, "apollo_engine=trace");
    }

    #[test]
    fn json_format_disables_ansi() {
        let config = Config::from_lookup(lookup(&[("APOLLO_LOG_FORMAT", "json")]));
        assert_eq!(config.format, Format::Json);
        assert!(!config.ansi);
    }

    #[test]
    fn unknown_format_keeps_default() {
        let config = Config::from_lookup(lookup(&[("APOLLO_LOG_FORMAT", "xml")]));
        assert_eq!(config, Config::default());
    }
}
