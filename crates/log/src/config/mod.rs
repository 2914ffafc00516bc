//! Logger configuration.

mod presets;

use serde::{Deserialize, Serialize};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human oriented.
    Pretty,
    /// Single-line, human oriented.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively. Unknown names yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directive, e.g. `info` or `apollo_engine=debug,info`.
    pub level: String,
    /// Output format.
    pub format: Format,
    /// Colourise output. Ignored for [`Format::Json`].
    pub ansi: bool,
    /// Include the event target.
    pub target: bool,
    /// Include source file and line.
    pub source: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::default(),
            ansi: true,
            target: true,
            source: false,
        }
    }
}

impl Config {
    /// Override the level directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Override the output format.
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pretty", Some(Format::Pretty))]
    #[case("JSON", Some(Format::Json))]
    #[case(" compact ", Some(Format::Compact))]
    #[case("logfmt", None)]
    fn format_names(#[case] name: &str, #[case] expected: Option<Format>) {
        assert_eq!(Format::parse(name), expected);
    }

    #[test]
    fn deserializes_partial_config() {
        let config: Config = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.level, "info");
    }
}
