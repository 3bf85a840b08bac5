//! Logger configuration

mod presets;

use serde::{Deserialize, Serialize};

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directive, e.g. `info,citadel_resource=debug`
    pub level: String,
    /// Output format
    pub format: Format,
    /// Presentation options
    pub display: DisplayConfig,
    /// Output destination
    pub writer: WriterConfig,
    /// Allow changing the filter at runtime through a [`ReloadHandle`](crate::ReloadHandle)
    pub reloadable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            display: DisplayConfig::default(),
            writer: WriterConfig::Stderr,
            reloadable: false,
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human friendly
    Pretty,
    /// Single line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Output destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterConfig {
    /// Standard error
    #[default]
    Stderr,
    /// Standard output
    Stdout,
    /// libtest's captured output
    Test,
}

/// Presentation options for each event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// ANSI colors
    pub colors: bool,
    /// Event target (module path)
    pub target: bool,
    /// Source file and line
    pub source: bool,
    /// Thread ids
    pub thread_ids: bool,
    /// Flatten event fields into the top-level JSON object
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            target: true,
            source: false,
            thread_ids: false,
            flatten: false,
        }
    }
}

impl DisplayConfig {
    /// Override options from `CITADEL_LOG_*` environment variables.
    pub fn parse_env(&mut self) {
        let flag = |name: &str| std::env::var(name).ok().and_then(|v| parse_flag(&v));

        if let Some(colors) = flag("CITADEL_LOG_COLORS") {
            self.colors = colors;
        }
        if let Some(source) = flag("CITADEL_LOG_SOURCE") {
            self.source = source;
        }
        if let Some(target) = flag("CITADEL_LOG_TARGET") {
            self.target = target;
        }
        if let Some(thread_ids) = flag("CITADEL_LOG_THREAD_IDS") {
            self.thread_ids = thread_ids;
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("pretty", Some(Format::Pretty))]
    #[case("JSON", Some(Format::Json))]
    #[case("compact", Some(Format::Compact))]
    #[case("logfmt", None)]
    fn format_names(#[case] name: &str, #[case] expected: Option<Format>) {
        assert_eq!(Format::parse(name), expected);
    }

    #[rstest]
    #[case("on", Some(true))]
    #[case(" 0 ", Some(false))]
    #[case("maybe", None)]
    fn flags(#[case] value: &str, #[case] expected: Option<bool>) {
        assert_eq!(parse_flag(value), expected);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: Config = serde_json::from_str(r#"{ "level": "debug", "format": "json" }"#).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.writer, WriterConfig::Stderr);
        assert_eq!(config.display, DisplayConfig::default());
    }
}
