//! Named configurations and environment loading

use super::{Config, DisplayConfig, Format, WriterConfig};

/// Filter variables, highest precedence first.
const FILTER_VARS: [&str; 2] = ["CITADEL_LOG", "RUST_LOG"];
const FORMAT_VAR: &str = "CITADEL_LOG_FORMAT";

/// First non-empty filter directive from the environment.
fn env_filter() -> Option<String> {
    FILTER_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|directive| !directive.trim().is_empty())
}

impl Config {
    /// Defaults overridden by `CITADEL_LOG` (or `RUST_LOG`),
    /// `CITADEL_LOG_FORMAT` and the `CITADEL_LOG_*` display switches.
    ///
    /// An unknown format name keeps the default format.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(level) = env_filter() {
            config.level = level;
        }
        if let Some(format) = std::env::var(FORMAT_VAR).ok().as_deref().and_then(Format::parse) {
            config.format = format;
        }
        config.display.parse_env();
        config
    }

    fn preset(level: &str, format: Format, display: DisplayConfig) -> Self {
        Self {
            level: level.to_owned(),
            format,
            display,
            ..Self::default()
        }
    }

    /// Local work on the runtime: everything from citadel crates at debug,
    /// multi-line output with source locations. The filter can be reloaded.
    #[must_use]
    pub fn development() -> Self {
        Self {
            reloadable: true,
            ..Self::preset(
                "info,citadel_resource=debug,citadel_eventbus=debug",
                Format::Pretty,
                DisplayConfig {
                    source: true,
                    ..DisplayConfig::default()
                },
            )
        }
    }

    /// Deployed hosts: info level, one flattened JSON object per line on
    /// stdout, no ANSI escapes.
    #[must_use]
    pub fn production() -> Self {
        Self {
            writer: WriterConfig::Stdout,
            ..Self::preset("info", Format::Json, DisplayConfig::plain().flattened())
        }
    }

    /// Test runs: every event, compact and uncolored.
    #[must_use]
    pub fn test() -> Self {
        Self::preset("trace", Format::Compact, DisplayConfig::plain())
    }
}

impl DisplayConfig {
    /// Defaults without colors.
    #[must_use]
    pub fn plain() -> Self {
        Self {
            colors: false,
            ..Self::default()
        }
    }

    /// Same options with event fields lifted into the top-level JSON object.
    #[must_use]
    pub fn flattened(self) -> Self {
        Self { flatten: true, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn presets_differ_where_it_matters() {
        let dev = Config::development();
        assert_eq!(dev.format, Format::Pretty);
        assert!(dev.display.source);
        assert!(dev.reloadable);
        assert!(dev.level.contains("citadel_resource=debug"));

        let prod = Config::production();
        assert_eq!(prod.format, Format::Json);
        assert_eq!(prod.writer, WriterConfig::Stdout);
        assert!(!prod.display.colors);
        assert!(prod.display.flatten);

        let test = Config::test();
        assert_eq!(test.level, "trace");
        assert!(!test.display.colors);
        assert!(!test.display.flatten);
    }

    #[test]
    fn plain_display_only_drops_colors() {
        assert_eq!(
            DisplayConfig::plain(),
            DisplayConfig {
                colors: false,
                ..DisplayConfig::default()
            }
        );
    }
}
