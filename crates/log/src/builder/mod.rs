//! Logger builder implementation

mod reload;

pub use reload::ReloadHandle;

use tracing_subscriber::fmt::TestWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format, WriterConfig};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard returned by a successful install
///
/// Holds the reload handle when the filter is reloadable.
#[derive(Debug)]
pub struct LoggerGuard {
    reload: Option<ReloadHandle>,
}

impl LoggerGuard {
    /// Handle for changing the filter at runtime, if the logger is reloadable
    #[must_use]
    pub fn reload_handle(&self) -> Option<&ReloadHandle> {
        self.reload.as_ref()
    }
}

/// Format layer with the display options applied.
macro_rules! create_fmt_layer {
    ($style:ident, $display:expr, $writer:expr) => {
        tracing_subscriber::fmt::layer()
            .with_writer($writer)
            .with_ansi($display.colors)
            .with_target($display.target)
            .with_file($display.source)
            .with_line_number($display.source)
            .with_thread_ids($display.thread_ids)
            .$style()
    };
}

/// Registry + filter + format, installed as the global default.
macro_rules! try_init_subscriber {
    ($filter_layer:expr, $fmt_layer:expr) => {
        Registry::default()
            .with($filter_layer)
            .with($fmt_layer)
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))
    };
}

fn make_writer(writer: WriterConfig) -> BoxMakeWriter {
    match writer {
        WriterConfig::Stderr => BoxMakeWriter::new(std::io::stderr),
        WriterConfig::Stdout => BoxMakeWriter::new(std::io::stdout),
        WriterConfig::Test => BoxMakeWriter::new(TestWriter::new()),
    }
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the logger
    ///
    /// Fails with [`LogError::Filter`] for an unparsable filter and with
    /// [`LogError::Init`] if a global subscriber is already installed.
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = EnvFilter::try_new(&self.config.level)
            .map_err(|e| LogError::Filter(format!("{}: {e}", self.config.level)))?;

        let (filter_layer, reload) =
            reload::create_filter_layer(filter, &self.config.level, self.config.reloadable);
        let writer = make_writer(self.config.writer);
        let display = &self.config.display;

        match self.config.format {
            Format::Pretty => {
                let fmt_layer = create_fmt_layer!(pretty, display, writer);
                try_init_subscriber!(filter_layer, fmt_layer)?;
            }
            Format::Compact => {
                let fmt_layer = create_fmt_layer!(compact, display, writer);
                try_init_subscriber!(filter_layer, fmt_layer)?;
            }
            Format::Json => {
                let fmt_layer = create_fmt_layer!(json, display, writer)
                    .flatten_event(display.flatten)
                    .with_current_span(true);
                try_init_subscriber!(filter_layer, fmt_layer)?;
            }
        }

        tracing::debug!(filter = %self.config.level, format = ?self.config.format, "logger installed");
        Ok(LoggerGuard { reload })
    }
}
