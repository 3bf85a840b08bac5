//! # Citadel Log
//!
//! Logging bootstrap built on `tracing-subscriber`.
//!
//! ```no_run
//! let _guard = citadel_log::init(citadel_log::Config::from_env())?;
//! tracing::info!("resource runtime up");
//! # Ok::<(), citadel_log::LogError>(())
//! ```
//!
//! Environment variables read by [`Config::from_env`]:
//!
//! | variable              | meaning                                   |
//! |-----------------------|-------------------------------------------|
//! | `CITADEL_LOG`         | filter directive, falls back to `RUST_LOG` |
//! | `CITADEL_LOG_FORMAT`  | `pretty`, `compact` or `json`             |
//! | `CITADEL_LOG_COLORS`  | `true` / `false`                          |
//! | `CITADEL_LOG_SOURCE`  | include file and line                     |

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::OnceLock;

mod builder;
pub mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard, ReloadHandle};
pub use config::{Config, DisplayConfig, Format, WriterConfig};
pub use error::{LogError, LogResult};

/// Install the global subscriber described by `config`.
///
/// Keep the returned guard alive for as long as logging is needed.
pub fn init(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Install the global subscriber from environment variables.
pub fn init_from_env() -> LogResult<LoggerGuard> {
    init(Config::from_env())
}

/// Route logs through the test harness's captured output.
///
/// Safe to call from every test: only the first call installs a subscriber.
pub fn init_test() {
    static TEST_GUARD: OnceLock<Option<LoggerGuard>> = OnceLock::new();
    TEST_GUARD.get_or_init(|| {
        let config = Config {
            level: std::env::var("CITADEL_LOG").unwrap_or_else(|_| "debug".to_owned()),
            writer: WriterConfig::Test,
            ..Config::test()
        };
        init(config).ok()
    });
}
