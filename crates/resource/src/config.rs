//! Resource manager configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables for a [`ResourceManager`](crate::ResourceManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Whether dependency constraints (`/key:value`) are evaluated.
    pub enforce_constraints: bool,
    /// Broadcast capacity for [`ResourceEvent`](crate::ResourceEvent)s.
    pub event_buffer: usize,
    /// Upper bound on custom events deferred with `queue_event`.
    pub max_queued_events: usize,
    /// Bridge start/stop into the custom event bus as
    /// `onResourceStart` / `onResourceStop`.
    pub emit_lifecycle_events: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            enforce_constraints: true,
            event_buffer: 1024,
            max_queued_events: 4096,
            emit_lifecycle_events: true,
        }
    }
}

impl ManagerConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| Error::configuration(format!("invalid manager config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(Error::configuration("event_buffer must be greater than zero"));
        }
        if self.max_queued_events == 0 {
            return Err(Error::configuration(
                "max_queued_events must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = ManagerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enforce_constraints);
        assert_eq!(config.event_buffer, 1024);
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = ManagerConfig::from_json(r#"{ "enforce_constraints": false }"#).unwrap();
        assert!(!config.enforce_constraints);
        assert_eq!(config.max_queued_events, 4096);
        assert!(config.emit_lifecycle_events);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let err = ManagerConfig::from_json(r#"{ "event_buffer": 0 }"#).unwrap_err();
        assert_eq!(err.kind(), "configuration");

        let config = ManagerConfig {
            max_queued_events: 0,
            ..ManagerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        let err = ManagerConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
