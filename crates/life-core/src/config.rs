//! Configuration types for the simulation.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Board and timing parameters for one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Number of rows in the grid
    pub rows: i32,
    /// Number of columns in the grid
    pub cols: i32,
    /// Delay between generations while the life cycle runs (milliseconds)
    pub tick_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rows: 30,
            cols: 30,
            tick_interval_ms: 100,
        }
    }
}

impl EngineConfig {
    pub fn new(rows: i32, cols: i32, tick_interval_ms: u64) -> Self {
        Self {
            rows,
            cols,
            tick_interval_ms,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows <= 0 || self.cols <= 0 {
            return Err(Error::InvalidDimension {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "tick interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Board hosted by the server
    pub engine: EngineConfig,
    /// Start the life cycle as soon as the server is up
    pub autostart: bool,
    /// Stop the life cycle once the population dies out
    pub stop_on_extinction: bool,
    /// OpenTelemetry endpoint
    pub otel_endpoint: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            engine: EngineConfig::default(),
            autostart: true,
            stop_on_extinction: true,
            otel_endpoint: None,
        }
    }
}

impl ServerConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.engine.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let engine = EngineConfig::default();
        assert_eq!(engine.rows, 30);
        assert_eq!(engine.cols, 30);
        assert_eq!(engine.tick_interval_ms, 100);
        assert!(engine.validate().is_ok());

        let server = ServerConfig::default();
        assert_eq!(server.port, 8080);
        assert!(server.stop_on_extinction);
    }

    #[test]
    fn test_engine_config_validation() {
        assert_eq!(
            EngineConfig::new(0, 5, 100).validate(),
            Err(Error::InvalidDimension { rows: 0, cols: 5 })
        );
        assert!(matches!(
            EngineConfig::new(5, 5, 0).validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_server_config_partial_json() {
        let config =
            ServerConfig::from_json(r#"{ "port": 9000, "engine": { "rows": 12, "tickIntervalMs": 250 } }"#)
                .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.engine.rows, 12);
        assert_eq!(config.engine.cols, 30);
        assert_eq!(config.engine.tick_interval_ms, 250);
        assert_eq!(config.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_server_config_rejects_bad_engine() {
        let err = ServerConfig::from_json(r#"{ "engine": { "rows": -1 } }"#).unwrap_err();
        assert_eq!(err, Error::InvalidDimension { rows: -1, cols: 30 });
    }
}
