//! Configuration for the Relay Server
//!
//! This module contains the configuration types and loading functionality.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

use crate::error::{ServerError, ServerResult};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Path of the workflow definitions JSON file loaded at startup
    #[serde(default = "default_definitions_path")]
    pub definitions_path: String,

    /// Log filter directive (tracing `EnvFilter` syntax)
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_definitions_path() -> String {
    "workflows.json".to_string()
}

fn default_log_filter() -> String {
    "info,relay=debug".to_string()
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        // Start with defaults
        let mut config = Self::default();

        // Override from environment variables
        if let Ok(port) = env::var("RELAY_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.port = port;
            } else {
                warn!("Invalid RELAY_PORT value: {}", port);
            }
        }

        if let Ok(host) = env::var("RELAY_BIND_ADDRESS") {
            config.bind_address = host;
        }

        if let Ok(path) = env::var("RELAY_DEFINITIONS_PATH") {
            config.definitions_path = path;
        }

        if let Ok(filter) = env::var("LOG_FILTER") {
            config.log_filter = filter;
        }

        // Validate required fields
        if config.definitions_path.is_empty() {
            return Err(ServerError::Config(
                "Definitions file path is required".to_string(),
            ));
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            definitions_path: default_definitions_path(),
            log_filter: default_log_filter(),
        }
    }
}
