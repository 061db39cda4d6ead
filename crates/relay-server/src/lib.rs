//!
//! Relay Server - HTTP application server for the Relay workflow engine
//!
//! This module exports all the components of the Relay Server.

use std::path::Path;
use tracing::info;

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Definition file loading
pub mod definitions;

/// Error module
pub mod error;

/// Server module
pub mod server;

// Re-export key types
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::RelayServer;

/// Run the server with the given configuration
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    // Initialize logging
    init_logging(&config);

    // Create repositories backed by the in-memory state store
    let store = relay_state_inmemory::InMemoryStateStore::new();
    let (definition_repo, instance_repo) = store.create_repositories();

    // Load workflow definitions; an invalid file aborts startup
    let loaded =
        definitions::load_definitions(Path::new(&config.definitions_path), definition_repo.as_ref())
            .await?;
    info!(
        count = loaded,
        path = %config.definitions_path,
        "loaded workflow definitions"
    );

    // Create and run the server
    let server = RelayServer::new(config, definition_repo, instance_repo);
    server.run().await
}

/// Initialize logging
fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    // Create filter based on config, overridable from the environment
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    // Initialize subscriber
    fmt().with_env_filter(filter).with_target(true).init();
}
