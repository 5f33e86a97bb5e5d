//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to the relay hub and the
//! admin command service. It provides the router construction and server
//! startup functionality.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, RelayResult};
use crate::identity::TokenValidator;
use crate::services::RelayHub;
use crate::state::Config;

pub mod auth;
pub mod http;
pub mod plugin_ws;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::{SocketKind, WsConnectionManager};

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// Holds references to services; all relay logic lives in the hub.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RelayHub>,
    pub ws_manager: Arc<WsConnectionManager>,
    pub validator: Arc<dyn TokenValidator>,
    pub config: Arc<Config>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    hub: Option<Arc<RelayHub>>,
    ws_manager: Option<Arc<WsConnectionManager>>,
    validator: Option<Arc<dyn TokenValidator>>,
    config: Option<Arc<Config>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hub(mut self, hub: Arc<RelayHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn ws_manager(mut self, manager: Arc<WsConnectionManager>) -> Self {
        self.ws_manager = Some(manager);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`.
    ///
    /// The hub, validator and config are required; a fresh connection
    /// manager is created when none was supplied.
    pub fn build(self) -> RelayResult<AppState> {
        let missing = |field: &str| RelayError::Configuration(format!("{field} is required"));
        Ok(AppState {
            hub: self.hub.ok_or_else(|| missing("hub"))?,
            ws_manager: self.ws_manager.unwrap_or_default(),
            validator: self.validator.ok_or_else(|| missing("validator"))?,
            config: self.config.ok_or_else(|| missing("config"))?,
        })
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

/// Serves the relay on `addr` until `shutdown` is cancelled.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    log::info!("Server listening on http://{}", addr);
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
