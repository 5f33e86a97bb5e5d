//! Application bootstrap and dependency wiring.
//!
//! This module is the composition root: the clock, the hub, the socket
//! registry and the token validator are created here and handed to the API
//! layer as one bundle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{AppState, WsConnectionManager};
use crate::clock::{Clock, SystemClock};
use crate::error::{RelayError, RelayResult};
use crate::identity::{PrefixTokenValidator, TokenValidator};
use crate::services::RelayHub;
use crate::state::Config;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Connection registry, region index and media records.
    pub hub: Arc<RelayHub>,
    /// Open video and plugin sockets.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Validates video socket tokens.
    pub validator: Arc<dyn TokenValidator>,
    /// Validated core configuration.
    pub config: Arc<Config>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Builds the API state over these services.
    pub fn app_state(&self) -> RelayResult<AppState> {
        AppState::builder()
            .hub(Arc::clone(&self.hub))
            .ws_manager(Arc::clone(&self.ws_manager))
            .validator(Arc::clone(&self.validator))
            .config(Arc::clone(&self.config))
            .build()
    }

    /// Initiates graceful shutdown: every socket is force-closed and the
    /// server's shutdown token is cancelled.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        let closed = self.ws_manager.close_all();
        if closed > 0 {
            log::info!("[Bootstrap] Closed {} WebSocket connection(s)", closed);
        }

        self.cancel_token.cancel();
        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps the relay with the system clock and the default token validator.
///
/// # Errors
///
/// Returns [`RelayError::Configuration`] when the configuration is invalid.
pub fn bootstrap_services(config: Config) -> RelayResult<BootstrappedServices> {
    bootstrap_services_with(config, SystemClock::arc(), Arc::new(PrefixTokenValidator))
}

/// Bootstraps the relay with an explicit clock and token validator.
pub fn bootstrap_services_with(
    config: Config,
    clock: Arc<dyn Clock>,
    validator: Arc<dyn TokenValidator>,
) -> RelayResult<BootstrappedServices> {
    config.validate().map_err(RelayError::Configuration)?;

    let hub = Arc::new(RelayHub::new(clock, config.media_ttl()));
    log::info!(
        "[Bootstrap] Relay ready (media ttl {}s, heartbeat {}s, admin key {}, plugin token {})",
        config.media_ttl_secs,
        config.heartbeat_interval_secs,
        if config.effective_admin_key().is_some() { "set" } else { "unset" },
        if config.effective_plugin_token().is_some() { "set" } else { "unset" },
    );

    Ok(BootstrappedServices {
        hub,
        ws_manager: Arc::new(WsConnectionManager::new()),
        validator,
        config: Arc::new(config),
        cancel_token: CancellationToken::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SocketKind;
    use crate::clock::ManualClock;

    #[test]
    fn rejects_invalid_config() {
        let config = Config {
            media_ttl_secs: 0,
            ..Config::default()
        };
        let err = bootstrap_services(config).err().unwrap();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn wires_injected_clock_into_hub() {
        let services = bootstrap_services_with(
            Config::default(),
            Arc::new(ManualClock::new(77)),
            Arc::new(PrefixTokenValidator),
        )
        .unwrap();
        assert_eq!(services.hub.now_ms(), 77);

        let state = services.app_state().unwrap();
        assert!(Arc::ptr_eq(&state.hub, &services.hub));
    }

    #[test]
    fn shutdown_closes_sockets_and_cancels() {
        let services = bootstrap_services(Config::default()).unwrap();
        let guard = services.ws_manager.register(SocketKind::Plugin);
        let socket_token = guard.cancel_token().clone();

        services.shutdown();

        assert!(socket_token.is_cancelled());
        assert!(services.cancel_token.is_cancelled());
    }
}
