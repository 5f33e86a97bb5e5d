//! CineRelay Core - shared library for the CineRelay video relay.
//!
//! CineRelay keeps browser video players in lock-step. Game-server plugins and
//! admin tools issue playback commands against a token, a player or a named
//! region; the relay tracks the authoritative playback state per target and
//! pushes commands over WebSockets so that late joiners and reconnecting
//! players land at the right position.
//!
//! # Architecture
//!
//! - [`media`]: Playback records, anchors and the command/report state machine
//! - [`services`]: The relay hub (connections, regions, dispatch, autoclose)
//!   and the admin command service
//! - [`protocol`]: Wire messages exchanged with video clients
//! - [`api`]: HTTP routes, the video socket and the plugin socket
//! - [`identity`]: Token validation for video sockets
//! - [`clock`]: Injectable time source
//! - [`state`]: Core configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`Clock`](clock::Clock): Epoch-millisecond time source
//! - [`TokenValidator`](identity::TokenValidator): Video socket token check
//!
//! Each trait has a default implementation used by the standalone server.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod clock;
pub mod error;
pub mod identity;
pub mod media;
pub mod protocol;
pub mod protocol_constants;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorCode, RelayError, RelayResult};
pub use identity::{PrefixTokenValidator, TokenValidator, ValidatedToken};
pub use state::Config;
pub use utils::now_millis;

// Re-export service types
pub use services::{AdminCommand, RelayHub, Target, TargetKind, TargetSelector};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, bootstrap_services_with, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, AppStateBuilder, ServerError, WsConnectionManager};
