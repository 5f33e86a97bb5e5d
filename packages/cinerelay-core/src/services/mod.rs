//! Application services layer.
//!
//! The relay hub and the pieces it is assembled from: connection registry,
//! region index, targeting, membership follow-up, autoclose and the admin
//! command service that drives them.

mod autoclose;
pub mod commands;
pub mod connection_registry;
pub mod dispatch;
pub mod region_index;
mod region_sync;
pub mod relay_hub;
pub mod snapshot;

pub use autoclose::ReportOutcome;
pub use commands::{AdminCommand, DeliveryResponse, SetRegionResponse};
pub use connection_registry::{PlayerIdentity, PlayerSource};
pub use dispatch::{Target, TargetKind, TargetSelector};
pub use relay_hub::{ConnectedClient, RelayHub};
