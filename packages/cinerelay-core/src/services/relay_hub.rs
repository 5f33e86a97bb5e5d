//! Relay hub: the shared state behind every socket and admin request.
//!
//! All mutation goes through one mutex so a handler observes and updates the
//! connection registry, region index and media stores atomically. Handlers
//! read the clock once and thread that instant through every step.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::media::{CommandContext, MediaRegistrar};
use crate::protocol::{ClientMessage, ControlMessage, ServerMessage, VideoCommand};
use crate::services::autoclose::ReportOutcome;
use crate::services::connection_registry::{Connection, ConnectionRegistry, PlayerIdentity};
use crate::services::dispatch::{Delivery, Target};
use crate::services::region_index::RegionIndex;
use crate::services::snapshot::{ConnectionSnapshot, PluginConnection, RegionSnapshot};

/// Everything the hub guards.
#[derive(Debug)]
pub struct HubState {
    pub(crate) connections: ConnectionRegistry,
    pub(crate) media: MediaRegistrar,
    pub(crate) regions: RegionIndex,
}

impl HubState {
    fn new(media_ttl: Duration) -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            media: MediaRegistrar::new(media_ttl),
            regions: RegionIndex::new(),
        }
    }
}

/// A freshly registered video socket.
pub struct ConnectedClient {
    pub generation: u64,
    /// Frames to forward to the socket, starting with `HELLO_ACK`.
    pub receiver: mpsc::UnboundedReceiver<ServerMessage>,
}

pub struct RelayHub {
    state: Mutex<HubState>,
    clock: Arc<dyn Clock>,
    next_generation: AtomicU64,
}

impl RelayHub {
    pub fn new(clock: Arc<dyn Clock>, media_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(HubState::new(media_ttl)),
            clock,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Runs `f` under the hub lock with the instant it was entered.
    pub(crate) fn transact<R>(&self, f: impl FnOnce(&mut HubState, u64) -> R) -> R {
        let mut state = self.state.lock();
        let now = self.clock.now_ms();
        f(&mut state, now)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a validated video socket, replacing any older socket on the
    /// same token. Queues `HELLO_ACK`, the token's own media and then the
    /// media of whatever region the client resolves to.
    pub fn connect(&self, token: &str, identity: PlayerIdentity) -> ConnectedClient {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        self.transact(|state, now| {
            let hello = ControlMessage::HelloAck {
                server_epoch_ms: now,
                player_id: identity.player_id.clone(),
                player_name: identity.player_name.clone(),
                player_uuid: identity.player_uuid.clone(),
            };
            let _ = sender.send(hello.into());

            let connection = Connection::new(token, generation, identity, sender, now);
            if let Some(replaced) = state.connections.insert(connection) {
                log::info!(
                    "[Hub] Token {} reconnected, replacing connection #{}",
                    token,
                    replaced.generation
                );
            }
            state.resume_token_media(token, now);
            state.apply_region_for_client(token, now);
        });

        log::info!("[Hub] Connected {} (#{})", token, generation);
        ConnectedClient {
            generation,
            receiver,
        }
    }

    /// Drops the connection if `generation` is still current and removes its
    /// region membership. The token's media record stays until pruned.
    pub fn disconnect(&self, token: &str, generation: u64) -> bool {
        let removed = self.transact(|state, _now| {
            if !state.connections.is_current(token, generation) {
                return false;
            }
            state.assign_region_for_token(token, None, None);
            state.connections.remove_if_current(token, generation);
            true
        });
        if removed {
            log::info!("[Hub] Disconnected {} (#{})", token, generation);
        } else {
            log::debug!("[Hub] Ignoring close of superseded connection {} (#{})", token, generation);
        }
        removed
    }

    /// Handles one parsed inbound frame. Frames from a superseded socket are
    /// dropped.
    pub fn handle_client_message(
        &self,
        token: &str,
        generation: u64,
        msg: ClientMessage,
    ) -> Option<ReportOutcome> {
        self.transact(|state, now| {
            if !state.connections.is_current(token, generation) {
                return None;
            }
            if let Some(conn) = state.connections.get_mut(token) {
                conn.last_seen = now;
            }
            match msg {
                ClientMessage::VideoState(report) => {
                    Some(state.handle_client_video_state(token, &report, now))
                }
                ClientMessage::Hello(patch) | ClientMessage::IdentityUpdate(patch) => {
                    state.update_client_identity(token, &patch, now);
                    None
                }
                ClientMessage::Pong | ClientMessage::Unknown => None,
            }
        })
    }

    /// Queues a heartbeat `PING` on the connection.
    pub fn ping(&self, token: &str, generation: u64) -> bool {
        self.transact(|state, now| {
            state.connections.is_current(token, generation)
                && state
                    .connections
                    .send(token, ControlMessage::Ping { t: now }.into())
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Delivers one command to a target.
    pub fn deliver(
        &self,
        target: &Target,
        cmd: &VideoCommand,
        context: &CommandContext,
        display_name: Option<&str>,
    ) -> Delivery {
        self.transact(|state, now| state.deliver(target, cmd, context, display_name, now))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn connections(&self) -> Vec<ConnectionSnapshot> {
        self.transact(|state, now| state.connection_snapshots(now))
    }

    pub fn plugin_connections(&self) -> Vec<PluginConnection> {
        self.transact(|state, _now| state.plugin_connections())
    }

    pub fn regions(&self) -> Vec<RegionSnapshot> {
        self.transact(|state, _now| state.region_snapshots())
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Drops every connection, membership and media record.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.connections.reset();
        state.regions.reset();
        state.media.reset();
        log::info!("[Hub] State reset");
    }
}
