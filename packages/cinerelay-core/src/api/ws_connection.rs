//! Socket bookkeeping for the video and plugin endpoints.
//!
//! - `WsConnectionManager`: tracks every open socket by kind
//! - `ConnectionGuard`: RAII guard that unregisters on drop
//!
//! Relay state (tokens, regions, media) lives in the hub; this only knows
//! which socket tasks are running so shutdown can stop them all.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Which endpoint a socket was accepted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Video,
    Plugin,
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Plugin => f.write_str("plugin"),
        }
    }
}

/// Manages all open sockets.
///
/// Uses hierarchical cancellation tokens so one call can ask every socket
/// task to wind down.
pub struct WsConnectionManager {
    /// Open sockets: socket id -> kind.
    connections: DashMap<String, SocketKind>,
    next_id: AtomicU64,
    /// Parent of every socket token. Replaced after `close_all()` so new
    /// sockets can still be accepted.
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a socket and returns a guard that unregisters it on drop.
    pub fn register(self: &Arc<Self>, kind: SocketKind) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn_id = format!("{}-{}", kind, id);
        let cancel_token = self.global_cancel.read().child_token();

        self.connections.insert(conn_id.clone(), kind);
        log::debug!(
            "[WS] Socket registered: {} (total: {})",
            conn_id,
            self.connections.len()
        );

        ConnectionGuard {
            id: conn_id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: &str) {
        if self.connections.remove(id).is_some() {
            log::debug!(
                "[WS] Socket unregistered: {} (remaining: {})",
                id,
                self.connections.len()
            );
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn count_of(&self, kind: SocketKind) -> usize {
        self.connections.iter().filter(|e| *e.value() == kind).count()
    }

    /// Signals every open socket to close.
    ///
    /// Returns the number of sockets that were signaled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        if count > 0 {
            log::info!("[WS] Force-closing {} socket(s)", count);
        }
        let mut guard = self.global_cancel.write();
        guard.cancel();
        *guard = CancellationToken::new();
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters a socket when dropped, even if its task exits early.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancelled when the manager force-closes sockets.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}
