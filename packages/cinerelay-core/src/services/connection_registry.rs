//! Live video connections keyed by token.
//!
//! Each connection owns an unbounded outbound channel; the socket task drains
//! it. Pushing never blocks, so the relay can fan out while holding its lock.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;
use crate::services::region_index::{collect_player_keys, PlayerKey, PlayerKeyKind};

/// Identity field a player selector refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerSource {
    PlayerId,
    PlayerUuid,
    PlayerName,
}

impl PlayerSource {
    /// Kind of override key this field maps to.
    pub fn key_kind(self) -> PlayerKeyKind {
        match self {
            Self::PlayerId => PlayerKeyKind::Id,
            Self::PlayerUuid => PlayerKeyKind::Uuid,
            Self::PlayerName => PlayerKeyKind::Name,
        }
    }
}

/// Who is behind a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub player_id: String,
    pub player_uuid: Option<String>,
    pub player_name: Option<String>,
}

impl PlayerIdentity {
    /// Canonical override keys for this identity, in lookup order.
    pub fn player_keys(&self) -> Vec<PlayerKey> {
        collect_player_keys(
            Some(self.player_id.as_str()),
            self.player_uuid.as_deref(),
            self.player_name.as_deref(),
        )
    }

    /// Whether `value` identifies this player by any field.
    ///
    /// Ids compare exactly; uuids and names ignore case.
    fn matches_any(&self, value: &str) -> bool {
        if self.player_id == value {
            return true;
        }
        self.matches_source(value, PlayerSource::PlayerUuid)
            || self.matches_source(value, PlayerSource::PlayerName)
    }

    fn matches_source(&self, value: &str, source: PlayerSource) -> bool {
        let lowered = value.to_lowercase();
        match source {
            PlayerSource::PlayerId => self.player_id == value,
            PlayerSource::PlayerUuid => self
                .player_uuid
                .as_deref()
                .is_some_and(|u| u.to_lowercase() == lowered),
            PlayerSource::PlayerName => self
                .player_name
                .as_deref()
                .is_some_and(|n| n.to_lowercase() == lowered),
        }
    }
}

/// One live transport session.
#[derive(Debug)]
pub struct Connection {
    pub token: String,
    /// Process-unique connection number; distinguishes a reconnect on the
    /// same token from the socket it replaced.
    pub generation: u64,
    pub identity: PlayerIdentity,
    pub public_server_key: Option<String>,
    pub scope: Option<serde_json::Value>,
    pub region: Option<String>,
    pub region_display_name: Option<String>,
    pub connected_at: u64,
    pub last_seen: u64,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(
        token: impl Into<String>,
        generation: u64,
        identity: PlayerIdentity,
        sender: mpsc::UnboundedSender<ServerMessage>,
        now: u64,
    ) -> Self {
        Self {
            token: token.into(),
            generation,
            identity,
            public_server_key: None,
            scope: None,
            region: None,
            region_display_name: None,
            connected_at: now,
            last_seen: now,
            sender,
        }
    }

    /// Queues a frame for the socket. Returns `false` once the socket is gone.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.sender.send(msg).is_ok()
    }

    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection, returning the one it replaced on the same token.
    pub fn insert(&mut self, connection: Connection) -> Option<Connection> {
        self.connections
            .insert(connection.token.clone(), connection)
    }

    /// Removes the connection for `token` only if it is still `generation`.
    pub fn remove_if_current(&mut self, token: &str, generation: u64) -> Option<Connection> {
        match self.connections.get(token) {
            Some(conn) if conn.generation == generation => self.connections.remove(token),
            _ => None,
        }
    }

    pub fn get(&self, token: &str) -> Option<&Connection> {
        self.connections.get(token)
    }

    pub fn get_mut(&mut self, token: &str) -> Option<&mut Connection> {
        self.connections.get_mut(token)
    }

    pub fn is_current(&self, token: &str, generation: u64) -> bool {
        self.connections
            .get(token)
            .is_some_and(|c| c.generation == generation)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Pushes a frame to `token`. Returns whether a live socket took it.
    pub fn send(&self, token: &str, msg: ServerMessage) -> bool {
        self.connections
            .get(token)
            .is_some_and(|conn| conn.send(msg))
    }

    /// Connections ordered by when they connected.
    pub fn in_connect_order(&self) -> Vec<&Connection> {
        let mut ordered: Vec<&Connection> = self.connections.values().collect();
        ordered.sort_by_key(|c| c.generation);
        ordered
    }

    /// First open connection matching `value` by id, uuid, name or token.
    pub fn find_player(&self, value: &str) -> Option<&Connection> {
        self.in_connect_order()
            .into_iter()
            .filter(|c| c.is_open())
            .find(|c| c.identity.matches_any(value) || c.token == value)
    }

    /// Every token whose `source` field matches `value`, plus a literal token match.
    pub fn tokens_for_player(&self, value: &str, source: PlayerSource) -> Vec<String> {
        self.in_connect_order()
            .into_iter()
            .filter(|c| c.identity.matches_source(value, source) || c.token == value)
            .map(|c| c.token.clone())
            .collect()
    }

    /// Updates the cached region fields of a connection, if it is live.
    pub fn set_region(&mut self, token: &str, region: Option<&str>, display_name: Option<String>) {
        if let Some(conn) = self.connections.get_mut(token) {
            conn.region = region.map(str::to_string);
            conn.region_display_name = display_name;
        }
    }

    pub fn reset(&mut self) {
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::VideoCommand;

    fn connection(
        token: &str,
        generation: u64,
        id: &str,
        uuid: Option<&str>,
        name: Option<&str>,
    ) -> (Connection, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let identity = PlayerIdentity {
            player_id: id.into(),
            player_uuid: uuid.map(Into::into),
            player_name: name.map(Into::into),
        };
        (Connection::new(token, generation, identity, tx, 0), rx)
    }

    #[test]
    fn send_reaches_live_connection_only() {
        let mut registry = ConnectionRegistry::new();
        let (conn, mut rx) = connection("tok-a", 1, "p1", None, None);
        registry.insert(conn);

        assert!(registry.send("tok-a", VideoCommand::Close.into()));
        assert!(!registry.send("missing", VideoCommand::Close.into()));
        assert_eq!(rx.try_recv().unwrap(), VideoCommand::Close.into());

        drop(rx);
        assert!(!registry.send("tok-a", VideoCommand::Close.into()));
    }

    #[test]
    fn stale_generation_cannot_remove_replacement() {
        let mut registry = ConnectionRegistry::new();
        let (old, _old_rx) = connection("tok", 1, "p1", None, None);
        let (new, _new_rx) = connection("tok", 2, "p1", None, None);
        registry.insert(old);
        let replaced = registry.insert(new);
        assert_eq!(replaced.map(|c| c.generation), Some(1));

        assert!(registry.remove_if_current("tok", 1).is_none());
        assert!(registry.is_current("tok", 2));
        assert!(registry.remove_if_current("tok", 2).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn find_player_returns_first_match_in_connect_order() {
        let mut registry = ConnectionRegistry::new();
        let (late, _rx1) = connection("tok-late", 9, "x", Some("UUID-1"), Some("Steve"));
        let (early, _rx2) = connection("tok-early", 3, "y", Some("uuid-1"), None);
        registry.insert(late);
        registry.insert(early);

        assert_eq!(registry.find_player("uuid-1").map(|c| c.token.as_str()), Some("tok-early"));
        assert_eq!(registry.find_player("STEVE").map(|c| c.token.as_str()), Some("tok-late"));
        assert_eq!(registry.find_player("tok-late").map(|c| c.token.as_str()), Some("tok-late"));
        assert!(registry.find_player("X").is_none(), "ids compare exactly");
    }

    #[test]
    fn tokens_for_player_filters_by_source() {
        let mut registry = ConnectionRegistry::new();
        let (a, _rx1) = connection("tok-a", 1, "p1", Some("U1"), Some("Alex"));
        let (b, _rx2) = connection("tok-b", 2, "p2", Some("u1"), Some("Sam"));
        registry.insert(a);
        registry.insert(b);

        assert_eq!(
            registry.tokens_for_player("u1", PlayerSource::PlayerUuid),
            vec!["tok-a".to_string(), "tok-b".to_string()]
        );
        assert_eq!(
            registry.tokens_for_player("alex", PlayerSource::PlayerName),
            vec!["tok-a".to_string()]
        );
        assert!(registry
            .tokens_for_player("alex", PlayerSource::PlayerId)
            .is_empty());
    }

    #[test]
    fn identity_keys_cover_all_fields() {
        let identity = PlayerIdentity {
            player_id: "P1".into(),
            player_uuid: None,
            player_name: Some("Alex".into()),
        };
        let keys: Vec<String> = identity
            .player_keys()
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, vec!["id:p1", "name:alex"]);
    }
}
