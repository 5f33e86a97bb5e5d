//! Command registrar: the single choke point every playback command passes
//! through before it reaches the wire.
//!
//! Holds two stores of identical shape, one keyed by connection token and one
//! by canonical region id. Stale records are pruned from both after every
//! command.

use std::collections::HashMap;
use std::time::Duration;

use crate::media::record::MediaRecord;
use crate::protocol::VideoCommand;

/// Which store a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaScope {
    Token,
    Region,
}

/// Caller-supplied correlation data recorded alongside a command.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// Opaque session id; echoed back in snapshots.
    pub session_id: Option<serde_json::Value>,
}

impl CommandContext {
    pub fn with_session(session_id: Option<serde_json::Value>) -> Self {
        Self {
            session_id: session_id.filter(|v| !v.is_null()),
        }
    }
}

/// Media records keyed by token or region id.
#[derive(Debug, Default)]
pub struct MediaStore {
    records: HashMap<String, MediaRecord>,
}

impl MediaStore {
    pub fn get(&self, key: &str) -> Option<&MediaRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut MediaRecord> {
        self.records.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }

    fn ensure(&mut self, key: &str) -> &mut MediaRecord {
        self.records.entry(key.to_string()).or_default()
    }

    fn remove(&mut self, key: &str) -> Option<MediaRecord> {
        self.records.remove(key)
    }

    /// Drops records not updated since `cutoff`. Returns how many were removed.
    fn prune(&mut self, cutoff: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.last_update >= cutoff);
        before - self.records.len()
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}

/// Applies commands to the per-token and per-region stores.
#[derive(Debug)]
pub struct MediaRegistrar {
    by_token: MediaStore,
    by_region: MediaStore,
    ttl_ms: u64,
}

impl MediaRegistrar {
    /// Creates an empty registrar that prunes records idle for longer than `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            by_token: MediaStore::default(),
            by_region: MediaStore::default(),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    pub fn store(&self, scope: MediaScope) -> &MediaStore {
        match scope {
            MediaScope::Token => &self.by_token,
            MediaScope::Region => &self.by_region,
        }
    }

    fn store_mut(&mut self, scope: MediaScope) -> &mut MediaStore {
        match scope {
            MediaScope::Token => &mut self.by_token,
            MediaScope::Region => &mut self.by_region,
        }
    }

    pub fn get(&self, scope: MediaScope, key: &str) -> Option<&MediaRecord> {
        self.store(scope).get(key)
    }

    pub fn get_mut(&mut self, scope: MediaScope, key: &str) -> Option<&mut MediaRecord> {
        self.store_mut(scope).get_mut(key)
    }

    /// Records `cmd` against `key` at `now` and returns the resolved command.
    ///
    /// CLOSE deletes the record (a no-op for a missing key); every other kind
    /// creates the record on first use.
    pub fn apply_command(
        &mut self,
        scope: MediaScope,
        key: &str,
        cmd: &VideoCommand,
        context: &CommandContext,
        now: u64,
    ) -> VideoCommand {
        let resolved = match cmd {
            VideoCommand::Close => {
                if self.store_mut(scope).remove(key).is_some() {
                    log::debug!("[Media] Closed {:?} record {}", scope, key);
                }
                VideoCommand::Close
            }
            _ => {
                let record = self.store_mut(scope).ensure(key);
                if let Some(session_id) = &context.session_id {
                    record.session_id = Some(session_id.clone());
                }
                record.apply(cmd, now)
            }
        };
        self.prune(now);
        resolved
    }

    /// Removes records from both stores that have been idle longer than the TTL.
    pub fn prune(&mut self, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.ttl_ms);
        let removed = self.by_token.prune(cutoff) + self.by_region.prune(cutoff);
        if removed > 0 {
            log::debug!("[Media] Pruned {} stale record(s)", removed);
        }
        removed
    }

    /// Empties both stores.
    pub fn reset(&mut self) {
        self.by_token.clear();
        self.by_region.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::record::MediaStatus;
    use crate::protocol::{InitCommand, PlayCommand};
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(15 * 60);

    fn play() -> VideoCommand {
        VideoCommand::Play(PlayCommand::default())
    }

    #[test]
    fn first_command_creates_record() {
        let mut registrar = MediaRegistrar::new(TTL);
        registrar.apply_command(MediaScope::Token, "tok", &play(), &CommandContext::default(), 10);
        let record = registrar.get(MediaScope::Token, "tok").unwrap();
        assert_eq!(record.state.status, MediaStatus::Playing);
        assert!(registrar.get(MediaScope::Region, "tok").is_none());
    }

    #[test]
    fn close_is_idempotent() {
        let mut registrar = MediaRegistrar::new(TTL);
        let ctx = CommandContext::default();

        // missing key
        registrar.apply_command(MediaScope::Region, "lobby", &VideoCommand::Close, &ctx, 1);
        assert!(registrar.store(MediaScope::Region).is_empty());

        registrar.apply_command(MediaScope::Region, "lobby", &play(), &ctx, 2);
        registrar.apply_command(MediaScope::Region, "lobby", &VideoCommand::Close, &ctx, 3);
        assert!(registrar.get(MediaScope::Region, "lobby").is_none());
        registrar.apply_command(MediaScope::Region, "lobby", &VideoCommand::Close, &ctx, 4);
        assert!(registrar.get(MediaScope::Region, "lobby").is_none());
    }

    #[test]
    fn session_id_is_sticky() {
        let mut registrar = MediaRegistrar::new(TTL);
        let with_session = CommandContext::with_session(Some(json!("sess-1")));
        registrar.apply_command(
            MediaScope::Token,
            "tok",
            &VideoCommand::Init(InitCommand::new("u")),
            &with_session,
            1,
        );
        registrar.apply_command(MediaScope::Token, "tok", &play(), &CommandContext::default(), 2);
        assert_eq!(
            registrar.get(MediaScope::Token, "tok").unwrap().session_id,
            Some(json!("sess-1"))
        );
    }

    #[test]
    fn null_session_is_ignored() {
        assert!(CommandContext::with_session(Some(serde_json::Value::Null))
            .session_id
            .is_none());
    }

    #[test]
    fn stale_records_are_pruned_across_both_stores() {
        let mut registrar = MediaRegistrar::new(TTL);
        let ctx = CommandContext::default();
        registrar.apply_command(MediaScope::Token, "old", &play(), &ctx, 0);
        registrar.apply_command(MediaScope::Region, "old-region", &play(), &ctx, 0);

        let later = TTL.as_millis() as u64 + 1;
        registrar.apply_command(MediaScope::Token, "fresh", &play(), &ctx, later);

        assert!(registrar.get(MediaScope::Token, "old").is_none());
        assert!(registrar.get(MediaScope::Region, "old-region").is_none());
        assert!(registrar.get(MediaScope::Token, "fresh").is_some());
    }

    #[test]
    fn records_inside_ttl_survive() {
        let mut registrar = MediaRegistrar::new(TTL);
        let ctx = CommandContext::default();
        registrar.apply_command(MediaScope::Token, "a", &play(), &ctx, 0);
        registrar.apply_command(MediaScope::Token, "b", &play(), &ctx, TTL.as_millis() as u64);
        assert!(registrar.store(MediaScope::Token).contains("a"));
        assert_eq!(registrar.store(MediaScope::Token).len(), 2);
    }

    #[test]
    fn reset_clears_everything() {
        let mut registrar = MediaRegistrar::new(TTL);
        let ctx = CommandContext::default();
        registrar.apply_command(MediaScope::Token, "a", &play(), &ctx, 0);
        registrar.apply_command(MediaScope::Region, "r", &play(), &ctx, 0);
        registrar.reset();
        assert!(registrar.store(MediaScope::Token).is_empty());
        assert!(registrar.store(MediaScope::Region).is_empty());
    }
}
