//! Region membership index.
//!
//! Maintains the bidirectional token <-> region mapping, the player-identity
//! override table and the display-name table. Region ids are canonical
//! (trimmed, lower-cased); the casing an operator typed survives only as a
//! display name.
//!
//! Invariant: `tokens_by_region[R]` contains `T` iff `region_by_token[T] == R`,
//! and no empty member set is ever kept.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::utils::non_blank;

/// Canonicalizes a region id. Blank input means "no region".
#[must_use]
pub fn canonical_region_id(value: &str) -> Option<String> {
    non_blank(Some(value)).map(str::to_lowercase)
}

// ─────────────────────────────────────────────────────────────────────────────
// Player Keys
// ─────────────────────────────────────────────────────────────────────────────

/// Which identity field a player key was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerKeyKind {
    Id,
    Uuid,
    Name,
}

impl PlayerKeyKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Uuid => "uuid",
            Self::Name => "name",
        }
    }
}

/// Canonical identity key, e.g. `uuid:0f3c...` or `name:steve`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerKey(String);

impl PlayerKey {
    /// Builds a key from a raw identity value. Blank values yield `None`.
    pub fn new(kind: PlayerKeyKind, value: &str) -> Option<Self> {
        non_blank(Some(value)).map(|v| Self(format!("{}:{}", kind.prefix(), v.to_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collects keys for whichever identity fields are present, in id, uuid,
/// name order. Duplicates are dropped.
pub fn collect_player_keys(
    player_id: Option<&str>,
    player_uuid: Option<&str>,
    player_name: Option<&str>,
) -> Vec<PlayerKey> {
    let mut keys: Vec<PlayerKey> = Vec::with_capacity(3);
    let candidates = [
        (PlayerKeyKind::Id, player_id),
        (PlayerKeyKind::Uuid, player_uuid),
        (PlayerKeyKind::Name, player_name),
    ];
    for (kind, value) in candidates {
        if let Some(key) = value.and_then(|v| PlayerKey::new(kind, v)) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

// ─────────────────────────────────────────────────────────────────────────────
// Index
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of moving a token between regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionAssignment {
    pub changed: bool,
    pub previous: Option<String>,
    pub region_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct RegionIndex {
    region_by_token: HashMap<String, String>,
    tokens_by_region: HashMap<String, BTreeSet<String>>,
    region_by_player_key: HashMap<PlayerKey, String>,
    display_names: HashMap<String, String>,
}

impl RegionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalizes `raw` and remembers a display name for it: `display`
    /// when given, otherwise the trimmed raw value.
    pub fn normalize(&mut self, raw: &str, display: Option<&str>) -> Option<String> {
        let canonical = canonical_region_id(raw)?;
        let shown = non_blank(display).or_else(|| non_blank(Some(raw)));
        if let Some(shown) = shown {
            self.display_names.insert(canonical.clone(), shown.to_string());
        }
        Some(canonical)
    }

    /// Last-write-wins display name update. Blank names are ignored.
    pub fn remember_display_name(&mut self, region_id: &str, display: &str) {
        if let Some(trimmed) = non_blank(Some(display)) {
            self.display_names
                .insert(region_id.to_string(), trimmed.to_string());
        }
    }

    pub fn has_display_name(&self, region_id: &str) -> bool {
        self.display_names.contains_key(region_id)
    }

    /// Display name for a region, falling back to its canonical id.
    pub fn display_name(&self, region_id: &str) -> String {
        self.display_names
            .get(region_id)
            .cloned()
            .unwrap_or_else(|| region_id.to_string())
    }

    /// Moves `token` into `region_id` (already canonical), or out of any
    /// region when `None`.
    pub fn assign_token(&mut self, token: &str, region_id: Option<&str>) -> RegionAssignment {
        let previous = self.region_by_token.get(token).cloned();
        let desired = region_id.map(str::to_string);

        if previous == desired {
            return RegionAssignment {
                changed: false,
                previous,
                region_id: desired,
            };
        }

        if let Some(prev) = &previous {
            if let Some(members) = self.tokens_by_region.get_mut(prev) {
                members.remove(token);
                if members.is_empty() {
                    self.tokens_by_region.remove(prev);
                }
            }
        }

        match &desired {
            Some(region) => {
                self.tokens_by_region
                    .entry(region.clone())
                    .or_default()
                    .insert(token.to_string());
                self.region_by_token
                    .insert(token.to_string(), region.clone());
            }
            None => {
                self.region_by_token.remove(token);
            }
        }

        RegionAssignment {
            changed: true,
            previous,
            region_id: desired,
        }
    }

    /// Sets or clears an identity-level override. Does not move live tokens.
    pub fn assign_player_key(&mut self, key: &PlayerKey, region_id: Option<&str>) {
        match region_id {
            Some(region) => {
                self.region_by_player_key
                    .insert(key.clone(), region.to_string());
            }
            None => {
                self.region_by_player_key.remove(key);
            }
        }
    }

    pub fn assign_player_keys(&mut self, keys: &[PlayerKey], region_id: Option<&str>) {
        for key in keys {
            self.assign_player_key(key, region_id);
        }
    }

    pub fn region_for_player_key(&self, key: &PlayerKey) -> Option<&str> {
        self.region_by_player_key.get(key).map(String::as_str)
    }

    pub fn region_for_token(&self, token: &str) -> Option<&str> {
        self.region_by_token.get(token).map(String::as_str)
    }

    /// Region a client should be in: the first identity override that
    /// matches `keys` (in order), else the token's current region.
    pub fn resolve_for_client(&self, token: &str, keys: &[PlayerKey]) -> Option<String> {
        keys.iter()
            .find_map(|key| self.region_for_player_key(key))
            .or_else(|| self.region_for_token(token))
            .map(str::to_string)
    }

    /// Member tokens of a region, in stable order.
    pub fn members(&self, region_id: &str) -> Vec<String> {
        self.tokens_by_region
            .get(region_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Regions that currently have members.
    pub fn populated_regions(&self) -> impl Iterator<Item = &String> {
        self.tokens_by_region.keys()
    }

    pub fn reset(&mut self) {
        self.region_by_token.clear();
        self.tokens_by_region.clear();
        self.region_by_player_key.clear();
        self.display_names.clear();
    }

    /// Verifies the token <-> region pairing. Used by tests.
    pub fn pairing_holds(&self) -> bool {
        let forward = self.region_by_token.iter().all(|(token, region)| {
            self.tokens_by_region
                .get(region)
                .is_some_and(|members| members.contains(token))
        });
        let backward = self.tokens_by_region.iter().all(|(region, members)| {
            !members.is_empty()
                && members
                    .iter()
                    .all(|t| self.region_by_token.get(t) == Some(region))
        });
        forward && backward
    }
}
