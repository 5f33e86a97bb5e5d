//! Targeting resolver and delivery.
//!
//! Turns a request's selector into a [`Target`], records the command against
//! the matching media store(s) and pushes the resolved command to the live
//! connection(s).

use serde::{Deserialize, Serialize};

use crate::media::{CommandContext, MediaScope};
use crate::protocol::VideoCommand;
use crate::services::connection_registry::PlayerSource;
use crate::services::region_index::canonical_region_id;
use crate::services::relay_hub::HubState;
use crate::utils::non_blank;

/// Selector fields shared by every admin command body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSelector {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub player_uuid: Option<String>,
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub region_display_name: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub region_label: Option<String>,
}

impl TargetSelector {
    /// Display name offered for a region target, falling back to the raw id.
    pub fn display_name(&self) -> Option<&str> {
        non_blank(self.region_display_name.as_deref())
            .or_else(|| non_blank(self.region_name.as_deref()))
            .or_else(|| non_blank(self.region_label.as_deref()))
            .or_else(|| non_blank(self.region_id.as_deref()))
    }
}

/// Where a command goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Token(String),
    Player { value: String, source: PlayerSource },
    /// Canonical region id.
    Region(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Token,
    Player,
    Region,
}

impl Target {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Token(_) => TargetKind::Token,
            Self::Player { .. } => TargetKind::Player,
            Self::Region(_) => TargetKind::Region,
        }
    }

    pub fn is_region(&self) -> bool {
        matches!(self, Self::Region(_))
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Resolves a selector. Region wins over token, token over player fields
/// (checked id, uuid, name).
pub fn resolve_target(selector: &TargetSelector) -> Option<Target> {
    if let Some(region) = selector.region_id.as_deref().and_then(canonical_region_id) {
        return Some(Target::Region(region));
    }
    if let Some(token) = present(&selector.token) {
        return Some(Target::Token(token.to_string()));
    }
    resolve_player(selector, present)
}

/// A token or player named by a membership request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerReference {
    Token(String),
    Player { value: String, source: PlayerSource },
}

/// Resolves a selector that may only name a token or a player (no regions).
/// Player fields must contain non-whitespace text.
pub fn resolve_player_reference(selector: &TargetSelector) -> Option<PlayerReference> {
    if let Some(token) = present(&selector.token) {
        return Some(PlayerReference::Token(token.to_string()));
    }
    match resolve_player(selector, |v| non_blank(v.as_deref()).and(v.as_deref()))? {
        Target::Player { value, source } => Some(PlayerReference::Player { value, source }),
        _ => None,
    }
}

fn resolve_player<'a>(
    selector: &'a TargetSelector,
    accept: impl Fn(&'a Option<String>) -> Option<&'a str>,
) -> Option<Target> {
    [
        (&selector.player_id, PlayerSource::PlayerId),
        (&selector.player_uuid, PlayerSource::PlayerUuid),
        (&selector.player_name, PlayerSource::PlayerName),
    ]
    .into_iter()
    .find_map(|(field, source)| {
        accept(field).map(|value| Target::Player {
            value: value.to_string(),
            source,
        })
    })
}

/// Result of delivering one command.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub delivered: bool,
    pub target: TargetKind,
    pub region_id: Option<String>,
    pub region_display_name: Option<String>,
}

impl HubState {
    /// Records `cmd` for `token` and pushes the resolved command if the token
    /// is connected. The record is updated even when it is not.
    pub(crate) fn send_to_token(
        &mut self,
        token: &str,
        cmd: &VideoCommand,
        context: &CommandContext,
        now: u64,
    ) -> bool {
        let resolved = self
            .media
            .apply_command(MediaScope::Token, token, cmd, context, now);
        self.connections.send(token, resolved.into())
    }

    /// Delivers to the first open connection matching `value`.
    pub(crate) fn send_to_player(
        &mut self,
        value: &str,
        cmd: &VideoCommand,
        context: &CommandContext,
        now: u64,
    ) -> bool {
        let Some(token) = self
            .connections
            .find_player(value)
            .map(|conn| conn.token.clone())
        else {
            log::debug!("[Dispatch] No live connection for player {}", value);
            return false;
        };
        self.send_to_token(&token, cmd, context, now)
    }

    /// Applies `cmd` once to the region record, then sends the same resolved
    /// command to every member so they share one anchor.
    pub(crate) fn send_to_region(
        &mut self,
        region_id: &str,
        cmd: &VideoCommand,
        context: &CommandContext,
        display_name: Option<&str>,
        now: u64,
    ) -> bool {
        match display_name {
            Some(display) => self.regions.remember_display_name(region_id, display),
            None if !self.regions.has_display_name(region_id) => {
                self.regions.remember_display_name(region_id, region_id)
            }
            None => {}
        }

        let resolved = self
            .media
            .apply_command(MediaScope::Region, region_id, cmd, context, now);

        let mut delivered = false;
        for member in self.regions.members(region_id) {
            delivered |= self.send_to_token(&member, &resolved, context, now);
        }
        log::debug!(
            "[Dispatch] {} -> region {} (delivered: {})",
            resolved.kind(),
            region_id,
            delivered
        );
        delivered
    }

    /// Routes `cmd` to `target` and reports the outcome.
    pub(crate) fn deliver(
        &mut self,
        target: &Target,
        cmd: &VideoCommand,
        context: &CommandContext,
        display_name: Option<&str>,
        now: u64,
    ) -> Delivery {
        let delivered = match target {
            Target::Token(token) => self.send_to_token(token, cmd, context, now),
            Target::Player { value, .. } => self.send_to_player(value, cmd, context, now),
            Target::Region(region) => self.send_to_region(region, cmd, context, display_name, now),
        };

        let (region_id, region_display_name) = match target {
            Target::Region(region) => (Some(region.clone()), Some(self.regions.display_name(region))),
            _ => (None, None),
        };

        Delivery {
            delivered,
            target: target.kind(),
            region_id,
            region_display_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> TargetSelector {
        TargetSelector::default()
    }

    #[test]
    fn region_beats_token_beats_player() {
        let sel = TargetSelector {
            token: Some("tok".into()),
            player_id: Some("p1".into()),
            region_id: Some(" Lobby ".into()),
            ..selector()
        };
        assert_eq!(resolve_target(&sel), Some(Target::Region("lobby".into())));

        let sel = TargetSelector {
            region_id: Some("   ".into()),
            ..sel
        };
        assert_eq!(resolve_target(&sel), Some(Target::Token("tok".into())));

        let sel = TargetSelector {
            token: None,
            ..sel
        };
        assert_eq!(
            resolve_target(&sel),
            Some(Target::Player {
                value: "p1".into(),
                source: PlayerSource::PlayerId
            })
        );
    }

    #[test]
    fn player_fields_checked_in_order() {
        let sel = TargetSelector {
            player_uuid: Some("U1".into()),
            player_name: Some("Alex".into()),
            ..selector()
        };
        assert_eq!(
            resolve_target(&sel),
            Some(Target::Player {
                value: "U1".into(),
                source: PlayerSource::PlayerUuid
            })
        );
    }

    #[test]
    fn empty_selector_has_no_target() {
        assert_eq!(resolve_target(&selector()), None);
        let sel = TargetSelector {
            token: Some(String::new()),
            ..selector()
        };
        assert_eq!(resolve_target(&sel), None);
    }

    #[test]
    fn player_reference_ignores_regions_and_blank_fields() {
        let sel = TargetSelector {
            region_id: Some("lobby".into()),
            player_id: Some("  ".into()),
            player_name: Some("Alex".into()),
            ..selector()
        };
        assert_eq!(
            resolve_player_reference(&sel),
            Some(PlayerReference::Player {
                value: "Alex".into(),
                source: PlayerSource::PlayerName
            })
        );
    }

    #[test]
    fn display_name_precedence() {
        let sel = TargetSelector {
            region_id: Some("lobby".into()),
            region_label: Some("Label".into()),
            region_name: Some("Name".into()),
            ..selector()
        };
        assert_eq!(sel.display_name(), Some("Name"));
        let sel = TargetSelector {
            region_id: Some("Lobby".into()),
            ..selector()
        };
        assert_eq!(sel.display_name(), Some("Lobby"));
    }
}
