//! Token validation for video sockets.
//!
//! The relay does not issue tokens; it asks a [`TokenValidator`] whether a
//! presented token is acceptable and which player it belongs to.

use async_trait::async_trait;

use crate::protocol_constants::{MIN_TOKEN_LEN, PLAYER_ID_TOKEN_PREFIX_LEN};
use crate::services::PlayerIdentity;
use crate::utils::non_blank;

/// Outcome of a successful validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedToken {
    /// Player the token belongs to, when the validator knows it.
    pub player_id: Option<String>,
}

/// Decides whether a token may open a video socket.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Returns `None` to reject the token.
    async fn validate(&self, token: &str) -> Option<ValidatedToken>;
}

/// Accepts any token of at least [`MIN_TOKEN_LEN`] characters and derives
/// `player-<first six characters>` as its player id.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixTokenValidator;

#[async_trait]
impl TokenValidator for PrefixTokenValidator {
    async fn validate(&self, token: &str) -> Option<ValidatedToken> {
        if token.chars().count() < MIN_TOKEN_LEN {
            return None;
        }
        let prefix: String = token.chars().take(PLAYER_ID_TOKEN_PREFIX_LEN).collect();
        Some(ValidatedToken {
            player_id: Some(format!("player-{prefix}")),
        })
    }
}

/// Builds the connection identity from the validator result and the
/// `playerUuid` / `playerName` hints on the socket URL.
///
/// The player id falls back to the uuid hint, then the name hint, then a
/// token-derived id.
pub fn resolve_identity(
    token: &str,
    validated: &ValidatedToken,
    uuid_hint: Option<&str>,
    name_hint: Option<&str>,
) -> PlayerIdentity {
    let uuid = non_blank(uuid_hint).map(str::to_string);
    let name = non_blank(name_hint).map(str::to_string);
    let player_id = non_blank(validated.player_id.as_deref())
        .map(str::to_string)
        .or_else(|| uuid.clone())
        .or_else(|| name.clone())
        .unwrap_or_else(|| {
            let prefix: String = token.chars().take(PLAYER_ID_TOKEN_PREFIX_LEN).collect();
            format!("player-{prefix}")
        });
    PlayerIdentity {
        player_id,
        player_uuid: uuid,
        player_name: name,
    }
}
