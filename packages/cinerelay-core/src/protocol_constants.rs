//! Fixed protocol constants shared by the relay and its clients.
//!
//! These values are part of the wire contract with the browser widget and the
//! game-server plugin; changing them breaks deployed clients.

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "cinerelay";

// ─────────────────────────────────────────────────────────────────────────────
// Media State
// ─────────────────────────────────────────────────────────────────────────────

/// Idle time after which a media record is pruned (seconds).
///
/// Pruning runs after each mutating command, not on a timer.
pub const DEFAULT_MEDIA_TTL_SECS: u64 = 15 * 60;

/// Default playback volume when neither command, state nor init provide one.
pub const DEFAULT_VOLUME: f64 = 1.0;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between server `PING` frames on video sockets (seconds).
///
/// Liveness only; pings are not used for clock-skew correction.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// Close code sent when a video socket presents an invalid token.
///
/// RFC 6455 "policy violation".
pub const POLICY_VIOLATION_CLOSE_CODE: u16 = 1008;

/// Close reason paired with [`POLICY_VIOLATION_CLOSE_CODE`].
pub const INVALID_TOKEN_REASON: &str = "invalid token";

/// Minimum token length accepted by the default token validator.
pub const MIN_TOKEN_LEN: usize = 3;

/// Number of token characters used to derive a fallback player id.
pub const PLAYER_ID_TOKEN_PREFIX_LEN: usize = 6;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Header carrying the admin shared secret.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Query parameters accepted for the plugin shared secret, in lookup order.
pub const PLUGIN_TOKEN_PARAMS: [&str; 3] = ["token", "key", "auth"];
