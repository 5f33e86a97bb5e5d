//! Wire messages exchanged with the browser playback widget.
//!
//! Server-to-client frames are either playback commands ([`VideoCommand`],
//! `VIDEO_*` types) or control frames ([`ControlMessage`]). Both serialize as
//! flat JSON objects discriminated by a `type` field.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::DEFAULT_VOLUME;

fn default_volume() -> f64 {
    DEFAULT_VOLUME
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback Commands
// ─────────────────────────────────────────────────────────────────────────────

/// A playback command, as relayed to clients and recorded in media state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VideoCommand {
    #[serde(rename = "VIDEO_INIT")]
    Init(InitCommand),
    #[serde(rename = "VIDEO_PLAY")]
    Play(PlayCommand),
    #[serde(rename = "VIDEO_PAUSE")]
    Pause(PauseCommand),
    #[serde(rename = "VIDEO_SEEK")]
    Seek(SeekCommand),
    #[serde(rename = "VIDEO_CLOSE")]
    Close,
    #[serde(rename = "VIDEO_PRELOAD")]
    Preload(PreloadCommand),
    #[serde(rename = "VIDEO_PLAYLIST_INIT")]
    PlaylistInit(PlaylistInitCommand),
}

impl VideoCommand {
    /// Wire name of the command, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "VIDEO_INIT",
            Self::Play(_) => "VIDEO_PLAY",
            Self::Pause(_) => "VIDEO_PAUSE",
            Self::Seek(_) => "VIDEO_SEEK",
            Self::Close => "VIDEO_CLOSE",
            Self::Preload(_) => "VIDEO_PRELOAD",
            Self::PlaylistInit(_) => "VIDEO_PLAYLIST_INIT",
        }
    }
}

/// Full initialization of a player: source and start settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitCommand {
    pub url: String,
    /// Epoch instant playback is anchored at. Filled with `now` when recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at_epoch_ms: Option<u64>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub autoclose: bool,
    /// Set on replays so the client keeps its player instead of starting fresh.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resume: bool,
}

impl InitCommand {
    /// Creates an init for `url` with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            start_at_epoch_ms: None,
            muted: false,
            volume: DEFAULT_VOLUME,
            autoclose: false,
            resume: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoclose: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoclose: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoclose: Option<bool>,
}

/// Side-channel hint to start buffering a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadCommand {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInitCommand {
    pub items: Vec<PlaylistItem>,
}

/// One source in a playlist, played in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoclose: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Frames
// ─────────────────────────────────────────────────────────────────────────────

/// Connection-level frames that never touch media state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ControlMessage {
    HelloAck {
        server_epoch_ms: u64,
        player_id: String,
        player_name: Option<String>,
        player_uuid: Option<String>,
    },
    Ping {
        t: u64,
    },
}

/// Any frame pushed to a video client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Video(VideoCommand),
    Control(ControlMessage),
}

impl ServerMessage {
    /// Returns the playback command carried by this frame, if any.
    pub fn as_video(&self) -> Option<&VideoCommand> {
        match self {
            Self::Video(cmd) => Some(cmd),
            Self::Control(_) => None,
        }
    }
}

impl From<VideoCommand> for ServerMessage {
    fn from(cmd: VideoCommand) -> Self {
        Self::Video(cmd)
    }
}

impl From<ControlMessage> for ServerMessage {
    fn from(msg: ControlMessage) -> Self {
        Self::Control(msg)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client Frames
// ─────────────────────────────────────────────────────────────────────────────

/// Frames sent by the browser widget.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    Pong,
    VideoState(VideoStateReport),
    Hello(IdentityPatch),
    IdentityUpdate(IdentityPatch),
    /// Forward compatibility: unrecognized types are ignored.
    #[serde(other)]
    Unknown,
}

/// Client-reported player status.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStateReport {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub position_ms: Option<f64>,
    #[serde(default)]
    pub buffered_ms: Option<f64>,
}

/// Identity fields a client may announce after connecting.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPatch {
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub player_uuid: Option<String>,
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub public_server_key: Option<String>,
    #[serde(default)]
    pub scope: Option<serde_json::Value>,
}
