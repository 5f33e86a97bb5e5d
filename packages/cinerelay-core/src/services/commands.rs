//! Admin command service.
//!
//! Validates request bodies, builds typed commands and routes them through the
//! hub. Shared by the admin HTTP routes and the plugin socket, so both answer
//! identically for the same body.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{RelayError, RelayResult};
use crate::media::CommandContext;
use crate::protocol::{
    InitCommand, PauseCommand, PlayCommand, PlaylistInitCommand, PlaylistItem, PreloadCommand,
    SeekCommand, VideoCommand,
};
use crate::protocol_constants::DEFAULT_VOLUME;
use crate::services::dispatch::{
    resolve_player_reference, resolve_target, Delivery, PlayerReference, Target, TargetKind,
    TargetSelector,
};
use crate::services::region_index::{collect_player_keys, PlayerKey};
use crate::services::relay_hub::RelayHub;
use crate::utils::{millis_from_f64, non_blank, offset_millis};

const MISSING_TARGET: &str = "token, playerId, playerUuid, playerName, or regionId required";
const MISSING_PLAYER: &str = "token, playerId, playerUuid, or playerName required";
const MISSING_REGION: &str = "region or regionId required";
const MISSING_URL: &str = "url required";
const MISSING_ITEMS: &str = "items array with at least one entry required";

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// Body returned by every playback command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResponse {
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,
    pub target: TargetKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_delivered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_delivered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl From<Delivery> for DeliveryResponse {
    fn from(delivery: Delivery) -> Self {
        Self {
            delivered: delivery.delivered,
            stage: None,
            target: delivery.target,
            region_id: delivery.region_id,
            region_display_name: delivery.region_display_name,
            init_delivered: None,
            play_delivered: None,
            count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedToken {
    pub token: String,
    pub changed: bool,
    pub region_id: Option<String>,
    pub previous_region_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRegionResponse {
    pub ok: bool,
    pub target: TargetKind,
    pub region_id: Option<String>,
    pub region_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_region_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_tokens: Option<Vec<AffectedToken>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

fn parse<T: DeserializeOwned>(body: &Value) -> RelayResult<T> {
    if !body.is_object() {
        return Err(RelayError::InvalidRequest(
            "request body must be a JSON object".into(),
        ));
    }
    Ok(serde_json::from_value(body.clone())?)
}

fn require_target(selector: &TargetSelector) -> RelayResult<Target> {
    resolve_target(selector).ok_or_else(|| RelayError::InvalidRequest(MISSING_TARGET.into()))
}

fn require_url(url: Option<String>) -> RelayResult<String> {
    url.filter(|u| !u.trim().is_empty())
        .ok_or_else(|| RelayError::InvalidRequest(MISSING_URL.into()))
}

/// Distinguishes an absent key from an explicit `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitRequest {
    #[serde(flatten)]
    target: TargetSelector,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    start_at_epoch_ms: Option<f64>,
    #[serde(default)]
    muted: Option<bool>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    autoclose: Option<bool>,
    #[serde(default)]
    session_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayRequest {
    #[serde(flatten)]
    target: TargetSelector,
    #[serde(default)]
    at_ms: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    muted: Option<bool>,
    #[serde(default)]
    autoclose: Option<bool>,
    #[serde(default)]
    session_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PauseRequest {
    #[serde(flatten)]
    target: TargetSelector,
    #[serde(default)]
    at_ms: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    muted: Option<bool>,
    #[serde(default)]
    autoclose: Option<bool>,
    #[serde(default)]
    session_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeekRequest {
    #[serde(flatten)]
    target: TargetSelector,
    #[serde(default)]
    to_ms: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    muted: Option<bool>,
    #[serde(default)]
    autoclose: Option<bool>,
    #[serde(default)]
    session_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseRequest {
    #[serde(flatten)]
    target: TargetSelector,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayInstantRequest {
    #[serde(flatten)]
    target: TargetSelector,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    start_at_epoch_ms: Option<f64>,
    #[serde(default)]
    start_offset_ms: Option<f64>,
    #[serde(default)]
    muted: Option<bool>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    autoclose: Option<bool>,
    #[serde(default)]
    session_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreloadRequest {
    #[serde(flatten)]
    target: TargetSelector,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    muted: Option<bool>,
    #[serde(default)]
    session_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistRequest {
    #[serde(flatten)]
    target: TargetSelector,
    #[serde(default)]
    items: Option<Value>,
    #[serde(default)]
    session_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetRegionRequest {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    player_id: Option<String>,
    #[serde(default)]
    player_uuid: Option<String>,
    #[serde(default)]
    player_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    region: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    region_id: Option<Option<String>>,
    #[serde(default)]
    region_display_name: Option<String>,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default)]
    region_label: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback Commands
// ─────────────────────────────────────────────────────────────────────────────

fn send(
    hub: &RelayHub,
    selector: &TargetSelector,
    cmd: VideoCommand,
    context: CommandContext,
) -> RelayResult<DeliveryResponse> {
    let target = require_target(selector)?;
    let delivery = hub.deliver(&target, &cmd, &context, selector.display_name());
    log::info!(
        "[Admin] {} -> {:?} (delivered: {})",
        cmd.kind(),
        target,
        delivery.delivered
    );
    Ok(delivery.into())
}

pub fn init(hub: &RelayHub, body: &Value) -> RelayResult<DeliveryResponse> {
    let req: InitRequest = parse(body)?;
    require_target(&req.target)?;
    let cmd = InitCommand {
        url: require_url(req.url)?,
        start_at_epoch_ms: req.start_at_epoch_ms.and_then(millis_from_f64),
        muted: req.muted.unwrap_or(false),
        volume: req.volume.unwrap_or(DEFAULT_VOLUME),
        autoclose: req.autoclose.unwrap_or(false),
        resume: false,
    };
    send(
        hub,
        &req.target,
        VideoCommand::Init(cmd),
        CommandContext::with_session(req.session_id),
    )
}

pub fn play(hub: &RelayHub, body: &Value) -> RelayResult<DeliveryResponse> {
    let req: PlayRequest = parse(body)?;
    let cmd = PlayCommand {
        server_epoch_ms: Some(hub.now_ms()),
        at_ms: req.at_ms.and_then(millis_from_f64),
        start_at_epoch_ms: None,
        volume: req.volume,
        muted: req.muted,
        autoclose: req.autoclose,
    };
    send(
        hub,
        &req.target,
        VideoCommand::Play(cmd),
        CommandContext::with_session(req.session_id),
    )
}

pub fn pause(hub: &RelayHub, body: &Value) -> RelayResult<DeliveryResponse> {
    let req: PauseRequest = parse(body)?;
    let cmd = PauseCommand {
        at_ms: req.at_ms.and_then(millis_from_f64),
        volume: req.volume,
        muted: req.muted,
        autoclose: req.autoclose,
    };
    send(
        hub,
        &req.target,
        VideoCommand::Pause(cmd),
        CommandContext::with_session(req.session_id),
    )
}

pub fn seek(hub: &RelayHub, body: &Value) -> RelayResult<DeliveryResponse> {
    let req: SeekRequest = parse(body)?;
    let cmd = SeekCommand {
        to_ms: req.to_ms.and_then(millis_from_f64),
        start_at_epoch_ms: None,
        volume: req.volume,
        muted: req.muted,
        autoclose: req.autoclose,
    };
    send(
        hub,
        &req.target,
        VideoCommand::Seek(cmd),
        CommandContext::with_session(req.session_id),
    )
}

pub fn close(hub: &RelayHub, body: &Value) -> RelayResult<DeliveryResponse> {
    let req: CloseRequest = parse(body)?;
    send(hub, &req.target, VideoCommand::Close, CommandContext::default())
}

/// INIT followed immediately by PLAY from the start.
///
/// PLAY is skipped when INIT reached nobody, except for regions: a region
/// record must still become playing so later joiners start at the right
/// offset.
pub fn play_instant(hub: &RelayHub, body: &Value) -> RelayResult<DeliveryResponse> {
    let req: PlayInstantRequest = parse(body)?;
    let target = require_target(&req.target)?;
    let url = require_url(req.url)?;
    let display_name = req.target.display_name();
    let muted = req.muted.unwrap_or(false);
    let volume = req.volume.unwrap_or(DEFAULT_VOLUME);
    let context = CommandContext::with_session(req.session_id);

    let response = hub.transact(|state, now| {
        let base = req.start_at_epoch_ms.and_then(millis_from_f64).unwrap_or(now);
        let start = offset_millis(base, req.start_offset_ms.unwrap_or(0.0));

        let init = VideoCommand::Init(InitCommand {
            url,
            start_at_epoch_ms: Some(start),
            muted,
            volume,
            autoclose: req.autoclose.unwrap_or(false),
            resume: false,
        });
        let init_delivery = state.deliver(&target, &init, &context, display_name, now);
        let init_delivered = init_delivery.delivered;

        let play_delivered = if init_delivered || target.is_region() {
            let play = VideoCommand::Play(PlayCommand {
                server_epoch_ms: Some(now),
                at_ms: None,
                start_at_epoch_ms: Some(start),
                volume: Some(volume),
                muted: Some(muted),
                autoclose: req.autoclose,
            });
            Some(state.deliver(&target, &play, &CommandContext::default(), display_name, now).delivered)
        } else {
            None
        };

        let stage = match play_delivered {
            Some(true) => "play",
            _ if init_delivered => "init",
            Some(false) if target.is_region() => "play",
            _ => "init",
        };

        let mut response = DeliveryResponse::from(init_delivery);
        response.delivered = init_delivered && play_delivered.unwrap_or(false);
        response.stage = Some(stage);
        if target.is_region() {
            response.init_delivered = Some(init_delivered);
            response.play_delivered = Some(play_delivered.unwrap_or(false));
        }
        response
    });

    log::info!(
        "[Admin] play-instant -> {:?} (stage: {:?}, delivered: {})",
        target,
        response.stage,
        response.delivered
    );
    Ok(response)
}

pub fn preload(hub: &RelayHub, body: &Value) -> RelayResult<DeliveryResponse> {
    let req: PreloadRequest = parse(body)?;
    require_target(&req.target)?;
    let cmd = PreloadCommand {
        url: require_url(req.url)?,
        volume: req.volume,
        muted: req.muted,
    };
    send(
        hub,
        &req.target,
        VideoCommand::Preload(cmd),
        CommandContext::with_session(req.session_id),
    )
}

/// Keeps entries that carry a non-blank url string; other fields are taken
/// only when they have the right JSON type.
fn playlist_items(items: Option<&Value>) -> Vec<PlaylistItem> {
    let Some(entries) = items.and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|item| {
            let url = item
                .get("url")
                .and_then(Value::as_str)
                .filter(|u| !u.trim().is_empty())?;
            Some(PlaylistItem {
                url: url.to_string(),
                volume: item.get("volume").and_then(Value::as_f64),
                muted: item.get("muted").and_then(Value::as_bool),
                autoclose: item.get("autoclose").and_then(Value::as_bool),
                at_ms: item
                    .get("atMs")
                    .and_then(Value::as_f64)
                    .and_then(millis_from_f64),
            })
        })
        .collect()
}

pub fn initialize_playlist(hub: &RelayHub, body: &Value) -> RelayResult<DeliveryResponse> {
    let req: PlaylistRequest = parse(body)?;
    require_target(&req.target)?;
    let items = playlist_items(req.items.as_ref());
    if items.is_empty() {
        return Err(RelayError::InvalidRequest(MISSING_ITEMS.into()));
    }
    let count = items.len();
    let mut response = send(
        hub,
        &req.target,
        VideoCommand::PlaylistInit(PlaylistInitCommand { items }),
        CommandContext::with_session(req.session_id),
    )?;
    response.count = Some(count);
    Ok(response)
}

// ─────────────────────────────────────────────────────────────────────────────
// Membership
// ─────────────────────────────────────────────────────────────────────────────

/// Moves a token, or every live token of a player, into a region (or out of
/// all regions), recording identity overrides so the player returns there
/// after reconnecting.
pub fn set_region(hub: &RelayHub, body: &Value) -> RelayResult<SetRegionResponse> {
    let req: SetRegionRequest = parse(body)?;
    let selector = TargetSelector {
        token: req.token.clone(),
        player_id: req.player_id.clone(),
        player_uuid: req.player_uuid.clone(),
        player_name: req.player_name.clone(),
        ..TargetSelector::default()
    };
    let reference = resolve_player_reference(&selector)
        .ok_or_else(|| RelayError::InvalidRequest(MISSING_PLAYER.into()))?;
    let raw_region = req
        .region
        .or(req.region_id)
        .ok_or_else(|| RelayError::InvalidRequest(MISSING_REGION.into()))?;
    let player_key = match &reference {
        PlayerReference::Player { value, source } => Some(
            PlayerKey::new(source.key_kind(), value)
                .ok_or_else(|| RelayError::InvalidRequest(MISSING_PLAYER.into()))?,
        ),
        PlayerReference::Token(_) => None,
    };
    let display = non_blank(req.region_display_name.as_deref())
        .or_else(|| non_blank(req.region_name.as_deref()))
        .or_else(|| non_blank(req.region_label.as_deref()));
    let body_keys = collect_player_keys(
        req.player_id.as_deref(),
        req.player_uuid.as_deref(),
        req.player_name.as_deref(),
    );

    let response = hub.transact(|state, now| {
        let region_id = raw_region
            .as_deref()
            .and_then(|raw| state.regions.normalize(raw, display));
        let region = region_id.as_deref();
        let region_display_name = region.map(|r| state.regions.display_name(r));

        match reference {
            PlayerReference::Token(token) => {
                let live_keys = state
                    .connections
                    .get(&token)
                    .map(|conn| conn.identity.player_keys());
                let assignment = state.assign_region_for_token(&token, region, None);
                if let Some(keys) = live_keys {
                    state.regions.assign_player_keys(&keys, region);
                    state.follow_assignment(&token, &assignment, now);
                }
                SetRegionResponse {
                    ok: true,
                    target: TargetKind::Token,
                    region_id: assignment.region_id,
                    region_display_name,
                    changed: Some(assignment.changed),
                    previous_region_id: Some(assignment.previous),
                    player_key: None,
                    affected_tokens: None,
                }
            }
            PlayerReference::Player { value, source } => {
                if let Some(key) = &player_key {
                    state.regions.assign_player_key(key, region);
                }
                state.regions.assign_player_keys(&body_keys, region);

                let mut affected = Vec::new();
                for token in state.connections.tokens_for_player(&value, source) {
                    let assignment = state.assign_region_for_token(&token, region, None);
                    state.follow_assignment(&token, &assignment, now);
                    affected.push(AffectedToken {
                        token,
                        changed: assignment.changed,
                        region_id: assignment.region_id,
                        previous_region_id: assignment.previous,
                    });
                }
                SetRegionResponse {
                    ok: true,
                    target: TargetKind::Player,
                    region_id,
                    region_display_name,
                    changed: None,
                    previous_region_id: None,
                    player_key: player_key.map(|k| k.to_string()),
                    affected_tokens: Some(affected),
                }
            }
        }
    });

    log::info!(
        "[Admin] set-region {:?} -> {:?}",
        response.target,
        response.region_id
    );
    Ok(response)
}

// ─────────────────────────────────────────────────────────────────────────────
// Command Table
// ─────────────────────────────────────────────────────────────────────────────

/// Every operation reachable from the admin surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    SetRegion,
    Init,
    Play,
    Pause,
    Seek,
    Close,
    PlayInstant,
    Preload,
    InitializePlaylist,
}

impl AdminCommand {
    /// Maps an upper-cased plugin message type to a command.
    pub fn from_plugin_type(kind: &str) -> Option<Self> {
        match kind {
            "SET_REGION" => Some(Self::SetRegion),
            "VIDEO_INIT" => Some(Self::Init),
            "VIDEO_PLAY" => Some(Self::Play),
            "VIDEO_PAUSE" => Some(Self::Pause),
            "VIDEO_SEEK" => Some(Self::Seek),
            "VIDEO_CLOSE" => Some(Self::Close),
            "VIDEO_PLAY_INSTANT" => Some(Self::PlayInstant),
            "VIDEO_PRELOAD" => Some(Self::Preload),
            "VIDEO_PLAYLIST_INIT" | "VIDEO_INITIALIZE_PLAYLIST" => Some(Self::InitializePlaylist),
            _ => None,
        }
    }

    /// Runs the command and serializes its response body.
    pub fn execute(self, hub: &RelayHub, body: &Value) -> RelayResult<Value> {
        let value = match self {
            Self::SetRegion => serde_json::to_value(set_region(hub, body)?),
            Self::Init => serde_json::to_value(init(hub, body)?),
            Self::Play => serde_json::to_value(play(hub, body)?),
            Self::Pause => serde_json::to_value(pause(hub, body)?),
            Self::Seek => serde_json::to_value(seek(hub, body)?),
            Self::Close => serde_json::to_value(close(hub, body)?),
            Self::PlayInstant => serde_json::to_value(play_instant(hub, body)?),
            Self::Preload => serde_json::to_value(preload(hub, body)?),
            Self::InitializePlaylist => serde_json::to_value(initialize_playlist(hub, body)?),
        };
        value.map_err(|e| RelayError::Internal(format!("failed to encode response: {e}")))
    }
}
