//! Read-only views of hub state for admin queries and plugin hellos.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::media::record::{Playlist, PreloadHint};
use crate::media::{MediaRecord, MediaScope, MediaStatus, PlaybackState};
use crate::protocol::{InitCommand, VideoCommand};
use crate::services::relay_hub::HubState;

/// Playback a connection is currently carrying.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMedia {
    pub session_id: Option<serde_json::Value>,
    pub init: Option<InitCommand>,
    pub state: PlaybackState,
    pub last_update: u64,
}

impl ActiveMedia {
    fn from_record(record: &MediaRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            init: record.init.clone(),
            state: record.state.clone(),
            last_update: record.last_update,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub token: String,
    pub player_id: String,
    pub player_uuid: Option<String>,
    pub player_name: Option<String>,
    pub public_server_key: Option<String>,
    pub scope: Option<serde_json::Value>,
    pub region: Option<String>,
    pub region_display_name: Option<String>,
    pub connected_at: u64,
    pub last_seen: u64,
    pub idle_ms: u64,
    pub active_media: Option<ActiveMedia>,
}

/// Slim connection entry sent in `PLUGIN_HELLO`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConnection {
    pub token: String,
    pub player_id: String,
    pub player_uuid: Option<String>,
    pub player_name: Option<String>,
    pub region_id: Option<String>,
    pub region_display_name: Option<String>,
    pub connected_at: u64,
    pub last_seen: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionMember {
    pub token: String,
    pub player_id: Option<String>,
    pub player_uuid: Option<String>,
    pub player_name: Option<String>,
    pub connected: bool,
    pub last_seen: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionMedia {
    pub session_id: Option<serde_json::Value>,
    pub init: Option<InitCommand>,
    pub state: PlaybackState,
    pub last_update: u64,
    pub preload: Option<PreloadHint>,
    pub playlist: Option<Playlist>,
    pub last_command: Option<VideoCommand>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSnapshot {
    pub region_id: String,
    pub display_name: String,
    pub member_count: usize,
    pub members: Vec<RegionMember>,
    pub active_media: Option<RegionMedia>,
    pub last_update: Option<u64>,
}

impl HubState {
    pub(crate) fn connection_snapshots(&self, now: u64) -> Vec<ConnectionSnapshot> {
        self.connections
            .in_connect_order()
            .into_iter()
            .map(|conn| {
                let active_media = self
                    .media
                    .get(MediaScope::Token, &conn.token)
                    .filter(|record| record.state.status != MediaStatus::Idle)
                    .map(ActiveMedia::from_record);
                ConnectionSnapshot {
                    token: conn.token.clone(),
                    player_id: conn.identity.player_id.clone(),
                    player_uuid: conn.identity.player_uuid.clone(),
                    player_name: conn.identity.player_name.clone(),
                    public_server_key: conn.public_server_key.clone(),
                    scope: conn.scope.clone(),
                    region: conn.region.clone(),
                    region_display_name: conn.region_display_name.clone(),
                    connected_at: conn.connected_at,
                    last_seen: conn.last_seen,
                    idle_ms: now.saturating_sub(conn.last_seen),
                    active_media,
                }
            })
            .collect()
    }

    pub(crate) fn plugin_connections(&self) -> Vec<PluginConnection> {
        self.connections
            .in_connect_order()
            .into_iter()
            .map(|conn| PluginConnection {
                token: conn.token.clone(),
                player_id: conn.identity.player_id.clone(),
                player_uuid: conn.identity.player_uuid.clone(),
                player_name: conn.identity.player_name.clone(),
                region_id: conn.region.clone(),
                region_display_name: conn.region_display_name.clone(),
                connected_at: conn.connected_at,
                last_seen: conn.last_seen,
            })
            .collect()
    }

    /// Every region with members or a media record, sorted by id.
    pub(crate) fn region_snapshots(&self) -> Vec<RegionSnapshot> {
        let region_store = self.media.store(MediaScope::Region);
        let ids: BTreeSet<&String> = self
            .regions
            .populated_regions()
            .chain(region_store.keys())
            .collect();

        ids.into_iter()
            .map(|region_id| {
                let members: Vec<RegionMember> = self
                    .regions
                    .members(region_id)
                    .into_iter()
                    .map(|token| match self.connections.get(&token) {
                        Some(conn) => RegionMember {
                            player_id: Some(conn.identity.player_id.clone()),
                            player_uuid: conn.identity.player_uuid.clone(),
                            player_name: conn.identity.player_name.clone(),
                            connected: conn.is_open(),
                            last_seen: Some(conn.last_seen),
                            token,
                        },
                        None => RegionMember {
                            token,
                            player_id: None,
                            player_uuid: None,
                            player_name: None,
                            connected: false,
                            last_seen: None,
                        },
                    })
                    .collect();

                let record = region_store.get(region_id);
                RegionSnapshot {
                    region_id: region_id.clone(),
                    display_name: self.regions.display_name(region_id),
                    member_count: members.len(),
                    members,
                    active_media: record
                        .filter(|r| r.state.status != MediaStatus::Idle)
                        .map(|r| RegionMedia {
                            session_id: r.session_id.clone(),
                            init: r.init.clone(),
                            state: r.state.clone(),
                            last_update: r.last_update,
                            preload: r.preload.clone(),
                            playlist: r.playlist.clone(),
                            last_command: r.last_command.clone(),
                        }),
                    last_update: record.map(|r| r.last_update),
                }
            })
            .collect()
    }
}
