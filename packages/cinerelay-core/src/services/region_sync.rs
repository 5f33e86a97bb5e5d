//! Media follow-up for membership changes.
//!
//! When a token enters a region it is brought to the region's playback
//! position; when it leaves every region it is told to close.

use crate::media::{CommandContext, MediaScope};
use crate::protocol::{IdentityPatch, VideoCommand};
use crate::services::region_index::RegionAssignment;
use crate::services::relay_hub::HubState;
use crate::utils::non_blank;

impl HubState {
    /// Moves `token` into `region_id` (canonical) or out of every region, and
    /// mirrors the result onto the live connection, if any.
    pub(crate) fn assign_region_for_token(
        &mut self,
        token: &str,
        region_id: Option<&str>,
        display_name: Option<&str>,
    ) -> RegionAssignment {
        if let (Some(region), Some(display)) = (region_id, display_name) {
            self.regions.remember_display_name(region, display);
        }
        let assignment = self.regions.assign_token(token, region_id);
        let shown = assignment
            .region_id
            .as_deref()
            .map(|region| self.regions.display_name(region));
        self.connections
            .set_region(token, assignment.region_id.as_deref(), shown);

        if assignment.changed {
            log::info!(
                "[Regions] {} moved {:?} -> {:?}",
                token,
                assignment.previous,
                assignment.region_id
            );
        }
        assignment
    }

    /// Pushes whatever a changed assignment implies: the new region's media,
    /// or CLOSE when the token left its last region.
    pub(crate) fn follow_assignment(&mut self, token: &str, assignment: &RegionAssignment, now: u64) {
        if !assignment.changed {
            return;
        }
        match (&assignment.region_id, &assignment.previous) {
            (Some(region), _) => {
                self.sync_region_media_to_token(token, region, now);
            }
            (None, Some(_)) => {
                self.send_to_token(token, &VideoCommand::Close, &CommandContext::default(), now);
            }
            (None, None) => {}
        }
    }

    /// Re-evaluates which region a connected client belongs in and applies it.
    pub(crate) fn apply_region_for_client(&mut self, token: &str, now: u64) -> Option<String> {
        let keys = self
            .connections
            .get(token)
            .map(|conn| conn.identity.player_keys())
            .unwrap_or_default();
        let desired = self.regions.resolve_for_client(token, &keys);
        let assignment = self.assign_region_for_token(token, desired.as_deref(), None);
        self.follow_assignment(token, &assignment, now);
        assignment.region_id
    }

    /// Brings `token` to the region's current media. Sends CLOSE if the
    /// region has nothing initialized.
    pub(crate) fn sync_region_media_to_token(&mut self, token: &str, region_id: &str, now: u64) -> bool {
        let resume = self
            .media
            .get(MediaScope::Region, region_id)
            .and_then(|record| {
                record.resume_commands(now).map(|commands| {
                    (commands, CommandContext::with_session(record.session_id.clone()))
                })
            });

        let Some((commands, context)) = resume else {
            log::debug!("[Regions] {} has no media, closing {}", region_id, token);
            self.send_to_token(token, &VideoCommand::Close, &CommandContext::default(), now);
            return false;
        };

        for cmd in &commands {
            self.send_to_token(token, cmd, &context, now);
        }
        true
    }

    /// Replays the token's own record to a reconnecting socket.
    pub(crate) fn resume_token_media(&mut self, token: &str, now: u64) -> bool {
        let Some(commands) = self
            .media
            .get(MediaScope::Token, token)
            .and_then(|record| record.resume_commands(now))
        else {
            return false;
        };

        let Some(conn) = self.connections.get(token) else {
            return false;
        };
        log::info!("[Regions] Resuming media for reconnected token {}", token);
        // Already recorded; replay without touching the record.
        for cmd in commands {
            conn.send(cmd.into());
        }
        true
    }

    /// Merges announced identity fields into the connection, then re-checks
    /// the client's region.
    pub(crate) fn update_client_identity(&mut self, token: &str, patch: &IdentityPatch, now: u64) {
        let Some(conn) = self.connections.get_mut(token) else {
            return;
        };

        if let Some(name) = non_blank(patch.player_name.as_deref()) {
            conn.identity.player_name = Some(name.to_string());
        }
        if let Some(uuid) = non_blank(patch.player_uuid.as_deref()) {
            conn.identity.player_uuid = Some(uuid.to_string());
        }
        if let Some(key) = non_blank(patch.public_server_key.as_deref()) {
            conn.public_server_key = Some(key.to_string());
        }
        if let Some(scope) = patch.scope.as_ref().filter(|s| !s.is_null()) {
            conn.scope = Some(scope.clone());
        }

        // Only ids announced in this patch replace the current one.
        let derived = non_blank(patch.player_id.as_deref())
            .or_else(|| non_blank(patch.player_uuid.as_deref()))
            .or_else(|| non_blank(patch.player_name.as_deref()))
            .map(str::to_string);
        if let Some(id) = derived {
            conn.identity.player_id = id;
        }
        conn.last_seen = now;

        self.apply_region_for_client(token, now);
    }
}
