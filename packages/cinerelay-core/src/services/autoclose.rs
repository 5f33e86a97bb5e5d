//! Autoclose coordinator.
//!
//! Folds client status reports into the token record and tears playback down
//! once it finishes: the token's own record when its autoclose flag is set,
//! and the whole region once no other member is still playing.

use crate::media::{CommandContext, MediaScope};
use crate::protocol::{VideoCommand, VideoStateReport};
use crate::services::relay_hub::HubState;

/// What a status report led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The token has no media record; the report was dropped.
    Ignored,
    /// Recorded without a terminal transition.
    Recorded,
    Finished {
        token_closed: bool,
        region_closed: Option<String>,
    },
}

impl HubState {
    pub(crate) fn handle_client_video_state(
        &mut self,
        token: &str,
        report: &VideoStateReport,
        now: u64,
    ) -> ReportOutcome {
        let Some(record) = self.media.get_mut(MediaScope::Token, token) else {
            return ReportOutcome::Ignored;
        };
        let transition = record.apply_report(report, now);
        if !transition.finished() {
            return ReportOutcome::Recorded;
        }
        let own_autoclose = record.autoclose();

        let token_closed = own_autoclose;
        if own_autoclose {
            self.media.apply_command(
                MediaScope::Token,
                token,
                &VideoCommand::Close,
                &CommandContext::default(),
                now,
            );
            log::info!("[Autoclose] Closed media for {}", token);
        }

        let region_closed = self
            .regions
            .region_for_token(token)
            .map(str::to_string)
            .filter(|region| {
                self.media
                    .get(MediaScope::Region, region)
                    .is_some_and(|record| record.autoclose())
            })
            .filter(|region| !self.other_members_active(region, token));

        if let Some(region) = &region_closed {
            log::info!("[Autoclose] All members of {} finished, closing region", region);
            self.send_to_region(region, &VideoCommand::Close, &CommandContext::default(), None, now);
        }

        ReportOutcome::Finished {
            token_closed,
            region_closed,
        }
    }

    /// Whether any other member of `region_id` still has unfinished media.
    fn other_members_active(&self, region_id: &str, token: &str) -> bool {
        self.regions
            .members(region_id)
            .iter()
            .filter(|member| member.as_str() != token)
            .any(|member| {
                self.media
                    .get(MediaScope::Token, member)
                    .is_some_and(|record| !record.state.status.is_terminal())
            })
    }
}
