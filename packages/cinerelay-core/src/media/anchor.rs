//! Clock reconciliation between media positions and wall-clock anchors.
//!
//! A playing target is described by a single epoch anchor such that
//! `position(now) = now - anchor`. These functions are pure: the same command,
//! state and `now` always produce the same anchor.

use crate::media::record::{MediaStatus, PlaybackState};
use crate::protocol::{InitCommand, PlayCommand};

/// Position within the media at `now` for a target anchored at `anchor`.
///
/// Anchors in the future (scheduled starts) report position zero.
#[must_use]
pub fn position_at(anchor: u64, now: u64) -> u64 {
    now.saturating_sub(anchor)
}

/// Anchor that places the media at `position_ms` at instant `now`.
#[must_use]
pub fn anchor_for_position(position_ms: u64, now: u64) -> u64 {
    now.saturating_sub(position_ms)
}

/// Resolves the anchor for a PLAY command.
///
/// Priority: explicit `startAtEpochMs`, then `now - atMs`, then the current
/// state (a paused target resumes from its frozen offset, a ready or playing
/// target keeps its anchor), then `now`.
#[must_use]
pub fn play_anchor(
    cmd: &PlayCommand,
    state: &PlaybackState,
    init: Option<&InitCommand>,
    now: u64,
) -> u64 {
    if let Some(anchor) = cmd.start_at_epoch_ms {
        return anchor;
    }
    if let Some(at_ms) = cmd.at_ms {
        return anchor_for_position(at_ms, now);
    }

    let existing = state
        .started_at_epoch_ms
        .or_else(|| init.and_then(|i| i.start_at_epoch_ms));

    match state.status {
        MediaStatus::Paused => match state.paused_at_ms {
            Some(paused_at) => anchor_for_position(paused_at, now),
            None => existing.unwrap_or(now),
        },
        MediaStatus::Ready | MediaStatus::Playing => existing.unwrap_or(now),
        MediaStatus::Idle | MediaStatus::Ended => now,
    }
}

/// Resolves the frozen offset for a PAUSE command.
///
/// An explicit `atMs` wins; otherwise the offset is read off the running
/// anchor, or the existing frozen offset when already paused.
#[must_use]
pub fn pause_offset(at_ms: Option<u64>, state: &PlaybackState, now: u64) -> u64 {
    if let Some(at_ms) = at_ms {
        return at_ms;
    }
    let running = state.started_at_epoch_ms.map(|anchor| position_at(anchor, now));
    match state.status {
        MediaStatus::Playing | MediaStatus::Ready => running.unwrap_or(0),
        MediaStatus::Paused => state.paused_at_ms.or(running).unwrap_or(0),
        MediaStatus::Idle | MediaStatus::Ended => 0,
    }
}

/// Anchor for a SEEK to `to_ms`. Seeking always resumes playback.
#[must_use]
pub fn seek_anchor(to_ms: u64, now: u64) -> u64 {
    anchor_for_position(to_ms, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: MediaStatus) -> PlaybackState {
        PlaybackState {
            status,
            ..Default::default()
        }
    }

    #[test]
    fn explicit_anchor_wins_over_at_ms() {
        let cmd = PlayCommand {
            start_at_epoch_ms: Some(500),
            at_ms: Some(9_000),
            ..Default::default()
        };
        assert_eq!(play_anchor(&cmd, &state(MediaStatus::Idle), None, 10_000), 500);
    }

    #[test]
    fn at_ms_is_deterministic_for_same_instant() {
        let cmd = PlayCommand {
            at_ms: Some(2_500),
            ..Default::default()
        };
        let t0 = 1_000_000;
        let first = play_anchor(&cmd, &state(MediaStatus::Playing), None, t0);
        let second = play_anchor(&cmd, &state(MediaStatus::Paused), None, t0);
        assert_eq!(first, second);

        // derived position at any later instant t is t - (t0 - atMs)
        for t in [t0, t0 + 1, t0 + 42_000] {
            assert_eq!(position_at(first, t), t - (t0 - 2_500));
        }
    }

    #[test]
    fn paused_target_resumes_from_frozen_offset() {
        let mut s = state(MediaStatus::Paused);
        s.started_at_epoch_ms = Some(1_000);
        s.paused_at_ms = Some(4_000);
        let anchor = play_anchor(&PlayCommand::default(), &s, None, 50_000);
        assert_eq!(position_at(anchor, 50_000), 4_000);
    }

    #[test]
    fn ready_target_keeps_init_anchor() {
        let mut init = InitCommand::new("u");
        init.start_at_epoch_ms = Some(7_000);
        let anchor = play_anchor(&PlayCommand::default(), &state(MediaStatus::Ready), Some(&init), 9_000);
        assert_eq!(anchor, 7_000);
    }

    #[test]
    fn fresh_target_starts_now() {
        assert_eq!(
            play_anchor(&PlayCommand::default(), &state(MediaStatus::Idle), None, 123),
            123
        );
    }

    #[test]
    fn pause_offset_reads_running_anchor() {
        let mut s = state(MediaStatus::Playing);
        s.started_at_epoch_ms = Some(10_000);
        assert_eq!(pause_offset(None, &s, 13_500), 3_500);
        assert_eq!(pause_offset(Some(100), &s, 13_500), 100);
    }

    #[test]
    fn pause_while_paused_keeps_offset() {
        let mut s = state(MediaStatus::Paused);
        s.started_at_epoch_ms = Some(10_000);
        s.paused_at_ms = Some(2_000);
        assert_eq!(pause_offset(None, &s, 99_000), 2_000);
    }

    #[test]
    fn positions_never_go_negative() {
        assert_eq!(position_at(2_000, 1_000), 0);
        assert_eq!(anchor_for_position(5_000, 1_000), 0);
        assert_eq!(seek_anchor(1_500, 10_000), 8_500);
    }
}
