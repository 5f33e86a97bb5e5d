//! Media state record: the reconstructible playback timeline of one target.

use serde::Serialize;

use crate::media::anchor::{pause_offset, play_anchor, position_at, seek_anchor};
use crate::protocol::{
    InitCommand, PauseCommand, PlayCommand, PlaylistItem, SeekCommand, VideoCommand,
    VideoStateReport,
};
use crate::protocol_constants::DEFAULT_VOLUME;

/// Lifecycle status of a playback target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    #[default]
    Idle,
    Ready,
    Playing,
    Paused,
    Ended,
}

impl MediaStatus {
    /// Parses a status reported by a client. Unrecognized states yield `None`.
    pub fn from_report(state: &str) -> Option<Self> {
        match state {
            "idle" => Some(Self::Idle),
            "ready" => Some(Self::Ready),
            "playing" => Some(Self::Playing),
            "paused" => Some(Self::Paused),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }

    /// `idle` and `ended` mean the player has nothing running.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Ended)
    }
}

/// Derived playback state. Position while playing is `now - started_at_epoch_ms`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub status: MediaStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at_epoch_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoclose: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_position_ms: Option<f64>,
}

/// Volume, mute and autoclose after fallback resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSettings {
    pub volume: f64,
    pub muted: bool,
    pub autoclose: bool,
}

impl PlaybackSettings {
    /// Resolves each setting: command value, then current state, then the
    /// stored init, then the defaults (full volume, unmuted, no autoclose).
    pub fn resolve(
        volume: Option<f64>,
        muted: Option<bool>,
        autoclose: Option<bool>,
        state: &PlaybackState,
        init: Option<&InitCommand>,
    ) -> Self {
        Self {
            volume: volume
                .or(state.volume)
                .or(init.map(|i| i.volume))
                .unwrap_or(DEFAULT_VOLUME),
            muted: muted
                .or(state.muted)
                .or(init.map(|i| i.muted))
                .unwrap_or(false),
            autoclose: autoclose
                .or(state.autoclose)
                .or(init.map(|i| i.autoclose))
                .unwrap_or(false),
        }
    }

    /// Settings currently in effect for a record.
    pub fn current(state: &PlaybackState, init: Option<&InitCommand>) -> Self {
        Self::resolve(None, None, None, state, init)
    }

    fn store_into(self, state: &mut PlaybackState) {
        state.volume = Some(self.volume);
        state.muted = Some(self.muted);
        state.autoclose = Some(self.autoclose);
    }
}

/// Pending preload hint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadHint {
    pub url: String,
    pub requested_at: u64,
}

/// Ordered playlist awaiting sequential playback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub items: Vec<PlaylistItem>,
    pub created_at: u64,
}

/// Status change produced by a client report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub previous: MediaStatus,
    pub current: MediaStatus,
}

impl StatusTransition {
    /// True when a running player just stopped (entered `ended` or `idle`).
    pub fn finished(self) -> bool {
        self.current.is_terminal() && !self.previous.is_terminal()
    }
}

/// Snapshot of one target's playback.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub init: Option<InitCommand>,
    pub state: PlaybackState,
    pub session_id: Option<serde_json::Value>,
    pub last_command: Option<VideoCommand>,
    pub last_update: u64,
    pub preload: Option<PreloadHint>,
    pub playlist: Option<Playlist>,
}

impl MediaRecord {
    /// Applies a command at instant `now` and returns it resolved, with every
    /// anchor and setting filled in.
    pub fn apply(&mut self, cmd: &VideoCommand, now: u64) -> VideoCommand {
        self.last_update = now;
        let resolved = match cmd {
            VideoCommand::Init(init) => VideoCommand::Init(self.apply_init(init, now)),
            VideoCommand::Play(play) => VideoCommand::Play(self.apply_play(play, now)),
            VideoCommand::Pause(pause) => VideoCommand::Pause(self.apply_pause(pause, now)),
            VideoCommand::Seek(seek) => VideoCommand::Seek(self.apply_seek(seek, now)),
            VideoCommand::Preload(preload) => {
                self.preload = Some(PreloadHint {
                    url: preload.url.clone(),
                    requested_at: now,
                });
                cmd.clone()
            }
            VideoCommand::PlaylistInit(playlist) => {
                self.playlist = Some(Playlist {
                    items: playlist.items.clone(),
                    created_at: now,
                });
                self.preload = None;
                cmd.clone()
            }
            // Deletion is the registrar's job; nothing to record here.
            VideoCommand::Close => VideoCommand::Close,
        };
        self.last_command = Some(resolved.clone());
        resolved
    }

    fn apply_init(&mut self, init: &InitCommand, now: u64) -> InitCommand {
        let start = init.start_at_epoch_ms.unwrap_or(now);
        let resolved = InitCommand {
            start_at_epoch_ms: Some(start),
            ..init.clone()
        };

        self.preload = None;
        self.playlist = None;
        self.state = PlaybackState {
            status: MediaStatus::Ready,
            started_at_epoch_ms: Some(start),
            paused_at_ms: None,
            volume: Some(resolved.volume),
            muted: Some(resolved.muted),
            autoclose: Some(resolved.autoclose),
            url: Some(resolved.url.clone()),
            reported_position_ms: None,
        };
        self.init = Some(InitCommand {
            resume: false,
            ..resolved.clone()
        });
        resolved
    }

    fn apply_play(&mut self, play: &PlayCommand, now: u64) -> PlayCommand {
        let settings = PlaybackSettings::resolve(
            play.volume,
            play.muted,
            play.autoclose,
            &self.state,
            self.init.as_ref(),
        );
        let anchor = play_anchor(play, &self.state, self.init.as_ref(), now);

        self.state.status = MediaStatus::Playing;
        self.state.started_at_epoch_ms = Some(anchor);
        self.state.paused_at_ms = None;
        if self.state.url.is_none() {
            self.state.url = self.init.as_ref().map(|i| i.url.clone());
        }
        settings.store_into(&mut self.state);

        PlayCommand {
            server_epoch_ms: Some(play.server_epoch_ms.unwrap_or(now)),
            at_ms: Some(position_at(anchor, now)),
            start_at_epoch_ms: Some(anchor),
            volume: Some(settings.volume),
            muted: Some(settings.muted),
            autoclose: Some(settings.autoclose),
        }
    }

    fn apply_pause(&mut self, pause: &PauseCommand, now: u64) -> PauseCommand {
        let settings = PlaybackSettings::resolve(
            pause.volume,
            pause.muted,
            pause.autoclose,
            &self.state,
            self.init.as_ref(),
        );
        let offset = pause_offset(pause.at_ms, &self.state, now);

        self.state.status = MediaStatus::Paused;
        self.state.paused_at_ms = Some(offset);
        settings.store_into(&mut self.state);

        PauseCommand {
            at_ms: Some(offset),
            volume: Some(settings.volume),
            muted: Some(settings.muted),
            autoclose: Some(settings.autoclose),
        }
    }

    fn apply_seek(&mut self, seek: &SeekCommand, now: u64) -> SeekCommand {
        let settings = PlaybackSettings::resolve(
            seek.volume,
            seek.muted,
            seek.autoclose,
            &self.state,
            self.init.as_ref(),
        );
        let to_ms = seek.to_ms.unwrap_or(0);
        let anchor = seek_anchor(to_ms, now);

        self.state.status = MediaStatus::Playing;
        self.state.started_at_epoch_ms = Some(anchor);
        self.state.paused_at_ms = None;
        settings.store_into(&mut self.state);

        SeekCommand {
            to_ms: Some(to_ms),
            start_at_epoch_ms: Some(anchor),
            volume: Some(settings.volume),
            muted: Some(settings.muted),
            autoclose: Some(settings.autoclose),
        }
    }

    /// Folds a client status report into the record.
    pub fn apply_report(&mut self, report: &VideoStateReport, now: u64) -> StatusTransition {
        let previous = self.state.status;
        self.last_update = now;
        if let Some(status) = report.state.as_deref().and_then(MediaStatus::from_report) {
            self.state.status = status;
        }
        if let Some(position) = report.position_ms.filter(|p| p.is_finite()) {
            self.state.reported_position_ms = Some(position);
        }
        StatusTransition {
            previous,
            current: self.state.status,
        }
    }

    /// Settings currently in effect.
    pub fn settings(&self) -> PlaybackSettings {
        PlaybackSettings::current(&self.state, self.init.as_ref())
    }

    /// Whether a finished playback should tear this record down.
    pub fn autoclose(&self) -> bool {
        self.settings().autoclose
    }

    /// Commands that bring a fresh player to this record's position at `now`:
    /// a resume INIT followed by PLAY or PAUSE. `None` without an init.
    pub fn resume_commands(&self, now: u64) -> Option<Vec<VideoCommand>> {
        let init = self.init.as_ref()?;
        let mut commands = vec![VideoCommand::Init(InitCommand {
            resume: true,
            ..init.clone()
        })];

        let settings = self.settings();
        match self.state.status {
            MediaStatus::Playing => {
                let anchor = self.state.started_at_epoch_ms.unwrap_or(now);
                commands.push(VideoCommand::Play(PlayCommand {
                    server_epoch_ms: Some(now),
                    at_ms: Some(position_at(anchor, now)),
                    start_at_epoch_ms: Some(anchor),
                    volume: Some(settings.volume),
                    muted: Some(settings.muted),
                    autoclose: Some(settings.autoclose),
                }));
            }
            MediaStatus::Paused => {
                commands.push(VideoCommand::Pause(PauseCommand {
                    at_ms: Some(self.state.paused_at_ms.unwrap_or(0)),
                    volume: Some(settings.volume),
                    muted: Some(settings.muted),
                    autoclose: Some(settings.autoclose),
                }));
            }
            _ => {}
        }
        Some(commands)
    }

    /// Position the record implies at `now`, if it has a running timeline.
    pub fn position_ms(&self, now: u64) -> Option<u64> {
        match self.state.status {
            MediaStatus::Playing => self.state.started_at_epoch_ms.map(|a| position_at(a, now)),
            MediaStatus::Paused => self.state.paused_at_ms,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PlaylistInitCommand, PreloadCommand};

    fn init_at(url: &str, start: Option<u64>) -> VideoCommand {
        let mut init = InitCommand::new(url);
        init.start_at_epoch_ms = start;
        init.volume = 0.5;
        VideoCommand::Init(init)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // INIT
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn init_sets_ready_without_playing() {
        let mut record = MediaRecord::default();
        let resolved = record.apply(&init_at("https://x/a.mp4", None), 5_000);

        assert_eq!(record.state.status, MediaStatus::Ready);
        assert_eq!(record.state.started_at_epoch_ms, Some(5_000));
        assert_eq!(record.state.volume, Some(0.5));
        assert_eq!(record.last_update, 5_000);
        match resolved {
            VideoCommand::Init(init) => assert_eq!(init.start_at_epoch_ms, Some(5_000)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn init_clears_side_channels_and_strips_resume() {
        let mut record = MediaRecord::default();
        record.apply(
            &VideoCommand::Preload(PreloadCommand {
                url: "https://x/next.mp4".into(),
                volume: None,
                muted: None,
            }),
            1,
        );
        let mut init = InitCommand::new("https://x/a.mp4");
        init.resume = true;
        let resolved = record.apply(&VideoCommand::Init(init), 2);

        assert!(record.preload.is_none());
        assert!(record.playlist.is_none());
        assert_eq!(record.init.as_ref().map(|i| i.resume), Some(false));
        assert!(matches!(resolved, VideoCommand::Init(ref i) if i.resume));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // PLAY / PAUSE / SEEK
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn play_after_init_inherits_settings() {
        let mut record = MediaRecord::default();
        record.apply(&init_at("https://x/a.mp4", Some(1_000_000)), 1_000_000);
        let resolved = record.apply(&VideoCommand::Play(PlayCommand::default()), 1_002_000);

        assert_eq!(record.state.status, MediaStatus::Playing);
        assert_eq!(record.state.url.as_deref(), Some("https://x/a.mp4"));
        match resolved {
            VideoCommand::Play(play) => {
                assert_eq!(play.at_ms, Some(2_000));
                assert_eq!(play.start_at_epoch_ms, Some(1_000_000));
                assert_eq!(play.volume, Some(0.5));
                assert_eq!(play.muted, Some(false));
                assert_eq!(play.server_epoch_ms, Some(1_002_000));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn command_settings_override_state() {
        let mut record = MediaRecord::default();
        record.apply(&init_at("u", Some(0)), 0);
        record.apply(
            &VideoCommand::Play(PlayCommand {
                volume: Some(0.2),
                muted: Some(true),
                autoclose: Some(true),
                ..Default::default()
            }),
            10,
        );
        assert_eq!(
            record.settings(),
            PlaybackSettings {
                volume: 0.2,
                muted: true,
                autoclose: true
            }
        );

        // later commands without settings keep the state values
        record.apply(&VideoCommand::Pause(PauseCommand::default()), 20);
        assert_eq!(record.state.volume, Some(0.2));
        assert!(record.autoclose());
    }

    #[test]
    fn pause_then_play_resumes_at_frozen_offset() {
        let mut record = MediaRecord::default();
        record.apply(&init_at("u", Some(10_000)), 10_000);
        record.apply(&VideoCommand::Play(PlayCommand::default()), 10_000);
        record.apply(&VideoCommand::Pause(PauseCommand::default()), 14_000);
        assert_eq!(record.state.paused_at_ms, Some(4_000));
        assert_eq!(record.position_ms(60_000), Some(4_000));

        record.apply(&VideoCommand::Play(PlayCommand::default()), 60_000);
        assert_eq!(record.position_ms(60_000), Some(4_000));
        assert_eq!(record.position_ms(61_000), Some(5_000));
    }

    #[test]
    fn seek_always_resumes_playback() {
        let mut record = MediaRecord::default();
        record.apply(&init_at("u", Some(0)), 0);
        record.apply(&VideoCommand::Pause(PauseCommand::default()), 100);
        let resolved = record.apply(
            &VideoCommand::Seek(SeekCommand {
                to_ms: Some(30_000),
                ..Default::default()
            }),
            50_000,
        );

        assert_eq!(record.state.status, MediaStatus::Playing);
        assert_eq!(record.state.paused_at_ms, None);
        assert_eq!(record.position_ms(50_000), Some(30_000));
        assert!(matches!(
            resolved,
            VideoCommand::Seek(SeekCommand { start_at_epoch_ms: Some(20_000), .. })
        ));
    }

    #[test]
    fn seek_without_target_goes_to_start() {
        let mut record = MediaRecord::default();
        record.apply(&VideoCommand::Seek(SeekCommand::default()), 9_000);
        assert_eq!(record.position_ms(9_000), Some(0));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Side channels
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn preload_does_not_touch_state() {
        let mut record = MediaRecord::default();
        record.apply(&init_at("u", Some(0)), 0);
        let before = record.state.clone();
        record.apply(
            &VideoCommand::Preload(PreloadCommand {
                url: "https://x/b.mp4".into(),
                volume: None,
                muted: None,
            }),
            500,
        );
        assert_eq!(record.state, before);
        assert_eq!(
            record.preload,
            Some(PreloadHint {
                url: "https://x/b.mp4".into(),
                requested_at: 500
            })
        );
    }

    #[test]
    fn playlist_replaces_preload() {
        let mut record = MediaRecord::default();
        record.apply(
            &VideoCommand::Preload(PreloadCommand {
                url: "p".into(),
                volume: None,
                muted: None,
            }),
            1,
        );
        record.apply(
            &VideoCommand::PlaylistInit(PlaylistInitCommand {
                items: vec![PlaylistItem {
                    url: "a".into(),
                    volume: None,
                    muted: None,
                    autoclose: None,
                    at_ms: Some(100),
                }],
            }),
            2,
        );
        assert!(record.preload.is_none());
        let playlist = record.playlist.as_ref().unwrap();
        assert_eq!(playlist.items.len(), 1);
        assert_eq!(playlist.created_at, 2);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reports and resume
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn report_transition_detects_finish_once() {
        let mut record = MediaRecord::default();
        record.apply(&init_at("u", Some(0)), 0);
        record.apply(&VideoCommand::Play(PlayCommand::default()), 0);

        let ended = VideoStateReport {
            state: Some("ended".into()),
            position_ms: Some(9_000.0),
            buffered_ms: None,
        };
        assert!(record.apply_report(&ended, 10).finished());
        assert_eq!(record.state.reported_position_ms, Some(9_000.0));
        assert!(!record.apply_report(&ended, 20).finished());
    }

    #[test]
    fn unknown_report_state_keeps_status() {
        let mut record = MediaRecord::default();
        record.apply(&VideoCommand::Play(PlayCommand::default()), 0);
        let transition = record.apply_report(
            &VideoStateReport {
                state: Some("buffering".into()),
                ..Default::default()
            },
            5,
        );
        assert_eq!(transition.current, MediaStatus::Playing);
        assert_eq!(record.last_update, 5);
    }

    #[test]
    fn resume_commands_follow_status() {
        let mut record = MediaRecord::default();
        assert!(record.resume_commands(0).is_none());

        record.apply(&init_at("u", Some(1_000)), 1_000);
        let ready = record.resume_commands(2_000).unwrap();
        assert_eq!(ready.len(), 1);

        record.apply(&VideoCommand::Play(PlayCommand::default()), 1_000);
        let playing = record.resume_commands(4_000).unwrap();
        assert!(matches!(&playing[0], VideoCommand::Init(i) if i.resume));
        assert!(matches!(&playing[1], VideoCommand::Play(p) if p.at_ms == Some(3_000)));

        record.apply(&VideoCommand::Pause(PauseCommand::default()), 5_000);
        let paused = record.resume_commands(9_000).unwrap();
        assert!(matches!(&paused[1], VideoCommand::Pause(p) if p.at_ms == Some(4_000)));
    }
}
