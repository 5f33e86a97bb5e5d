//! Playback state: clock reconciliation, media records and the command registrar.

pub mod anchor;
pub mod record;
pub mod registrar;

pub use record::{MediaRecord, MediaStatus, PlaybackSettings, PlaybackState};
pub use registrar::{CommandContext, MediaRegistrar, MediaScope, MediaStore};
