use crate::error::SkipwardenError;
use crate::model::PlaybackSnapshot;

/// Remote control of the user's playback, as far as skipwarden needs it.
pub trait Player {
    /// Returns `PlaybackSnapshot::Empty` if nothing is playing. An `Err` means that we don't
    /// know what is playing (network error, unexpected status, ...).
    fn current_item(&mut self) -> Result<PlaybackSnapshot, SkipwardenError>;

    /// Skips to the next item. Fire-and-forget: success only means that the command was
    /// accepted, playback may advance a bit later.
    fn skip(&mut self) -> Result<(), SkipwardenError>;
}
