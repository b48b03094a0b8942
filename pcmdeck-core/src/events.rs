//! Status events broadcast by [`Player`](crate::Player).

use serde::{Deserialize, Serialize};

/// Lifecycle state of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    /// Nothing is playing.
    Idle,
    /// Output is open and the reader is filling chunks.
    Playing,
    /// Input is exhausted; waiting for the callback to drain both chunks.
    Draining,
    /// Every byte of the input has been handed to the output.
    Finished,
    /// Playback was cancelled before the input was exhausted or drained.
    Stopped,
    /// A fatal error ended playback.
    Error,
}

impl PlaybackStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlaybackStatus::Finished | PlaybackStatus::Stopped | PlaybackStatus::Error
        )
    }
}

/// Emitted on every status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatusEvent {
    pub status: PlaybackStatus,
    /// Optional human-readable detail (error message, device name, ...).
    pub detail: Option<String>,
}
