use thiserror::Error;

/// All errors produced by pcmdeck-core.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("could not open PCM source {path}: {source}")]
    SourceOpen {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid player config: {0}")]
    InvalidConfig(String),

    #[error("playback was cancelled")]
    Cancelled,

    #[error("player is already running")]
    AlreadyRunning,

    #[error("player is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
