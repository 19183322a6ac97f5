//! Error types for legato-synth.

use thiserror::Error;

/// Result type alias for legato-synth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SoundFont error: {0}")]
    SoundFont(String),

    #[error("no General MIDI soundfont found (set LEGATO_SOUNDFONT or install one)")]
    NoDefaultSoundFont,

    #[error("unknown unit factory: {0}")]
    UnknownFactory(String),

    #[error("unit instantiation failed: {0}")]
    Instantiate(String),

    #[error("instrument swap queue is full (render path is not draining)")]
    SwapBacklog,

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
