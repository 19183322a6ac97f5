//! Error types for the MIDI subsystem.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("MIDI endpoint not found: {0}")]
    PortNotFound(String),

    #[error("MIDI endpoint no longer valid: {0}")]
    PortInvalid(String),

    #[error("MIDI connect error: {0}")]
    Connect(String),

    #[error("MIDI init error: {0}")]
    Init(String),

    #[error("virtual destinations are not supported on this platform")]
    VirtualUnsupported,

    #[error("MIDI parse error: {0}")]
    Parse(String),
}

#[cfg(feature = "midi-io")]
impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::Init(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::Connect(e.to_string())
    }
}

impl From<midi_msg::ParseError> for Error {
    fn from(e: midi_msg::ParseError) -> Self {
        Error::Parse(format!("{:?}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
