//! Binding error taxonomy.
//!
//! Construction-time failures are final for that attempt: no
//! partially-usable binding is ever returned. The variants are the reason
//! codes; the messages carry the underlying transport/engine diagnostics.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The endpoint is missing, stale, or the transport itself is
    /// unavailable.
    #[error("endpoint invalid: {0}")]
    EndpointInvalid(String),

    /// The transport refused the subscription.
    #[error("subscription conflict: {0}")]
    SubscriptionConflict(String),

    /// The engine (or its audio output) could not be brought up.
    #[error("engine instantiation failed: {0}")]
    EngineInstantiation(String),

    /// The descriptor names a unit or preset that cannot be loaded.
    #[error("instrument load failed: {0}")]
    InstrumentLoad(String),

    /// The binding was already closed.
    #[error("binding already torn down")]
    AlreadyTornDown,
}

impl From<legato_midi::Error> for Error {
    fn from(e: legato_midi::Error) -> Self {
        use legato_midi::Error as Midi;
        match &e {
            Midi::PortNotFound(_) | Midi::PortInvalid(_) | Midi::Init(_) => {
                Error::EndpointInvalid(e.to_string())
            }
            Midi::VirtualUnsupported => Error::EndpointInvalid(e.to_string()),
            Midi::Connect(_) | Midi::Parse(_) => Error::SubscriptionConflict(e.to_string()),
        }
    }
}

impl From<legato_synth::Error> for Error {
    fn from(e: legato_synth::Error) -> Self {
        use legato_synth::Error as Synth;
        match &e {
            Synth::Instantiate(_) | Synth::SwapBacklog | Synth::InvalidConfig(_) => {
                Error::EngineInstantiation(e.to_string())
            }
            _ => Error::InstrumentLoad(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
