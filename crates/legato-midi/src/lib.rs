//! MIDI subsystem for the legato endpoint synthesizer.
//!
//! Event model, lock-free delivery queues, and endpoint subscriptions.
//!
//! Feature gate: `midi-io` (default) enables hardware and virtual endpoint
//! access via midir; without it only the event and queue types are built.

pub mod error;
pub use error::{Error, Result};

mod event;
pub use event::{MidiEvent, StampedEvent};

mod queue;
pub use queue::{event_queue, DropCounter, EventReceiver, EventSender};

mod endpoint;
pub use endpoint::{EndpointInfo, EndpointKind, EndpointRef, SourceEndpoint};

#[cfg(feature = "midi-io")]
pub use endpoint::{find_source, list_sources};

#[cfg(feature = "midi-io")]
mod subscription;
#[cfg(feature = "midi-io")]
pub use subscription::Subscription;

pub use midi_msg::{Channel, ChannelVoiceMsg, ControlChange};
