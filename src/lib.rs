//! # legato: bind live MIDI endpoints to a soundfont synthesizer
//!
//! An [`EndpointSynth`] routes every MIDI message a live endpoint delivers
//! into an exclusively-owned synthesis engine, continuously, until the
//! binding is closed. The endpoint is either an external source (a
//! connected keyboard, another application's output) or a client-owned
//! virtual destination other processes can send into.
//!
//! ## Quick start
//!
//! ```ignore
//! use legato::{find_source, EndpointSynth, InstrumentDescriptor};
//!
//! // Default General MIDI instrument:
//! let source = find_source("keyboard")?;
//! let mut synth = EndpointSynth::with_source(source)?;
//!
//! // Or pick a soundfont and preset, swappable while notes arrive:
//! synth.load_instrument(
//!     InstrumentDescriptor::soundfont("strings.sf2").with_preset(0, 48),
//! )?;
//!
//! synth.close()?;
//! ```
//!
//! ## Architecture
//!
//! - **legato-midi**: event model, lock-free delivery queues, endpoint
//!   subscriptions (midir).
//! - **legato-synth**: instrument descriptors, the sound-unit host
//!   (rustysynth soundfonts plus registered factories), and the engine
//!   split into a configuration handle and a realtime render head.
//! - **legato** (this crate): the endpoint binding and the cpal output
//!   driver (feature `audio-out`, default). Disable `audio-out` and use
//!   [`EndpointSynthBuilder::build_manual`] to pull the render head from
//!   your own audio callback.

pub use legato_midi as midi;
pub use legato_synth as synth;

mod error;
pub use error::{Error, Result};

mod binding;
pub use binding::EndpointSynth;

mod builder;
pub use builder::EndpointSynthBuilder;

#[cfg(feature = "audio-out")]
mod output;
#[cfg(feature = "audio-out")]
pub use output::AudioOutput;

pub use legato_midi::{
    find_source, list_sources, EndpointInfo, EndpointKind, EndpointRef, MidiEvent, SourceEndpoint,
};
pub use legato_synth::{
    EngineConfig, InstrumentDescriptor, PresetInfo, PresetRef, RenderHead, SynthEngine, UnitHost,
    UnitKind,
};

pub mod prelude {
    pub use crate::{
        EndpointSynth, EndpointSynthBuilder, EngineConfig, InstrumentDescriptor, PresetRef,
    };
    pub use legato_midi::{find_source, list_sources, MidiEvent, SourceEndpoint};
}
