//! Synthesis subsystem for the legato endpoint synthesizer.
//!
//! Instrument descriptors, the sound-unit host (soundfonts via rustysynth,
//! plus registered custom factories), and the engine that turns delivered
//! MIDI events into audio.

pub mod error;
pub use error::{Error, Result};

mod instrument;
pub use instrument::{
    resolve_general_midi, InstrumentDescriptor, PresetRef, UnitKind, GM_SOUNDFONT_ENV,
    GM_SOUNDFONT_PATHS,
};

mod unit;
pub use unit::{PresetInfo, SoundUnit, UnitFactory, UnitHost};

mod soundfont;
pub use soundfont::SoundFontUnit;

mod engine;
pub use engine::{EngineConfig, RenderHead, SynthEngine};
