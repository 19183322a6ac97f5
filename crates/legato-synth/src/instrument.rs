//! Instrument descriptors: which sound unit to instantiate and which preset
//! to select in its bank. Descriptors are immutable values; changing
//! instruments means building a new descriptor and loading it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding General MIDI soundfont discovery.
pub const GM_SOUNDFONT_ENV: &str = "LEGATO_SOUNDFONT";

/// Well-known locations for a General MIDI soundfont, probed in order.
pub const GM_SOUNDFONT_PATHS: &[&str] = &[
    "/usr/share/sounds/sf2/FluidR3_GM.sf2",
    "/usr/share/sounds/sf2/TimGM6mb.sf2",
    "/usr/share/sounds/sf2/default-GM.sf2",
    "/usr/share/soundfonts/default.sf2",
    "/usr/share/soundfonts/FluidR3_GM.sf2",
    "/usr/local/share/soundfonts/default.sf2",
];

/// Which sound-generating unit to instantiate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    /// The built-in general-purpose unit: a General MIDI soundfont resolved
    /// from [`GM_SOUNDFONT_ENV`], then [`GM_SOUNDFONT_PATHS`].
    GeneralMidi,
    /// An explicit soundfont file.
    SoundFont { path: PathBuf },
    /// A unit produced by a factory registered on the host; `config` is an
    /// opaque string interpreted by that factory.
    Registered { factory: String, config: String },
}

/// A named-preset reference into the unit's sound bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetRef {
    pub bank: u16,
    pub program: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentDescriptor {
    pub unit: UnitKind,
    pub preset: Option<PresetRef>,
}

impl InstrumentDescriptor {
    /// The built-in default: General MIDI, no preset override.
    pub fn general_midi() -> Self {
        Self {
            unit: UnitKind::GeneralMidi,
            preset: None,
        }
    }

    pub fn soundfont(path: impl Into<PathBuf>) -> Self {
        Self {
            unit: UnitKind::SoundFont { path: path.into() },
            preset: None,
        }
    }

    pub fn registered(factory: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            unit: UnitKind::Registered {
                factory: factory.into(),
                config: config.into(),
            },
            preset: None,
        }
    }

    pub fn with_preset(mut self, bank: u16, program: u8) -> Self {
        self.preset = Some(PresetRef { bank, program });
        self
    }
}

impl Default for InstrumentDescriptor {
    fn default() -> Self {
        Self::general_midi()
    }
}

/// Resolves the General MIDI soundfont for [`UnitKind::GeneralMidi`]:
/// the [`GM_SOUNDFONT_ENV`] override first, then the first existing entry
/// of [`GM_SOUNDFONT_PATHS`].
pub fn resolve_general_midi() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(GM_SOUNDFONT_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }
    GM_SOUNDFONT_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_general_midi() {
        let descriptor = InstrumentDescriptor::default();
        assert_eq!(descriptor.unit, UnitKind::GeneralMidi);
        assert!(descriptor.preset.is_none());
    }

    #[test]
    fn test_with_preset() {
        let descriptor = InstrumentDescriptor::general_midi().with_preset(0, 24);
        assert_eq!(
            descriptor.preset,
            Some(PresetRef {
                bank: 0,
                program: 24
            })
        );
    }

    #[test]
    fn test_descriptor_equality_drives_idempotence() {
        let a = InstrumentDescriptor::soundfont("/tmp/a.sf2").with_preset(0, 5);
        let b = InstrumentDescriptor::soundfont("/tmp/a.sf2").with_preset(0, 5);
        let c = InstrumentDescriptor::soundfont("/tmp/a.sf2").with_preset(0, 6);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_serde_round_trip() {
        let descriptor = InstrumentDescriptor::soundfont("/tmp/strings.sf2").with_preset(1, 48);
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: InstrumentDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
    }
}
