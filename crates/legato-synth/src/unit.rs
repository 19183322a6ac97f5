//! Sound-unit contract and the host that instantiates units from
//! descriptors.

use crate::instrument::{resolve_general_midi, InstrumentDescriptor, UnitKind};
use crate::soundfont::SoundFontUnit;
use crate::{Error, Result};
use dashmap::DashMap;
use legato_midi::MidiEvent;
use rustysynth::SoundFont;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Render-thread contract for an instantiated sound-generating unit.
///
/// Every method is called from the render path; implementations must not
/// block, allocate, or log.
pub trait SoundUnit: Send {
    fn handle_event(&mut self, event: &MidiEvent);

    /// Renders `left.len()` frames of stereo audio. Both slices have the
    /// same length.
    fn render(&mut self, left: &mut [f32], right: &mut [f32]);

    /// Silences all sounding voices immediately, skipping release tails.
    fn all_sound_off(&mut self);
}

impl std::fmt::Debug for dyn SoundUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SoundUnit")
    }
}

/// Instantiates units for descriptors routed to a registered factory.
pub trait UnitFactory: Send + Sync {
    fn instantiate(
        &self,
        descriptor: &InstrumentDescriptor,
        sample_rate: u32,
    ) -> Result<Box<dyn SoundUnit>>;
}

/// One entry in a unit's sound bank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresetInfo {
    pub name: String,
    pub bank: i32,
    pub program: i32,
}

/// Resolves descriptors to live units.
///
/// Parsed soundfonts are cached by path so reloading an instrument from the
/// same file never re-reads it; file I/O happens outside any lock.
pub struct UnitHost {
    soundfonts: DashMap<PathBuf, Arc<SoundFont>>,
    factories: DashMap<String, Arc<dyn UnitFactory>>,
}

impl UnitHost {
    pub fn new() -> Self {
        Self {
            soundfonts: DashMap::new(),
            factories: DashMap::new(),
        }
    }

    /// Registers a factory for [`UnitKind::Registered`] descriptors,
    /// replacing any factory of the same name.
    pub fn register(&self, name: impl Into<String>, factory: Arc<dyn UnitFactory>) {
        let name = name.into();
        debug!("registered unit factory: {}", name);
        self.factories.insert(name, factory);
    }

    /// Builds a unit for `descriptor`, applying its preset reference.
    pub fn instantiate(
        &self,
        descriptor: &InstrumentDescriptor,
        sample_rate: u32,
    ) -> Result<Box<dyn SoundUnit>> {
        match &descriptor.unit {
            UnitKind::Registered { factory, .. } => {
                let factory = self
                    .factories
                    .get(factory)
                    .ok_or_else(|| Error::UnknownFactory(factory.clone()))?;
                factory.instantiate(descriptor, sample_rate)
            }
            kind => {
                let path = self.soundfont_path(kind)?;
                let soundfont = self.load_soundfont(&path)?;
                let unit = SoundFontUnit::new(soundfont, sample_rate, descriptor.preset)?;
                Ok(Box::new(unit))
            }
        }
    }

    /// Lists the sound bank behind `descriptor`. Registered units expose no
    /// bank, so the listing is empty for them.
    pub fn presets(&self, descriptor: &InstrumentDescriptor) -> Result<Vec<PresetInfo>> {
        match &descriptor.unit {
            UnitKind::Registered { .. } => Ok(Vec::new()),
            kind => {
                let path = self.soundfont_path(kind)?;
                let soundfont = self.load_soundfont(&path)?;
                Ok(soundfont
                    .get_presets()
                    .iter()
                    .map(|preset| PresetInfo {
                        name: preset.get_name().to_string(),
                        bank: preset.get_bank_number(),
                        program: preset.get_patch_number(),
                    })
                    .collect())
            }
        }
    }

    fn soundfont_path(&self, kind: &UnitKind) -> Result<PathBuf> {
        match kind {
            UnitKind::GeneralMidi => resolve_general_midi().ok_or(Error::NoDefaultSoundFont),
            UnitKind::SoundFont { path } => Ok(path.clone()),
            UnitKind::Registered { .. } => unreachable!("registered units have no soundfont path"),
        }
    }

    fn load_soundfont(&self, path: &Path) -> Result<Arc<SoundFont>> {
        if let Some(soundfont) = self.soundfonts.get(path) {
            return Ok(soundfont.clone());
        }
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let soundfont = Arc::new(SoundFont::new(&mut reader).map_err(|e| {
            Error::SoundFont(format!("failed to parse '{}': {}", path.display(), e))
        })?);
        debug!("loaded soundfont: {}", path.display());
        self.soundfonts.insert(path.to_path_buf(), soundfont.clone());
        Ok(soundfont)
    }
}

impl Default for UnitHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UnitHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitHost")
            .field("cached_soundfonts", &self.soundfonts.len())
            .field("factories", &self.factories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullUnit;

    impl SoundUnit for NullUnit {
        fn handle_event(&mut self, _event: &MidiEvent) {}
        fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
            left.fill(0.0);
            right.fill(0.0);
        }
        fn all_sound_off(&mut self) {}
    }

    struct NullFactory;

    impl UnitFactory for NullFactory {
        fn instantiate(
            &self,
            _descriptor: &InstrumentDescriptor,
            _sample_rate: u32,
        ) -> Result<Box<dyn SoundUnit>> {
            Ok(Box::new(NullUnit))
        }
    }

    #[test]
    fn test_unknown_factory() {
        let host = UnitHost::new();
        let descriptor = InstrumentDescriptor::registered("missing", "");
        let err = host.instantiate(&descriptor, 44100).unwrap_err();
        assert!(matches!(err, Error::UnknownFactory(name) if name == "missing"));
    }

    #[test]
    fn test_registered_factory_roundtrip() {
        let host = UnitHost::new();
        host.register("null", Arc::new(NullFactory));
        let descriptor = InstrumentDescriptor::registered("null", "");
        assert!(host.instantiate(&descriptor, 44100).is_ok());
        // Registered units expose no bank.
        assert!(host.presets(&descriptor).unwrap().is_empty());
    }

    #[test]
    fn test_missing_soundfont_file() {
        let host = UnitHost::new();
        let descriptor = InstrumentDescriptor::soundfont("/nonexistent/missing.sf2");
        assert!(matches!(
            host.instantiate(&descriptor, 44100),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_general_midi_listing() {
        let host = UnitHost::new();
        let descriptor = InstrumentDescriptor::general_midi();
        match host.presets(&descriptor) {
            Ok(presets) => assert!(!presets.is_empty(), "GM bank should list presets"),
            Err(Error::NoDefaultSoundFont) => {
                eprintln!("Skipping: no General MIDI soundfont installed");
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}
