//! SoundFont sound unit backed by rustysynth.

use crate::instrument::PresetRef;
use crate::unit::SoundUnit;
use crate::{Error, Result};
use legato_midi::{ChannelVoiceMsg, ControlChange, MidiEvent};
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use std::sync::Arc;

pub struct SoundFontUnit {
    synthesizer: Synthesizer,
    sample_rate: u32,
    preset: Option<PresetRef>,
}

impl SoundFontUnit {
    pub fn new(
        soundfont: Arc<SoundFont>,
        sample_rate: u32,
        preset: Option<PresetRef>,
    ) -> Result<Self> {
        let settings = SynthesizerSettings::new(sample_rate as i32);
        let synthesizer = Synthesizer::new(&soundfont, &settings)
            .map_err(|e| Error::Instantiate(e.to_string()))?;
        let mut unit = Self {
            synthesizer,
            sample_rate,
            preset,
        };
        unit.apply_preset();
        Ok(unit)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Selects the preset on every channel, so the chosen program sounds
    /// regardless of which channel the endpoint transmits on.
    fn apply_preset(&mut self) {
        if let Some(preset) = self.preset {
            let msb = ((preset.bank >> 7) & 0x7F) as i32;
            let lsb = (preset.bank & 0x7F) as i32;
            for channel in 0..16 {
                self.synthesizer.process_midi_message(channel, 0xB0, 0x00, msb);
                self.synthesizer.process_midi_message(channel, 0xB0, 0x20, lsb);
                self.synthesizer
                    .process_midi_message(channel, 0xC0, preset.program as i32, 0);
            }
        }
    }
}

impl SoundUnit for SoundFontUnit {
    fn handle_event(&mut self, event: &MidiEvent) {
        let channel = event.channel_num() as i32;
        match event.msg {
            ChannelVoiceMsg::NoteOn { note, velocity } => {
                if velocity > 0 {
                    self.synthesizer
                        .note_on(channel, note as i32, velocity as i32);
                } else {
                    self.synthesizer.note_off(channel, note as i32);
                }
            }
            ChannelVoiceMsg::NoteOff { note, .. } => {
                self.synthesizer.note_off(channel, note as i32);
            }
            ChannelVoiceMsg::ProgramChange { program } => {
                self.synthesizer
                    .process_midi_message(channel, 0xC0, program as i32, 0);
            }
            ChannelVoiceMsg::PitchBend { bend } => {
                let lsb = (bend & 0x7F) as i32;
                let msb = ((bend >> 7) & 0x7F) as i32;
                self.synthesizer.process_midi_message(channel, 0xE0, lsb, msb);
            }
            ChannelVoiceMsg::ControlChange {
                control: ControlChange::CC { control, value },
            } => {
                self.synthesizer
                    .process_midi_message(channel, 0xB0, control as i32, value as i32);
            }
            ChannelVoiceMsg::ChannelPressure { pressure } => {
                self.synthesizer
                    .process_midi_message(channel, 0xD0, pressure as i32, 0);
            }
            ChannelVoiceMsg::PolyPressure { note, pressure } => {
                self.synthesizer
                    .process_midi_message(channel, 0xA0, note as i32, pressure as i32);
            }
            _ => {}
        }
    }

    fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.synthesizer.render(left, right);
    }

    fn all_sound_off(&mut self) {
        self.synthesizer.note_off_all(true);
    }
}
