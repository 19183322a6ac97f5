//! MIDI event model shared by the delivery and render paths.

use midi_msg::{Channel, ChannelVoiceMsg, MidiMsg};
use std::time::Instant;

/// A single channel-voice message as delivered by an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    pub channel: Channel,
    pub msg: ChannelVoiceMsg,
}

impl MidiEvent {
    #[inline]
    pub fn new(channel: Channel, msg: ChannelVoiceMsg) -> Self {
        Self { channel, msg }
    }

    #[inline]
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::NoteOn { note, velocity },
        }
    }

    #[inline]
    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::NoteOff { note, velocity },
        }
    }

    #[inline]
    pub fn control_change(channel: u8, control: u8, value: u8) -> Self {
        Self {
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::ControlChange {
                control: midi_msg::ControlChange::CC { control, value },
            },
        }
    }

    #[inline]
    pub fn program_change(channel: u8, program: u8) -> Self {
        Self {
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::ProgramChange { program },
        }
    }

    #[inline]
    pub fn pitch_bend(channel: u8, bend: u16) -> Self {
        Self {
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::PitchBend { bend },
        }
    }

    #[inline]
    pub fn channel_pressure(channel: u8, pressure: u8) -> Self {
        Self {
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::ChannelPressure { pressure },
        }
    }

    #[inline]
    pub fn channel_num(&self) -> u8 {
        self.channel as u8
    }

    /// Note-on with velocity zero is note-off by convention.
    #[inline]
    pub fn is_note_on(&self) -> bool {
        matches!(self.msg, ChannelVoiceMsg::NoteOn { velocity, .. } if velocity > 0)
    }

    #[inline]
    pub fn is_note_off(&self) -> bool {
        matches!(
            self.msg,
            ChannelVoiceMsg::NoteOff { .. } | ChannelVoiceMsg::NoteOn { velocity: 0, .. }
        )
    }

    #[inline]
    pub fn note(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::NoteOn { note, .. }
            | ChannelVoiceMsg::NoteOff { note, .. }
            | ChannelVoiceMsg::PolyPressure { note, .. } => Some(note),
            _ => None,
        }
    }

    #[inline]
    pub fn velocity(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::NoteOn { velocity, .. }
            | ChannelVoiceMsg::NoteOff { velocity, .. } => Some(velocity),
            _ => None,
        }
    }

    #[inline]
    pub fn to_midi_msg(&self) -> MidiMsg {
        MidiMsg::ChannelVoice {
            channel: self.channel,
            msg: self.msg,
        }
    }

    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_midi_msg().to_midi()
    }

    /// Parses one channel-voice message from raw transport bytes.
    /// Non-channel-voice traffic (sysex, clocks) is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, midi_msg::ParseError> {
        let (msg, _len) = MidiMsg::from_midi(bytes)?;
        match msg {
            MidiMsg::ChannelVoice { channel, msg } => Ok(Self { channel, msg }),
            _ => Err(midi_msg::ParseError::Invalid(
                "expected a channel voice message",
            )),
        }
    }
}

/// An event stamped with the instant the transport delivered it. The render
/// path turns this into a frame offset within the buffer being produced.
#[derive(Clone, Copy, Debug)]
pub struct StampedEvent {
    pub at: Instant,
    pub event: MidiEvent,
}
