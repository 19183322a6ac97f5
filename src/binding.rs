//! The endpoint binding: one endpoint's delivery stream driving one
//! exclusively-owned synthesis engine.

use crate::{Error, Result};
use legato_midi::{EndpointInfo, EventSender, MidiEvent, Subscription};
use legato_synth::{InstrumentDescriptor, PresetInfo, SynthEngine};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub(crate) enum Renderer {
    /// A cpal stream owns the render head and pulls it.
    #[cfg(feature = "audio-out")]
    Stream(crate::output::AudioOutput),
    /// The render head was handed to the caller at build time.
    Manual,
}

/// Plays incoming MIDI from one endpoint until closed.
///
/// Construction subscribes to the endpoint and loads the instrument; from
/// then on every delivered message is forwarded to the engine, unmodified
/// and in delivery order. [`close`](Self::close) (or drop) first
/// unsubscribes, synchronously, so no delivery callback can reach the
/// engine afterwards, then stops the audio output, then releases the
/// engine.
///
/// # Example
///
/// ```ignore
/// use legato::{find_source, EndpointSynth};
///
/// // Play a connected keyboard through the default General MIDI instrument.
/// let source = find_source("keyboard")?;
/// let mut synth = EndpointSynth::with_source(source)?;
/// std::thread::sleep(std::time::Duration::from_secs(30));
/// synth.close()?;
/// ```
pub struct EndpointSynth {
    pub(crate) info: EndpointInfo,
    pub(crate) subscription: Option<Subscription>,
    pub(crate) renderer: Option<Renderer>,
    pub(crate) engine: SynthEngine,
    pub(crate) parse_failures: Arc<AtomicU64>,
    pub(crate) closed: bool,
}

impl EndpointSynth {
    pub fn builder() -> crate::EndpointSynthBuilder {
        crate::EndpointSynthBuilder::default()
    }

    /// Plays `source` through the built-in General MIDI instrument.
    #[cfg(feature = "audio-out")]
    pub fn with_source(source: legato_midi::SourceEndpoint) -> Result<Self> {
        Self::builder().source(source).build()
    }

    /// Plays `source` through the given instrument.
    #[cfg(feature = "audio-out")]
    pub fn with_source_instrument(
        source: legato_midi::SourceEndpoint,
        instrument: InstrumentDescriptor,
    ) -> Result<Self> {
        Self::builder().source(source).instrument(instrument).build()
    }

    /// Creates a client-owned virtual destination named `name` and plays
    /// whatever other applications send to it, through the built-in General
    /// MIDI instrument.
    #[cfg(feature = "audio-out")]
    pub fn with_virtual_destination(name: impl Into<String>) -> Result<Self> {
        Self::builder().virtual_destination(name).build()
    }

    /// Virtual-destination variant with an explicit instrument.
    #[cfg(feature = "audio-out")]
    pub fn with_virtual_destination_instrument(
        name: impl Into<String>,
        instrument: InstrumentDescriptor,
    ) -> Result<Self> {
        Self::builder()
            .virtual_destination(name)
            .instrument(instrument)
            .build()
    }

    /// Identity of the bound endpoint.
    pub fn endpoint(&self) -> &EndpointInfo {
        &self.info
    }

    /// The most recently loaded instrument descriptor.
    pub fn instrument(&self) -> &InstrumentDescriptor {
        self.engine.instrument()
    }

    /// Loads a new instrument into the running engine.
    ///
    /// The swap takes effect at the next buffer boundary; messages keep
    /// flowing while the unit is prepared. Re-loading the active descriptor
    /// is a no-op, and on failure the active instrument keeps playing.
    pub fn load_instrument(&mut self, instrument: InstrumentDescriptor) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyTornDown);
        }
        self.engine.load(instrument).map_err(Error::from)
    }

    /// Lists the sound bank of `instrument` without loading it.
    pub fn presets(&self, instrument: &InstrumentDescriptor) -> Result<Vec<PresetInfo>> {
        self.engine.host().presets(instrument).map_err(Error::from)
    }

    /// True once the render path has applied every requested instrument
    /// swap.
    pub fn swap_settled(&self) -> bool {
        self.engine.swap_settled()
    }

    /// Events dropped because the delivery queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.engine.dropped_events()
    }

    /// Messages the endpoint delivered that were not parseable channel
    /// voice messages. Counted, never propagated; the delivery path stays
    /// fault-free.
    pub fn parse_failures(&self) -> u64 {
        self.parse_failures.load(Ordering::Relaxed)
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.engine.set_master_volume(volume);
    }

    pub fn master_volume(&self) -> f32 {
        self.engine.master_volume()
    }

    /// Tears the binding down.
    ///
    /// Unsubscribes first, synchronously, so once this returns the
    /// transport will never invoke the engine again; then stops the audio
    /// output, then releases the engine. Calling it twice returns
    /// [`Error::AlreadyTornDown`].
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyTornDown);
        }
        self.teardown();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn teardown(&mut self) {
        // Unsubscribe before anything else: the subscription close joins any
        // in-flight delivery callback, so from here on the engine is
        // unreachable from the transport.
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
        // Stop the render pull before the head's memory can go away.
        if let Some(renderer) = self.renderer.take() {
            drop(renderer);
        }
        self.closed = true;
        debug!("endpoint binding closed: {}", self.info);
    }
}

impl Drop for EndpointSynth {
    fn drop(&mut self) {
        if !self.closed {
            self.teardown();
        }
    }
}

impl std::fmt::Debug for EndpointSynth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSynth")
            .field("endpoint", &self.info)
            .field("instrument", self.engine.instrument())
            .field("closed", &self.closed)
            .finish()
    }
}

/// The delivery handler installed into the subscription callback: parse,
/// stamp, enqueue. Runs on the transport's delivery thread: overflow is
/// counted by the queue and malformed messages by `failures`; nothing here
/// blocks, allocates beyond the parse, or logs.
pub(crate) fn delivery_handler(
    mut sender: EventSender,
    failures: Arc<AtomicU64>,
) -> impl FnMut(&[u8]) + Send + 'static {
    move |bytes| match MidiEvent::from_bytes(bytes) {
        Ok(event) => {
            let _ = sender.send(event);
        }
        Err(_) => {
            failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legato_synth::{EngineConfig, SoundUnit, UnitFactory, UnitHost};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SentinelLog {
        events: Arc<Mutex<Vec<MidiEvent>>>,
    }

    struct SentinelUnit {
        log: SentinelLog,
    }

    impl SoundUnit for SentinelUnit {
        fn handle_event(&mut self, event: &MidiEvent) {
            self.log.events.lock().unwrap().push(*event);
        }
        fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
            left.fill(0.0);
            right.fill(0.0);
        }
        fn all_sound_off(&mut self) {}
    }

    struct SentinelFactory {
        log: SentinelLog,
    }

    impl UnitFactory for SentinelFactory {
        fn instantiate(
            &self,
            _descriptor: &InstrumentDescriptor,
            _sample_rate: u32,
        ) -> legato_synth::Result<Box<dyn SoundUnit>> {
            Ok(Box::new(SentinelUnit {
                log: self.log.clone(),
            }))
        }
    }

    fn sentinel_engine() -> (SynthEngine, legato_synth::RenderHead, SentinelLog) {
        let log = SentinelLog::default();
        let host = Arc::new(UnitHost::new());
        host.register("sentinel", Arc::new(SentinelFactory { log: log.clone() }));
        let (engine, head) = SynthEngine::new(
            host,
            InstrumentDescriptor::registered("sentinel", ""),
            EngineConfig::default(),
        )
        .unwrap();
        (engine, head, log)
    }

    fn render(head: &mut legato_synth::RenderHead) {
        let mut left = [0.0f32; 128];
        let mut right = [0.0f32; 128];
        head.render(&mut left, &mut right);
    }

    #[test]
    fn test_handler_parses_and_forwards_in_order() {
        let (mut engine, mut head, log) = sentinel_engine();
        let failures = Arc::new(AtomicU64::new(0));
        let mut handler = delivery_handler(engine.take_sender().unwrap(), failures.clone());

        // The transport delivers one message per callback, in order.
        handler(&[0x90, 60, 100]);
        handler(&[0x90, 64, 100]);
        handler(&[0x80, 60, 0]);
        render(&mut head);

        let events = log.events.lock().unwrap().clone();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], MidiEvent::note_on(0, 60, 100));
        assert_eq!(events[1], MidiEvent::note_on(0, 64, 100));
        assert!(events[2].is_note_off());
        assert_eq!(failures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_handler_counts_malformed_without_propagating() {
        let (mut engine, mut head, log) = sentinel_engine();
        let failures = Arc::new(AtomicU64::new(0));
        let mut handler = delivery_handler(engine.take_sender().unwrap(), failures.clone());

        handler(&[0xF8]); // timing clock: not channel voice
        handler(&[]); // empty packet
        handler(&[0x90, 72, 100]);
        render(&mut head);

        assert_eq!(failures.load(Ordering::Relaxed), 2);
        let events = log.events.lock().unwrap().clone();
        assert_eq!(events, vec![MidiEvent::note_on(0, 72, 100)]);
    }

    #[test]
    fn test_no_engine_calls_after_handler_dropped() {
        let (mut engine, mut head, log) = sentinel_engine();
        let failures = Arc::new(AtomicU64::new(0));
        let mut handler = delivery_handler(engine.take_sender().unwrap(), failures);

        handler(&[0x90, 60, 100]);
        render(&mut head);
        assert_eq!(log.events.lock().unwrap().len(), 1);

        // Closing the subscription drops the callback (and with it the
        // queue's producer); later renders must observe nothing new.
        drop(handler);
        render(&mut head);
        render(&mut head);
        assert_eq!(log.events.lock().unwrap().len(), 1);
    }
}
