//! The synthesis engine, split along the thread boundary it straddles.
//!
//! [`SynthEngine`] stays with the owner on the configuration thread and may
//! allocate and do file I/O. [`RenderHead`] is pulled by the audio output
//! and never blocks, allocates, or logs. They share the delivery ring, a
//! bounded swap channel, a retire channel that ships replaced units back for
//! deallocation off the render thread, and a generation counter that makes
//! swap application observable (Release on apply, Acquire on read).
//!
//! Instrument swaps are applied only at a buffer boundary: a batch is
//! rendered entirely by one unit, never split between two.

use crate::instrument::InstrumentDescriptor;
use crate::unit::{SoundUnit, UnitHost};
use crate::{Error, Result};
use atomic_float::AtomicF32;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use legato_midi::{event_queue, DropCounter, EventReceiver, EventSender, MidiEvent, StampedEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Swap-queue depth. Each pending swap holds a boxed unit, so this stays
/// small; the retire queue is sized to cover every queued swap.
const SWAP_QUEUE: usize = 8;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Capacity of the delivery ring, in events.
    pub queue_capacity: usize,
    pub master_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            queue_capacity: 1024,
            master_volume: 1.0,
        }
    }
}

struct Swap {
    unit: Box<dyn SoundUnit>,
    generation: u64,
}

/// Configuration handle: owns instrument loading and the delivery-side
/// producer until a subscription takes it.
pub struct SynthEngine {
    host: Arc<UnitHost>,
    config: EngineConfig,
    instrument: InstrumentDescriptor,
    issued: u64,
    applied: Arc<AtomicU64>,
    volume: Arc<AtomicF32>,
    swaps: Sender<Swap>,
    retired: Receiver<Box<dyn SoundUnit>>,
    sender: Option<EventSender>,
    drops: DropCounter,
}

impl SynthEngine {
    /// Instantiates the initial unit synchronously. On failure nothing is
    /// constructed and no engine resources remain allocated.
    pub fn new(
        host: Arc<UnitHost>,
        instrument: InstrumentDescriptor,
        config: EngineConfig,
    ) -> Result<(Self, RenderHead)> {
        if config.sample_rate == 0 {
            return Err(Error::InvalidConfig("sample_rate must be nonzero".into()));
        }
        if config.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue_capacity must be nonzero".into(),
            ));
        }

        let unit = host.instantiate(&instrument, config.sample_rate)?;
        let (sender, receiver, drops) = event_queue(config.queue_capacity);
        let (swap_tx, swap_rx) = bounded(SWAP_QUEUE);
        let (retire_tx, retire_rx) = bounded(SWAP_QUEUE * 2);
        let applied = Arc::new(AtomicU64::new(0));
        let volume = Arc::new(AtomicF32::new(config.master_volume));

        let head = RenderHead {
            unit,
            events: receiver,
            swaps: swap_rx,
            retire: retire_tx,
            applied: applied.clone(),
            volume: volume.clone(),
            scratch: Vec::with_capacity(config.queue_capacity),
            sample_rate: config.sample_rate,
        };

        debug!(
            sample_rate = config.sample_rate,
            "synthesis engine ready: {:?}", instrument
        );

        Ok((
            Self {
                host,
                config,
                instrument,
                issued: 0,
                applied,
                volume,
                swaps: swap_tx,
                retired: retire_rx,
                sender: Some(sender),
                drops,
            },
            head,
        ))
    }

    /// Loads `instrument`, replacing the active unit at the next buffer
    /// boundary.
    ///
    /// Loading the descriptor that is already active is a no-op. On failure
    /// the active instrument is left untouched.
    pub fn load(&mut self, instrument: InstrumentDescriptor) -> Result<()> {
        if instrument == self.instrument {
            return Ok(());
        }
        self.collect_retired();
        let unit = self.host.instantiate(&instrument, self.config.sample_rate)?;
        let generation = self.issued + 1;
        match self.swaps.try_send(Swap { unit, generation }) {
            Ok(()) => {
                self.issued = generation;
                self.instrument = instrument;
                debug!(generation, "instrument swap queued: {:?}", self.instrument);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(Error::SwapBacklog),
            Err(TrySendError::Disconnected(_)) => {
                Err(Error::Instantiate("render head was dropped".into()))
            }
        }
    }

    /// The most recently loaded descriptor (the active one once
    /// [`swap_settled`](Self::swap_settled) reports true).
    pub fn instrument(&self) -> &InstrumentDescriptor {
        &self.instrument
    }

    /// True once the render path has applied every queued instrument swap.
    pub fn swap_settled(&self) -> bool {
        self.applied.load(Ordering::Acquire) == self.issued
    }

    /// Enqueues an event for the render path. Returns false if the queue is
    /// full or the sender was handed to a subscription.
    pub fn send_event(&mut self, event: MidiEvent) -> bool {
        match self.sender {
            Some(ref mut sender) => sender.send(event),
            None => false,
        }
    }

    /// Hands the delivery-side producer to a subscription callback. The
    /// queue is single-producer: once taken, [`send_event`](Self::send_event)
    /// stops accepting.
    pub fn take_sender(&mut self) -> Option<EventSender> {
        self.sender.take()
    }

    /// Events dropped on delivery-queue overflow.
    pub fn dropped_events(&self) -> u64 {
        self.drops.count()
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.volume.store(volume.clamp(0.0, 2.0), Ordering::Relaxed);
    }

    pub fn master_volume(&self) -> f32 {
        self.volume.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn host(&self) -> &Arc<UnitHost> {
        &self.host
    }

    /// Frees units the render path has replaced. Called opportunistically so
    /// their memory is reclaimed on this thread, never the render thread.
    fn collect_retired(&self) {
        while let Ok(unit) = self.retired.try_recv() {
            drop(unit);
        }
    }
}

impl Drop for SynthEngine {
    fn drop(&mut self) {
        self.collect_retired();
    }
}

impl std::fmt::Debug for SynthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthEngine")
            .field("instrument", &self.instrument)
            .field("sample_rate", &self.config.sample_rate)
            .field("settled", &self.swap_settled())
            .finish()
    }
}

/// Render-side half of the engine. Owned by whatever drives audio output:
/// the cpal stream in the default setup, or the embedder's own callback.
pub struct RenderHead {
    unit: Box<dyn SoundUnit>,
    events: EventReceiver,
    swaps: Receiver<Swap>,
    retire: Sender<Box<dyn SoundUnit>>,
    applied: Arc<AtomicU64>,
    volume: Arc<AtomicF32>,
    scratch: Vec<StampedEvent>,
    sample_rate: u32,
}

impl RenderHead {
    /// Renders one stereo buffer.
    ///
    /// Applies queued instrument swaps at the buffer start, then drains
    /// delivered events and renders segment-wise so each event takes effect
    /// on its arrival-aligned frame. Realtime-safe: no blocking, no
    /// allocation, no logging.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        let nframes = left.len().min(right.len());
        if nframes == 0 {
            return;
        }
        self.apply_swaps();

        let cycle_start = Instant::now();
        self.scratch.clear();
        self.events.drain_into(&mut self.scratch);

        let mut cursor = 0usize;
        for i in 0..self.scratch.len() {
            let stamped = self.scratch[i];
            let offset = self.frame_offset(&stamped, cycle_start, nframes);
            if offset > cursor {
                self.unit
                    .render(&mut left[cursor..offset], &mut right[cursor..offset]);
                cursor = offset;
            }
            self.unit.handle_event(&stamped.event);
        }
        if cursor < nframes {
            self.unit
                .render(&mut left[cursor..nframes], &mut right[cursor..nframes]);
        }

        let volume = self.volume.load(Ordering::Relaxed);
        if (volume - 1.0).abs() > f32::EPSILON {
            for sample in left[..nframes].iter_mut().chain(right[..nframes].iter_mut()) {
                *sample *= volume;
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// An event that arrived a full buffer period ago lands on frame 0; one
    /// that arrived just now lands at the end of this buffer.
    fn frame_offset(&self, stamped: &StampedEvent, cycle_start: Instant, nframes: usize) -> usize {
        let delta = cycle_start.saturating_duration_since(stamped.at);
        let samples_ago = (delta.as_secs_f64() * self.sample_rate as f64) as usize;
        nframes.saturating_sub(samples_ago).min(nframes - 1)
    }

    fn apply_swaps(&mut self) {
        while let Ok(swap) = self.swaps.try_recv() {
            let mut outgoing = std::mem::replace(&mut self.unit, swap.unit);
            outgoing.all_sound_off();
            // The retire queue covers every swap the bounded channel can
            // hold, so this push cannot fail while the engine is alive; if
            // the engine is gone the unit is freed here, off the hot path
            // anyway since nothing is rendering.
            let _ = self.retire.try_send(outgoing);
            self.applied.store(swap.generation, Ordering::Release);
        }
    }
}

impl std::fmt::Debug for RenderHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderHead")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
