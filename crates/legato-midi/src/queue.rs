//! Lock-free hand-off from the delivery callback to the render path.
//!
//! One SPSC ring per binding: the producer half moves into the transport's
//! delivery callback, the consumer half into the render head. Overflow drops
//! the event and bumps a shared counter; nothing on either side blocks,
//! allocates, or logs.

use crate::event::{MidiEvent, StampedEvent};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared count of events dropped on queue overflow. Readable from any
/// thread; incremented only by the producer.
#[derive(Clone, Debug, Default)]
pub struct DropCounter(Arc<AtomicU64>);

impl DropCounter {
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Producer half. Single producer: exactly one thread may push at a time
/// (the type is `Send` but not `Clone`, so ownership enforces this).
pub struct EventSender {
    producer: ringbuf::HeapProd<StampedEvent>,
    dropped: DropCounter,
}

impl EventSender {
    /// Stamps the event with the current instant and enqueues it.
    /// Returns false (and counts the drop) when the queue is full.
    #[inline]
    pub fn send(&mut self, event: MidiEvent) -> bool {
        self.send_at(Instant::now(), event)
    }

    #[inline]
    pub fn send_at(&mut self, at: Instant, event: MidiEvent) -> bool {
        match self.producer.try_push(StampedEvent { at, event }) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.bump();
                false
            }
        }
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("dropped", &self.dropped.count())
            .finish()
    }
}

/// Consumer half, drained once per render cycle.
pub struct EventReceiver {
    consumer: ringbuf::HeapCons<StampedEvent>,
}

impl EventReceiver {
    /// Pops events into `buf` up to its remaining capacity, preserving
    /// delivery order. Bounded by capacity so the render path never
    /// reallocates; size `buf` to the queue capacity.
    #[inline]
    pub fn drain_into(&mut self, buf: &mut Vec<StampedEvent>) {
        while buf.len() < buf.capacity() {
            match self.consumer.try_pop() {
                Some(stamped) => buf.push(stamped),
                None => break,
            }
        }
    }
}

impl std::fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver").finish()
    }
}

/// Creates a delivery queue holding up to `capacity` events.
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver, DropCounter) {
    let rb = HeapRb::<StampedEvent>::new(capacity);
    let (producer, consumer) = rb.split();
    let dropped = DropCounter::default();
    (
        EventSender {
            producer,
            dropped: dropped.clone(),
        },
        EventReceiver { consumer },
        dropped,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(receiver: &mut EventReceiver, capacity: usize) -> Vec<MidiEvent> {
        let mut buf = Vec::with_capacity(capacity);
        receiver.drain_into(&mut buf);
        buf.into_iter().map(|s| s.event).collect()
    }

    #[test]
    fn test_order_preserved() {
        let (mut sender, mut receiver, _) = event_queue(64);
        for note in 60..70 {
            assert!(sender.send(MidiEvent::note_on(0, note, 100)));
        }
        let events = drain(&mut receiver, 64);
        let notes: Vec<u8> = events.iter().filter_map(|e| e.note()).collect();
        assert_eq!(notes, (60..70).collect::<Vec<u8>>());
    }

    #[test]
    fn test_overflow_drops_and_counts() {
        let (mut sender, mut receiver, dropped) = event_queue(4);
        for i in 0..4 {
            assert!(sender.send(MidiEvent::note_on(0, 60 + i, 100)));
        }
        assert!(!sender.send(MidiEvent::note_on(0, 64, 100)));
        assert!(!sender.send(MidiEvent::note_on(0, 65, 100)));
        assert_eq!(dropped.count(), 2);

        // The queued events survive intact.
        let events = drain(&mut receiver, 8);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].note(), Some(60));
    }

    #[test]
    fn test_drain_respects_buffer_capacity() {
        let (mut sender, mut receiver, _) = event_queue(16);
        for note in 0..8 {
            sender.send(MidiEvent::note_on(0, note, 100));
        }
        let mut buf = Vec::with_capacity(3);
        receiver.drain_into(&mut buf);
        assert_eq!(buf.len(), 3);
        // The rest is still queued for the next cycle.
        let mut rest = Vec::with_capacity(16);
        receiver.drain_into(&mut rest);
        assert_eq!(rest.len(), 5);
        assert_eq!(rest[0].event.note(), Some(3));
    }

    #[test]
    fn test_cross_thread_delivery() {
        let (mut sender, mut receiver, _) = event_queue(256);
        let handle = std::thread::spawn(move || {
            for note in 0..100u8 {
                while !sender.send(MidiEvent::note_on(0, note, 100)) {
                    std::thread::yield_now();
                }
            }
        });

        let mut seen = Vec::new();
        while seen.len() < 100 {
            let mut buf = Vec::with_capacity(256);
            receiver.drain_into(&mut buf);
            seen.extend(buf.into_iter().filter_map(|s| s.event.note()));
        }
        handle.join().unwrap();
        assert_eq!(seen, (0..100u8).collect::<Vec<u8>>());
    }
}
