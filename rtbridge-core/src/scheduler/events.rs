//! Event types and the ordered future-event queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::clock::SimTime;

/// Simulated participant that receives events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity-{}", self.0)
    }
}

/// Identifies one bridging endpoint. Never reused within a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointId(u64);

impl EndpointId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint-{}", self.0)
    }
}

/// Datagram received from hardware, addressed to the endpoint's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDatagram {
    pub endpoint: EndpointId,
    pub data: Bytes,
}

impl InboundDatagram {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Content of a queued event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload<E> {
    /// Event produced by the simulation itself
    Simulation(E),
    /// Datagram posted by an endpoint's receive completion
    Datagram(InboundDatagram),
}

/// Event waiting in, or taken from, the scheduler's queue.
#[derive(Debug, Clone)]
pub struct ScheduledEvent<E> {
    arrival: SimTime,
    sequence: u64,
    destination: EntityId,
    source: Option<EndpointId>,
    payload: EventPayload<E>,
}

impl<E> ScheduledEvent<E> {
    /// Logical arrival time.
    pub fn arrival(&self) -> SimTime {
        self.arrival
    }

    /// Insertion order, used to break ties between equal arrival times.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn destination(&self) -> EntityId {
        self.destination
    }

    /// Endpoint that posted this event, if it came from hardware.
    pub fn source(&self) -> Option<EndpointId> {
        self.source
    }

    pub fn payload(&self) -> &EventPayload<E> {
        &self.payload
    }

    pub fn into_payload(self) -> EventPayload<E> {
        self.payload
    }

    fn key(&self) -> (SimTime, u64) {
        (self.arrival, self.sequence)
    }
}

struct QueueEntry<E>(ScheduledEvent<E>);

impl<E> PartialEq for QueueEntry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.0.key() == other.0.key()
    }
}

impl<E> Eq for QueueEntry<E> {}

impl<E> Ord for QueueEntry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, the earliest key must surface first
        other.0.key().cmp(&self.0.key())
    }
}

impl<E> PartialOrd for QueueEntry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Future-event queue ordered by arrival time, FIFO among equal arrivals.
pub struct EventQueue<E> {
    heap: BinaryHeap<QueueEntry<E>>,
    next_sequence: u64,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Inserts an event and returns its sequence number.
    pub fn push(
        &mut self,
        arrival: SimTime,
        destination: EntityId,
        source: Option<EndpointId>,
        payload: EventPayload<E>,
    ) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueueEntry(ScheduledEvent {
            arrival,
            sequence,
            destination,
            source,
            payload,
        }));
        sequence
    }

    /// Returns a taken event to the queue with its original ordering key.
    ///
    /// Nothing inserted after the take can precede it, so it becomes the head
    /// again.
    pub fn put_back(&mut self, event: ScheduledEvent<E>) {
        self.heap.push(QueueEntry(event));
    }

    pub fn peek(&self) -> Option<&ScheduledEvent<E>> {
        self.heap.peek().map(|entry| &entry.0)
    }

    pub fn pop(&mut self) -> Option<ScheduledEvent<E>> {
        self.heap.pop().map(|entry| entry.0)
    }

    pub(crate) fn peek_key(&self) -> Option<(SimTime, u64)> {
        self.peek().map(ScheduledEvent::key)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_at(queue: &mut EventQueue<&'static str>, millis: i64, label: &'static str) {
        queue.push(
            SimTime::from_millis(millis),
            EntityId::new(1),
            None,
            EventPayload::Simulation(label),
        );
    }

    fn label(event: &ScheduledEvent<&'static str>) -> &'static str {
        match event.payload() {
            EventPayload::Simulation(name) => *name,
            EventPayload::Datagram(_) => panic!("unexpected datagram"),
        }
    }

    #[test]
    fn test_time_order_with_fifo_ties() {
        let mut queue = EventQueue::new();
        push_at(&mut queue, 50, "a");
        push_at(&mut queue, 20, "b");
        push_at(&mut queue, 80, "c");
        push_at(&mut queue, 20, "d");

        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|event| (event.arrival(), label(&event)))
            .collect();

        assert_eq!(
            order,
            vec![
                (SimTime::from_millis(20), "b"),
                (SimTime::from_millis(20), "d"),
                (SimTime::from_millis(50), "a"),
                (SimTime::from_millis(80), "c"),
            ]
        );
    }

    #[test]
    fn test_put_back_restores_head() {
        let mut queue = EventQueue::new();
        push_at(&mut queue, 10, "first");
        push_at(&mut queue, 10, "second");

        let taken = queue.pop().unwrap();
        push_at(&mut queue, 10, "later");
        queue.put_back(taken);

        assert_eq!(label(queue.peek().unwrap()), "first");
        assert_eq!(queue.len(), 3);
    }
}
