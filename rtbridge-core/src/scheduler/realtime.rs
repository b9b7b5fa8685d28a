use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use crate::clock::{ClockBridge, SimTime};
use crate::config::SchedulerConfig;
use crate::endpoint::{Completion, Endpoint, EndpointError, ReceiveOutcome, ReceiveVerdict};

use super::events::{
    EndpointId, EntityId, EventPayload, EventQueue, InboundDatagram, ScheduledEvent,
};
use super::reactor::{Reactor, Wakeup};
use super::{PauseHandle, RunState, SchedulerError};

/// Result of one bounded wait inside `take_next_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dwell {
    /// Deadline passed or the queue head changed
    Ready,
    Paused,
}

/// Event-queue driver that releases each event only once its logical
/// arrival time has been reached in real time.
///
/// Logical time `t` is released at the real instant `reference + deadline_of(t)`.
/// While waiting for that instant the scheduler drives the I/O reactor, so
/// hardware datagrams received in the meantime are stamped with their real
/// arrival time and may overtake the event being waited for.
pub struct RealTimeScheduler<E> {
    config: SchedulerConfig,
    clock: ClockBridge,
    state: RunState,
    reactor: Reactor,
    queue: EventQueue<E>,
    endpoints: HashMap<EndpointId, EntityId>,
    next_endpoint_id: u64,
    reference: Instant,
    current_time: SimTime,
    previous_time: SimTime,
    pause: PauseHandle,
    stale_discarded: u64,
}

impl<E> RealTimeScheduler<E> {
    /// Creates a paused scheduler with its own I/O reactor.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Runtime` - Reactor runtime could not be built
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let clock = ClockBridge::new(config.clock_resolution);
        let reactor = Reactor::new()?;

        Ok(Self {
            config,
            clock,
            state: RunState::Paused,
            reactor,
            queue: EventQueue::new(),
            endpoints: HashMap::new(),
            next_endpoint_id: 0,
            reference: Instant::now(),
            current_time: SimTime::ZERO,
            previous_time: SimTime::ZERO,
            pause: PauseHandle::default(),
            stale_discarded: 0,
        })
    }

    pub fn info(&self) -> String {
        format!(
            "Real-time scheduler with {} resolution",
            self.clock.resolution()
        )
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Logical time of the most recently taken event.
    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    /// Real instant corresponding to logical time zero.
    pub fn reference(&self) -> Instant {
        self.reference
    }

    pub fn clock(&self) -> &ClockBridge {
        &self.clock
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn active_endpoints(&self) -> usize {
        self.endpoints.len()
    }

    /// Number of queued events dropped because their endpoint was torn down.
    pub fn stale_discarded(&self) -> u64 {
        self.stale_discarded
    }

    /// Starts a run at logical time zero anchored to the current instant.
    pub fn start_run(&mut self) {
        self.start_run_at(Instant::now());
    }

    pub(crate) fn start_run_at(&mut self, now: Instant) {
        if self.reactor.is_stopped() {
            self.reactor.reset();
        }
        self.pause.take_request();
        self.reference = now;
        self.current_time = SimTime::ZERO;
        self.previous_time = SimTime::ZERO;
        self.state = RunState::Syncing;

        tracing::info!("Run started: {}", self.info());
    }

    /// Ends the run and stops driving I/O. Pending receives are abandoned.
    pub fn end_run(&mut self) {
        self.state = RunState::Paused;
        self.reactor.stop();
        tracing::info!("Run ended at {}", self.current_time);
    }

    /// Continues a paused run from the current logical time.
    ///
    /// Wall-clock time spent paused is absorbed into the reference point, so
    /// deadlines after the resume are unaffected by the pause duration.
    pub fn resume_after_pause(&mut self) {
        self.resume_at(Instant::now());
    }

    pub(crate) fn resume_at(&mut self, now: Instant) {
        if self.reactor.is_stopped() {
            self.reactor.reset();
        }

        let elapsed = self.clock.deadline_of(self.current_time);
        self.reference = now.checked_sub(elapsed).unwrap_or_else(|| {
            tracing::warn!(
                "Monotonic clock cannot represent {} before now, anchoring at now",
                self.current_time
            );
            now
        });
        self.state = RunState::Syncing;

        tracing::info!("Run resumed at {}", self.current_time);
    }

    /// Queues a simulation event for `destination`.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::SchedulingInPast` - `arrival` precedes the current time
    pub fn schedule(
        &mut self,
        arrival: SimTime,
        destination: EntityId,
        event: E,
    ) -> Result<u64, SchedulerError> {
        if arrival < self.current_time {
            return Err(SchedulerError::SchedulingInPast {
                arrival,
                current: self.current_time,
            });
        }
        Ok(self
            .queue
            .push(arrival, destination, None, EventPayload::Simulation(event)))
    }

    /// Earliest queued event, without side effects. May be stale.
    pub fn peek_next_event(&self) -> Option<&ScheduledEvent<E>> {
        self.queue.peek()
    }

    /// Blocks until the earliest event is due in real time and returns it.
    ///
    /// Returns `Ok(None)` when an external pause was requested while waiting;
    /// the run then stays paused until [`resume_after_pause`](Self::resume_after_pause).
    ///
    /// # Errors
    ///
    /// - `SchedulerError::QueueExhausted` - Nothing queued and no active endpoints
    /// - `SchedulerError::FatalIo` - An endpoint's receive failed
    /// - `SchedulerError::ReactorStopped` - Called after `end_run`
    /// - `SchedulerError::ClockInvariantViolation` - A datagram was stamped
    ///   before the current time (debug builds)
    pub fn take_next_event(&mut self) -> Result<Option<ScheduledEvent<E>>, SchedulerError> {
        if self.reactor.is_stopped() {
            return Err(SchedulerError::ReactorStopped);
        }
        if self.state == RunState::Paused {
            return Ok(None);
        }

        loop {
            let Some(head) = self.queue.peek() else {
                if self.endpoints.is_empty() {
                    return Err(SchedulerError::QueueExhausted {
                        at: self.current_time,
                    });
                }
                let slice_end = Instant::now() + self.config.max_wait_slice;
                if self.dwell_until(slice_end, None)? == Dwell::Paused {
                    return Ok(None);
                }
                continue;
            };

            let (source, arrival) = (head.source(), head.arrival());
            if let Some(endpoint) = source {
                if !self.endpoints.contains_key(&endpoint) {
                    self.queue.pop();
                    self.stale_discarded += 1;
                    tracing::debug!("Discarded stale event from {}", endpoint);
                    continue;
                }
            }

            let key = self.queue.peek_key();
            let deadline = self.reference + self.clock.deadline_of(arrival);
            if self.dwell_until(deadline, key)? == Dwell::Paused {
                return Ok(None);
            }

            // Completions handled while dwelling may have replaced the head or
            // released its endpoint
            let released = source.is_some_and(|endpoint| !self.endpoints.contains_key(&endpoint));
            if released || self.queue.peek_key() != key {
                continue;
            }

            if let Some(event) = self.queue.pop() {
                self.previous_time = self.current_time;
                self.current_time = event.arrival();
                tracing::debug!(
                    "Taking event {} for {} at {}",
                    event.sequence(),
                    event.destination(),
                    event.arrival()
                );
                return Ok(Some(event));
            }
        }
    }

    /// Re-inserts the most recently taken event at the front of the queue.
    pub fn put_back_event(&mut self, event: ScheduledEvent<E>) {
        tracing::debug!("Putting back event {} at {}", event.sequence(), event.arrival());
        self.queue.put_back(event);
        self.current_time = self.previous_time;
    }

    /// Creates an endpoint owned by `owner`, bound to `local` or an ephemeral port.
    ///
    /// # Errors
    ///
    /// - `EndpointError::Bind` - Local address unavailable
    pub fn create_endpoint(
        &mut self,
        owner: EntityId,
        local: Option<SocketAddr>,
    ) -> Result<Endpoint, EndpointError> {
        let id = EndpointId::new(self.next_endpoint_id);
        self.next_endpoint_id += 1;

        let endpoint = Endpoint::create(
            id,
            owner,
            local,
            self.config.receive_buffer_size,
            self.reactor.handle(),
        )?;
        self.endpoints.insert(id, owner);
        Ok(endpoint)
    }

    /// Unregisters an endpoint; its queued datagrams become stale.
    pub(crate) fn release_endpoint(&mut self, id: EndpointId) {
        if self.endpoints.remove(&id).is_some() {
            tracing::debug!("Released {}", id);
        }
    }

    /// Drives the reactor until `deadline`, a pause request, or a change of
    /// the queue head away from `head`.
    fn dwell_until(
        &mut self,
        deadline: Instant,
        head: Option<(SimTime, u64)>,
    ) -> Result<Dwell, SchedulerError> {
        if self.reactor.is_stopped() {
            return Err(SchedulerError::ReactorStopped);
        }
        self.state = RunState::Dwelling;

        loop {
            if self.pause.take_request() {
                self.state = RunState::Paused;
                tracing::info!("Pause requested at {}", self.current_time);
                return Ok(Dwell::Paused);
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let slice_end = deadline.min(now + self.config.max_wait_slice);
            if let Wakeup::Completion(completion) = self.reactor.run_one_until(slice_end) {
                self.handle_completion(completion)?;
                self.drain_completions()?;
                if self.queue.peek_key() != head {
                    break;
                }
            }
        }

        self.drain_completions()?;
        self.state = RunState::Syncing;
        Ok(Dwell::Ready)
    }

    fn drain_completions(&mut self) -> Result<(), SchedulerError> {
        for completion in self.reactor.poll() {
            self.handle_completion(completion)?;
        }
        Ok(())
    }

    fn handle_completion(&mut self, completion: Completion) -> Result<(), SchedulerError> {
        let Completion { endpoint, outcome } = completion;
        let Some(&owner) = self.endpoints.get(&endpoint) else {
            tracing::trace!("Ignoring completion of released {}", endpoint);
            return Ok(());
        };

        // Cancelled while still registered: the endpoint was dropped without teardown
        if matches!(outcome, ReceiveOutcome::Cancelled) {
            self.release_endpoint(endpoint);
            return Ok(());
        }

        match outcome.classify(self.config.receive_buffer_size) {
            ReceiveVerdict::Deliver { data, received_at } => {
                let offset = received_at.saturating_duration_since(self.reference);
                let arrival = self.checked_arrival(self.clock.sim_time_of(offset))?;

                tracing::info!(
                    "{} accepted {} byte datagram for {} at {}",
                    endpoint,
                    data.len(),
                    owner,
                    arrival
                );
                self.queue.push(
                    arrival,
                    owner,
                    Some(endpoint),
                    EventPayload::Datagram(InboundDatagram { endpoint, data }),
                );
            }
            ReceiveVerdict::DropTruncated { byte_count } => {
                tracing::warn!(
                    "{} dropped possibly truncated datagram ({} bytes fill the {} byte buffer)",
                    endpoint,
                    byte_count,
                    self.config.receive_buffer_size
                );
            }
            ReceiveVerdict::IgnoreCancelled => {
                tracing::debug!("Receive on {} cancelled", endpoint);
            }
            ReceiveVerdict::Fatal(source) => {
                tracing::error!("Hardware link on {} failed: {}", endpoint, source);
                return Err(SchedulerError::FatalIo { endpoint, source });
            }
        }
        Ok(())
    }

    /// Rejects arrivals before the current time; release builds log and clamp.
    fn checked_arrival(&self, arrival: SimTime) -> Result<SimTime, SchedulerError> {
        if arrival >= self.current_time {
            return Ok(arrival);
        }

        tracing::error!(
            "Datagram arrival {} precedes current time {}",
            arrival,
            self.current_time
        );
        if cfg!(debug_assertions) {
            Err(SchedulerError::ClockInvariantViolation {
                arrival,
                current: self.current_time,
            })
        } else {
            Ok(self.current_time)
        }
    }
}
