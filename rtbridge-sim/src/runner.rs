//! Simulation core driving entities from the real-time scheduler.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rtbridge_core::config::SchedulerConfig;
use rtbridge_core::scheduler::{
    EntityId, EventPayload, InboundDatagram, PauseHandle, RealTimeScheduler, SchedulerError,
};
use rtbridge_core::SimTime;

use crate::SimError;

/// Destination of the internal stop marker; never assigned to an entity.
const RUNNER_ID: EntityId = EntityId::new(u32::MAX);

/// Queue payload of a runner: entity events plus the stop marker.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent<E> {
    Entity(E),
    Stop,
}

/// Event delivered to an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent<E> {
    /// Event the simulation scheduled for this entity
    Simulation(E),
    /// Datagram received by an endpoint the entity owns
    Hardware(InboundDatagram),
}

/// Simulated participant driven by the runner.
pub trait Entity<E> {
    /// Called once when the run starts, before any event is dispatched.
    ///
    /// # Errors
    ///
    /// - `SimError` - Entity could not be set up; the run is aborted
    fn initialize(&mut self, _ctx: &mut EntityContext<'_, E>) -> Result<(), SimError> {
        Ok(())
    }

    /// Handles one event at `ctx.now()`.
    ///
    /// # Errors
    ///
    /// - `SimError` - Aborts the run
    fn handle_event(
        &mut self,
        event: EntityEvent<E>,
        ctx: &mut EntityContext<'_, E>,
    ) -> Result<(), SimError>;

    /// Called once when the run ends. Entities release their endpoints here.
    fn finish(&mut self, _ctx: &mut EntityContext<'_, E>) {}
}

/// An entity's view of the simulation while it handles an event.
pub struct EntityContext<'a, E> {
    id: EntityId,
    now: SimTime,
    scheduler: &'a mut RealTimeScheduler<RunnerEvent<E>>,
}

impl<'a, E> EntityContext<'a, E> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedules an event for this entity `delay` after now.
    ///
    /// # Errors
    ///
    /// - `SimError::Scheduler` - Arrival rejected by the scheduler
    pub fn schedule_in(&mut self, delay: Duration, event: E) -> Result<(), SimError> {
        self.schedule_for(self.id, delay, event)
    }

    /// Schedules an event for another entity `delay` after now.
    ///
    /// # Errors
    ///
    /// - `SimError::Scheduler` - Arrival rejected by the scheduler
    pub fn schedule_for(
        &mut self,
        target: EntityId,
        delay: Duration,
        event: E,
    ) -> Result<(), SimError> {
        self.scheduler
            .schedule(self.now.saturating_add(delay), target, RunnerEvent::Entity(event))?;
        Ok(())
    }

    /// Scheduler access for creating and tearing down endpoints.
    pub fn scheduler(&mut self) -> &mut RealTimeScheduler<RunnerEvent<E>> {
        &mut *self.scheduler
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The logical time limit was reached
    LimitReached,
    /// No events left and no endpoint that could produce one
    QueueExhausted,
    /// An external pause was requested; the run can be resumed
    Paused,
}

/// Result of a simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Simulation events handled by entities
    pub events_dispatched: u64,
    /// Hardware datagrams handed to entities
    pub datagrams_delivered: u64,
    /// Events discarded because their endpoint was gone
    pub stale_discarded: u64,
    /// Events addressed to unknown entities
    pub undeliverable: u64,
    pub final_time: SimTime,
    pub wall_time: Duration,
}

impl RunReport {
    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!("Run outcome: {:?}\n", self.outcome));
        summary.push_str(&format!("Final logical time: {}\n", self.final_time));
        summary.push_str(&format!("Wall time: {:?}\n", self.wall_time));
        summary.push_str(&format!("Simulation events: {}\n", self.events_dispatched));
        summary.push_str(&format!("Hardware datagrams: {}\n", self.datagrams_delivered));
        summary.push_str(&format!("Stale events discarded: {}\n", self.stale_discarded));
        if self.undeliverable > 0 {
            summary.push_str(&format!("Undeliverable events: {}\n", self.undeliverable));
        }
        summary
    }
}

#[derive(Debug, Default)]
struct RunCounters {
    events_dispatched: u64,
    datagrams_delivered: u64,
    undeliverable: u64,
}

/// Owns the scheduler and the entities and dispatches events in time order.
pub struct SimulationRunner<E> {
    scheduler: RealTimeScheduler<RunnerEvent<E>>,
    entities: BTreeMap<EntityId, Box<dyn Entity<E>>>,
    next_entity_id: u32,
    counters: RunCounters,
    started_at: Option<Instant>,
}

impl<E> SimulationRunner<E> {
    /// Creates a runner with an idle scheduler.
    ///
    /// # Errors
    ///
    /// - `SimError::Scheduler` - Scheduler reactor could not be created
    pub fn new(config: SchedulerConfig) -> Result<Self, SimError> {
        Ok(Self {
            scheduler: RealTimeScheduler::new(config)?,
            entities: BTreeMap::new(),
            next_entity_id: 0,
            counters: RunCounters::default(),
            started_at: None,
        })
    }

    /// Registers an entity; it is initialized when the run starts.
    pub fn add_entity(&mut self, entity: Box<dyn Entity<E>>) -> EntityId {
        let id = EntityId::new(self.next_entity_id);
        self.next_entity_id += 1;
        self.entities.insert(id, entity);
        id
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn scheduler(&self) -> &RealTimeScheduler<RunnerEvent<E>> {
        &self.scheduler
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.scheduler.pause_handle()
    }

    /// Starts a run, initializes every entity and dispatches events until
    /// logical time `limit`, a pause or queue exhaustion.
    ///
    /// Without a limit the run lasts until no event is left and no endpoint
    /// is active.
    ///
    /// # Errors
    ///
    /// - `SimError::Scheduler` - Fatal link error or internal clock error
    /// - `SimError::Entity` / `SimError::Agent` - An entity failed
    pub fn run(&mut self, limit: Option<SimTime>) -> Result<RunReport, SimError> {
        self.scheduler.start_run();
        self.counters = RunCounters::default();
        self.started_at = Some(Instant::now());
        if let Some(limit) = limit {
            self.scheduler.schedule(limit, RUNNER_ID, RunnerEvent::Stop)?;
        }

        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.with_entity(id, |entity, ctx| entity.initialize(ctx)) {
                self.shutdown();
                return Err(e);
            }
        }

        match limit {
            Some(limit) => tracing::info!("Running {} entities until {}", self.entities.len(), limit),
            None => tracing::info!("Running {} entities until idle", self.entities.len()),
        }
        self.drive()
    }

    /// Continues a paused run with its original limit.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub fn resume(&mut self) -> Result<RunReport, SimError> {
        self.scheduler.resume_after_pause();
        self.drive()
    }

    /// Finishes every entity and ends the run.
    pub fn shutdown(&mut self) {
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            self.finish_entity(id);
        }
        self.scheduler.end_run();
    }

    fn finish_entity(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get_mut(&id) {
            let mut ctx = EntityContext {
                id,
                now: self.scheduler.current_time(),
                scheduler: &mut self.scheduler,
            };
            entity.finish(&mut ctx);
        }
    }

    fn drive(&mut self) -> Result<RunReport, SimError> {
        loop {
            let event = match self.scheduler.take_next_event() {
                Ok(Some(event)) => event,
                Ok(None) => return Ok(self.report(RunOutcome::Paused)),
                Err(SchedulerError::QueueExhausted { at }) => {
                    tracing::info!("Event queue exhausted at {}", at);
                    self.shutdown();
                    return Ok(self.report(RunOutcome::QueueExhausted));
                }
                Err(e) => {
                    tracing::error!("Run aborted: {}", e);
                    self.shutdown();
                    return Err(e.into());
                }
            };

            let destination = event.destination();
            let entity_event = match event.into_payload() {
                EventPayload::Simulation(RunnerEvent::Stop) => {
                    self.shutdown();
                    return Ok(self.report(RunOutcome::LimitReached));
                }
                EventPayload::Simulation(RunnerEvent::Entity(event)) => {
                    EntityEvent::Simulation(event)
                }
                EventPayload::Datagram(datagram) => EntityEvent::Hardware(datagram),
            };

            if !self.entities.contains_key(&destination) {
                tracing::warn!("Dropping event for unknown {}", destination);
                self.counters.undeliverable += 1;
                continue;
            }

            match entity_event {
                EntityEvent::Simulation(_) => self.counters.events_dispatched += 1,
                EntityEvent::Hardware(_) => self.counters.datagrams_delivered += 1,
            }

            if let Err(e) = self.with_entity(destination, |entity, ctx| {
                entity.handle_event(entity_event, ctx)
            }) {
                tracing::error!("{} failed: {}", destination, e);
                self.shutdown();
                return Err(e);
            }
        }
    }

    fn with_entity<F>(&mut self, id: EntityId, f: F) -> Result<(), SimError>
    where
        F: FnOnce(&mut dyn Entity<E>, &mut EntityContext<'_, E>) -> Result<(), SimError>,
    {
        let Some(entity) = self.entities.get_mut(&id) else {
            return Ok(());
        };
        let mut ctx = EntityContext {
            id,
            now: self.scheduler.current_time(),
            scheduler: &mut self.scheduler,
        };
        f(entity.as_mut(), &mut ctx)
    }

    fn report(&self, outcome: RunOutcome) -> RunReport {
        RunReport {
            outcome,
            events_dispatched: self.counters.events_dispatched,
            datagrams_delivered: self.counters.datagrams_delivered,
            stale_discarded: self.scheduler.stale_discarded(),
            undeliverable: self.counters.undeliverable,
            final_time: self.scheduler.current_time(),
            wall_time: self
                .started_at
                .map(|started| started.elapsed())
                .unwrap_or_default(),
        }
    }
}
