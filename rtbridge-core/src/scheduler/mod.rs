//! Real-time scheduler keeping logical simulation time in lockstep with the
//! monotonic clock.
//!
//! The scheduler owns the future-event queue and the I/O reactor. Taking the
//! next event blocks until its logical arrival time is reached in real time,
//! while endpoint receive completions keep inserting hardware datagrams into
//! the same queue.

pub mod events;
pub(crate) mod reactor;
mod realtime;

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use events::{
    EndpointId, EntityId, EventPayload, EventQueue, InboundDatagram, ScheduledEvent,
};
pub use realtime::RealTimeScheduler;

use crate::clock::SimTime;

/// Errors that end or refuse scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// No events queued and no endpoint could produce one. Ends the run cleanly.
    #[error("Event queue exhausted at {at}")]
    QueueExhausted { at: SimTime },

    #[error("Fatal I/O error on {endpoint}: {source}")]
    FatalIo {
        endpoint: EndpointId,
        #[source]
        source: io::Error,
    },

    #[error("Clock invariant violated: arrival {arrival} precedes current time {current}")]
    ClockInvariantViolation { arrival: SimTime, current: SimTime },

    #[error("Cannot schedule event at {arrival}: current time is {current}")]
    SchedulingInPast { arrival: SimTime, current: SimTime },

    #[error("I/O reactor is stopped")]
    ReactorStopped,

    #[error("Failed to start I/O reactor: {0}")]
    Runtime(#[from] io::Error),
}

/// Scheduler run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// No active run
    Paused,
    /// Resolving the next logical event
    Syncing,
    /// Waiting for a real-time deadline or an I/O completion
    Dwelling,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Paused => "PAUSED",
            RunState::Syncing => "SYNCING",
            RunState::Dwelling => "DWELLING",
        };
        f.write_str(name)
    }
}

/// Requests an external pause of a dwelling scheduler.
///
/// Cloneable and usable from any thread; the scheduler observes the request
/// at the next wait-slice tick.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle {
    requested: Arc<AtomicBool>,
}

impl PauseHandle {
    pub fn request_pause(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub(crate) fn take_request(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}
