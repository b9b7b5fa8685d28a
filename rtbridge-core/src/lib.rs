//! rtbridge core - real-time bridging of a discrete-event simulation to V2X
//! radio hardware over UDP.
//!
//! This crate provides the hardware wire codec, the clock bridge between
//! logical and monotonic time, the real-time scheduler with its I/O reactor,
//! per-entity endpoints and the hardware agent built on top of them.

pub mod agent;
pub mod clock;
pub mod config;
pub mod endpoint;
pub mod scheduler;
pub mod tracing_setup;
pub mod wire;

// Re-export main types for convenient access
pub use agent::{AgentError, HardwareAgent, InboundPacket, NetworkIndication, PortTable};
pub use clock::{ClockBridge, ClockResolution, SimTime};
pub use config::{AgentConfig, BridgeConfig, SchedulerConfig};
pub use endpoint::{Endpoint, EndpointError};
pub use scheduler::{
    EndpointId, EntityId, EventPayload, InboundDatagram, PauseHandle, RealTimeScheduler, RunState,
    ScheduledEvent, SchedulerError,
};
pub use wire::{CodecError, DataIndicationHeader, DataRequestHeader};

/// Errors that can bubble up from any bridge subsystem.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("{entity} failed: {reason}")]
    Entity { entity: EntityId, reason: String },
}

impl BridgeError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::Scheduler(e) => match e {
                SchedulerError::QueueExhausted { at } => {
                    format!("Simulation finished at {at}")
                }
                SchedulerError::FatalIo { endpoint, .. } => {
                    format!("Hardware link lost on {endpoint}")
                }
                SchedulerError::ClockInvariantViolation { .. } => {
                    "Internal clock error, run aborted".to_string()
                }
                _ => "Scheduler error occurred".to_string(),
            },
            BridgeError::Endpoint(EndpointError::Bind { address, .. }) => {
                format!("Could not bind local address {address}")
            }
            BridgeError::Endpoint(_) => "Could not reach the radio unit".to_string(),
            BridgeError::Agent(_) => "Hardware agent error occurred".to_string(),
            BridgeError::Codec(e) => format!("Malformed hardware header: {e}"),
            BridgeError::Configuration { reason } => format!("Invalid configuration: {reason}"),
            BridgeError::Entity { entity, reason } => format!("Simulated {entity} stopped: {reason}"),
        }
    }

    /// Checks if this error only marks the regular end of a run.
    pub fn is_clean_termination(&self) -> bool {
        matches!(
            self,
            BridgeError::Scheduler(SchedulerError::QueueExhausted { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
