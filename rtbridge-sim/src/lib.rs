//! rtbridge simulation driver - runs simulated entities against real-time
//! hardware through the rtbridge scheduler.
//!
//! This crate provides a small entity runner on top of
//! [`RealTimeScheduler`](rtbridge_core::RealTimeScheduler), a periodic beacon
//! entity that mirrors its traffic to the radio unit, and a UDP emulator of
//! the radio unit for loopback testing.
//!
//! # Example
//!
//! ```rust,no_run
//! use rtbridge_core::{BridgeConfig, SimTime};
//! use rtbridge_sim::{BeaconConfig, BeaconEntity, SimulationRunner};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::from_env();
//! let mut runner = SimulationRunner::new(config.scheduler)?;
//! runner.add_entity(Box::new(BeaconEntity::new(BeaconConfig {
//!     agent: config.agent,
//!     ..BeaconConfig::default()
//! })));
//!
//! let report = runner.run(Some(SimTime::from_secs(10)))?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod beacon;
pub mod emulator;
pub mod runner;

use std::io;

use rtbridge_core::{AgentError, BridgeError, EndpointError, EntityId, SchedulerError};

pub use beacon::{BeaconConfig, BeaconEntity, BeaconEvent, BeaconStats};
pub use emulator::{EmulatorError, HardwareEmulator, ReceivedRequest};
pub use runner::{
    Entity, EntityContext, EntityEvent, RunOutcome, RunReport, RunnerEvent, SimulationRunner,
};

/// Errors that abort a simulation run.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("{entity} failed: {reason}")]
    Entity { entity: EntityId, reason: String },
}

impl SimError {
    /// Returns true when the run stopped because the hardware link is gone.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, SimError::Scheduler(SchedulerError::FatalIo { .. }))
    }
}

impl From<SimError> for BridgeError {
    fn from(error: SimError) -> Self {
        match error {
            SimError::Scheduler(e) => BridgeError::Scheduler(e),
            SimError::Agent(e) => BridgeError::Agent(e),
            SimError::Entity { entity, reason } => BridgeError::Entity { entity, reason },
        }
    }
}

impl From<EmulatorError> for BridgeError {
    fn from(error: EmulatorError) -> Self {
        match error {
            EmulatorError::Io(e) => BridgeError::Endpoint(EndpointError::Setup(e)),
            EmulatorError::Timeout { after } => BridgeError::Endpoint(EndpointError::Setup(
                io::Error::new(io::ErrorKind::TimedOut, format!("no data request within {after:?}")),
            )),
            EmulatorError::Malformed { source, .. } => BridgeError::Codec(source),
        }
    }
}
