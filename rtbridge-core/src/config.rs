//! Centralized configuration for the bridge.
//!
//! All tunable parameters live here; binaries start from
//! [`BridgeConfig::from_env`] and apply command-line overrides on top.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::clock::ClockResolution;
use crate::endpoint::DEFAULT_WRITE_TIMEOUT;

/// UDP port the radio unit listens on for Data Requests by default.
pub const DEFAULT_HARDWARE_PORT: u16 = 4401;

/// Central configuration for all bridge components.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub scheduler: SchedulerConfig,
    pub agent: AgentConfig,
}

/// Real-time scheduler tunables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Resolution shared by logical and real time
    pub clock_resolution: ClockResolution,
    /// Longest uninterrupted wait before pause requests are re-checked
    pub max_wait_slice: Duration,
    /// Per-endpoint receive buffer; datagrams filling it are dropped
    pub receive_buffer_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            clock_resolution: ClockResolution::default(),
            max_wait_slice: Duration::from_millis(100),
            receive_buffer_size: 2048,
        }
    }
}

/// Per-entity hardware agent settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Receive bind address; ephemeral when unset
    pub local_addr: Option<SocketAddr>,
    /// Radio unit address Data Requests are sent to
    pub remote_addr: SocketAddr,
    /// Derive missing application ids from well-known destination ports
    pub use_port_classification: bool,
    /// Upper bound on a single blocking send
    pub send_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            local_addr: None,
            remote_addr: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::LOCALHOST,
                DEFAULT_HARDWARE_PORT,
            )),
            use_port_classification: false,
            send_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    /// Creates configuration with `RTBRIDGE_*` environment overrides.
    ///
    /// Values that fail to parse leave the default in place.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("RTBRIDGE_LOCAL_ADDR") {
            if let Ok(addr) = addr.parse::<SocketAddr>() {
                config.agent.local_addr = Some(addr);
            }
        }

        if let Ok(addr) = std::env::var("RTBRIDGE_REMOTE_ADDR") {
            if let Ok(addr) = addr.parse::<SocketAddr>() {
                config.agent.remote_addr = addr;
            }
        }

        if let Ok(enabled) = std::env::var("RTBRIDGE_PORT_CLASSIFICATION") {
            config.agent.use_port_classification = enabled.parse().unwrap_or(false);
        }

        if let Ok(resolution) = std::env::var("RTBRIDGE_CLOCK_RESOLUTION") {
            if let Ok(resolution) = resolution.parse::<ClockResolution>() {
                config.scheduler.clock_resolution = resolution;
            }
        }

        if let Ok(slice) = std::env::var("RTBRIDGE_WAIT_SLICE_MS") {
            if let Ok(millis) = slice.parse::<u64>() {
                if millis > 0 {
                    config.scheduler.max_wait_slice = Duration::from_millis(millis);
                }
            }
        }

        config
    }

    /// Configuration for loopback tests: short wait slices, ephemeral ports.
    pub fn for_testing() -> Self {
        Self {
            scheduler: SchedulerConfig {
                max_wait_slice: Duration::from_millis(10),
                ..Default::default()
            },
            agent: AgentConfig::default(),
        }
    }
}
