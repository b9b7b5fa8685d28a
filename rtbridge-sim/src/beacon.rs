//! Periodic CAM beacon entity bridged to the radio unit.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rtbridge_core::agent::{AreaShape, GeoArea};
use rtbridge_core::wire::ItsAid;
use rtbridge_core::{AgentConfig, HardwareAgent, NetworkIndication, PortTable};

use crate::SimError;
use crate::runner::{Entity, EntityContext, EntityEvent};

/// CAM destination port.
const CAM_PORT: u16 = 2001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconEvent {
    Send,
}

/// Beacon behaviour.
#[derive(Debug, Clone)]
pub struct BeaconConfig {
    pub interval: Duration,
    pub payload_len: usize,
    /// Seed for the payload generator
    pub seed: u64,
    pub area: GeoArea,
    pub agent: AgentConfig,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            payload_len: 32,
            seed: 0,
            area: GeoArea {
                latitude: 48.5,
                longitude: 9.25,
                angle: 0,
                shape: AreaShape::Circle { radius: 500 },
            },
            agent: AgentConfig::default(),
        }
    }
}

/// Counters shared between a beacon and whoever observes it.
#[derive(Debug, Clone, Default)]
pub struct BeaconStats {
    sent: Arc<AtomicU64>,
    received: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl BeaconStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Hardware datagrams that could not be decoded.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Entity that broadcasts a CAM every interval through its hardware agent
/// and counts what the radio unit sends back.
pub struct BeaconEntity {
    config: BeaconConfig,
    agent: Option<HardwareAgent>,
    rng: ChaCha8Rng,
    stats: BeaconStats,
}

impl BeaconEntity {
    pub fn new(config: BeaconConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            agent: None,
            rng,
            stats: BeaconStats::default(),
        }
    }

    pub fn stats(&self) -> BeaconStats {
        self.stats.clone()
    }

    fn send_beacon(&mut self) -> Result<(), SimError> {
        let Some(agent) = &self.agent else {
            return Ok(());
        };

        let mut payload = vec![0u8; self.config.payload_len];
        self.rng.fill(&mut payload[..]);

        let indication = NetworkIndication {
            its_aid: Some(ItsAid::Cam),
            traffic_class: 0,
            remaining_lifetime: Some(Duration::from_secs(1)),
            destination_port: CAM_PORT,
            destination_port_info: None,
            area: Some(self.config.area),
            permissions: None,
        };
        agent.forward(&indication, &payload)?;
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Entity<BeaconEvent> for BeaconEntity {
    fn initialize(&mut self, ctx: &mut EntityContext<'_, BeaconEvent>) -> Result<(), SimError> {
        let port_table = self
            .config
            .agent
            .use_port_classification
            .then(PortTable::well_known);
        let id = ctx.id();
        self.agent = Some(HardwareAgent::initialize(
            ctx.scheduler(),
            id,
            &self.config.agent,
            port_table,
        )?);
        ctx.schedule_in(Duration::ZERO, BeaconEvent::Send)
    }

    fn handle_event(
        &mut self,
        event: EntityEvent<BeaconEvent>,
        ctx: &mut EntityContext<'_, BeaconEvent>,
    ) -> Result<(), SimError> {
        match event {
            EntityEvent::Simulation(BeaconEvent::Send) => {
                self.send_beacon()?;
                ctx.schedule_in(self.config.interval, BeaconEvent::Send)
            }
            EntityEvent::Hardware(datagram) => {
                let packet = self
                    .agent
                    .as_ref()
                    .and_then(|agent| agent.handle_datagram(&datagram));
                match packet {
                    Some(_) => self.stats.received.fetch_add(1, Ordering::Relaxed),
                    None => self.stats.dropped.fetch_add(1, Ordering::Relaxed),
                };
                Ok(())
            }
        }
    }

    fn finish(&mut self, ctx: &mut EntityContext<'_, BeaconEvent>) {
        if let Some(agent) = self.agent.take() {
            agent.teardown(ctx.scheduler());
        }
    }
}
