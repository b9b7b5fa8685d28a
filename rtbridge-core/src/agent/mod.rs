//! Per-entity hardware agent.
//!
//! Mirrors packets an entity receives in the simulation to the radio unit as
//! Data Requests, and turns Data Indications arriving from the radio unit
//! into network-layer requests for the simulation.

pub mod classification;

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use classification::{PortTable, transport_for};

use crate::config::AgentConfig;
use crate::endpoint::{Endpoint, EndpointError};
use crate::scheduler::{EndpointId, EntityId, InboundDatagram, RealTimeScheduler};
use crate::wire::{
    CodecError, CommsProfile, DataIndicationHeader, DataRequestHeader, Destination, ItsAid,
    PacketTransport, PacketType, SSP_BITS_LEN, SecurityProfile, Shape,
};

/// Fixed-point scale of header coordinates (1/10 microdegree).
const COORDINATE_SCALE: f64 = 10_000_000.0;

/// Errors raised by agent setup and forwarding.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Malformed data indication: {0}")]
    Codec(#[from] CodecError),

    #[error("Datagram of {len} bytes is shorter than a data indication header")]
    ShortDatagram { len: usize },

    #[error("Payload of {len} bytes exceeds the 16-bit length field")]
    PayloadTooLarge { len: usize },
}

/// Shape and extent of a geographic area, distances in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AreaShape {
    Circle { radius: u16 },
    Rectangle { a: u16, b: u16 },
    Ellipse { a: u16, b: u16 },
}

/// Geographic destination area with its center in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoArea {
    pub latitude: f64,
    pub longitude: f64,
    /// Degrees from north
    pub angle: u16,
    pub shape: AreaShape,
}

impl GeoArea {
    /// Header representation in 1/10 microdegree.
    pub fn to_destination(&self) -> Destination {
        let latitude = to_fixed_point(self.latitude);
        let longitude = to_fixed_point(self.longitude);
        match self.shape {
            AreaShape::Circle { radius } => {
                Destination::circle(latitude, longitude, radius, self.angle)
            }
            AreaShape::Rectangle { a, b } => {
                Destination::rectangle(latitude, longitude, a, b, self.angle)
            }
            AreaShape::Ellipse { a, b } => {
                Destination::ellipse(latitude, longitude, a, b, self.angle)
            }
        }
    }

    /// Area described by a header destination; `None` for unknown shapes.
    pub fn from_destination(destination: &Destination) -> Option<Self> {
        let shape = match destination.shape {
            Shape::Circle => AreaShape::Circle {
                radius: destination.distance_a,
            },
            Shape::Rectangle => AreaShape::Rectangle {
                a: destination.distance_a,
                b: destination.distance_b,
            },
            Shape::Ellipse => AreaShape::Ellipse {
                a: destination.distance_a,
                b: destination.distance_b,
            },
            Shape::Other(_) => return None,
        };

        Some(Self {
            latitude: f64::from(destination.latitude) / COORDINATE_SCALE,
            longitude: f64::from(destination.longitude) / COORDINATE_SCALE,
            angle: destination.angle,
            shape,
        })
    }
}

fn to_fixed_point(degrees: f64) -> i32 {
    (degrees * COORDINATE_SCALE).round() as i32
}

/// Packet delivered to the entity by the simulated network layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkIndication {
    pub its_aid: Option<ItsAid>,
    /// Raw GeoNetworking traffic class
    pub traffic_class: u8,
    pub remaining_lifetime: Option<Duration>,
    pub destination_port: u16,
    pub destination_port_info: Option<u16>,
    pub area: Option<GeoArea>,
    /// Opaque security permission bits
    pub permissions: Option<Vec<u8>>,
}

/// GeoNetworking transport type of a request into the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    /// Geo-broadcast
    Gbc,
    /// Geo-unicast
    Guc,
    /// Single-hop broadcast
    Shb,
}

/// Network-layer send request built from a hardware Data Indication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRequest {
    pub transport: TransportType,
    pub destination_port: u16,
    pub destination_port_info: u16,
    pub area: Option<GeoArea>,
    pub its_aid: ItsAid,
    pub lifetime: Duration,
    pub traffic_class: u8,
}

/// Decoded hardware packet ready to be sent into the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundPacket {
    pub request: NetworkRequest,
    pub payload: Bytes,
    pub header: DataIndicationHeader,
}

/// Bridges one simulated entity to the radio unit.
pub struct HardwareAgent {
    entity: EntityId,
    endpoint: Endpoint,
    port_table: Option<PortTable>,
}

impl HardwareAgent {
    /// Creates and connects the entity's endpoint.
    ///
    /// An unusable local bind address falls back to an ephemeral port.
    ///
    /// # Errors
    ///
    /// - `AgentError::Endpoint` - Socket creation or connect failed
    pub fn initialize<E>(
        scheduler: &mut RealTimeScheduler<E>,
        entity: EntityId,
        config: &AgentConfig,
        port_table: Option<PortTable>,
    ) -> Result<Self, AgentError> {
        let mut endpoint = match scheduler.create_endpoint(entity, config.local_addr) {
            Ok(endpoint) => endpoint,
            Err(EndpointError::Bind { address, source }) => {
                tracing::warn!(
                    "Could not bind {} for {}: {}, using an ephemeral port",
                    address,
                    entity,
                    source
                );
                scheduler.create_endpoint(entity, None)?
            }
            Err(e) => return Err(e.into()),
        };

        endpoint.set_write_timeout(config.send_timeout);
        endpoint.connect(config.remote_addr)?;

        tracing::info!(
            "Hardware agent for {} listening on {}, radio unit at {}",
            entity,
            endpoint.local_addr(),
            config.remote_addr
        );

        Ok(Self {
            entity,
            endpoint,
            port_table,
        })
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint.id()
    }

    /// Mirrors a simulated packet to the radio unit.
    ///
    /// # Errors
    ///
    /// - `AgentError::PayloadTooLarge` - Payload length does not fit the header
    /// - `AgentError::Endpoint` - Send failed; not retried
    pub fn forward(
        &self,
        indication: &NetworkIndication,
        payload: &[u8],
    ) -> Result<usize, AgentError> {
        let header = self.build_request(indication, payload.len())?;
        let encoded = header.serialize();
        let sent = self.endpoint.write(&[encoded.as_ref(), payload])?;

        tracing::debug!(
            "{} forwarded {} ({} payload bytes)",
            self.entity,
            header.its_aid,
            payload.len()
        );
        Ok(sent)
    }

    /// Builds the Data Request header for a simulated packet.
    ///
    /// # Errors
    ///
    /// - `AgentError::PayloadTooLarge` - `payload_len` exceeds `u16::MAX`
    pub fn build_request(
        &self,
        indication: &NetworkIndication,
        payload_len: usize,
    ) -> Result<DataRequestHeader, AgentError> {
        let data_length =
            u16::try_from(payload_len).map_err(|_| AgentError::PayloadTooLarge { len: payload_len })?;

        let its_aid = self.classify(indication);
        let transport = transport_for(its_aid).unwrap_or_else(|| {
            tracing::warn!("No packet transport known for {}, using raw 0", its_aid);
            PacketTransport::Other(0)
        });

        let destination = match &indication.area {
            Some(area) => area.to_destination(),
            None => {
                tracing::warn!("Packet has no destination area, using a zeroed destination");
                Destination::default()
            }
        };

        let max_lifetime = indication
            .remaining_lifetime
            .map(|lifetime| u8::try_from(lifetime.as_secs()).unwrap_or(u8::MAX))
            .unwrap_or(0);

        let mut header = DataRequestHeader {
            packet_type: PacketType::BtpB,
            transport,
            traffic_class: indication.traffic_class.into(),
            max_lifetime,
            destination_port: indication.destination_port,
            destination_port_info: indication.destination_port_info.unwrap_or(0),
            destination,
            comms_profile: CommsProfile::G5,
            repeat_interval: 0,
            its_aid,
            data_length,
            ..Default::default()
        };

        if let Some(permissions) = &indication.permissions {
            header.security_profile = SecurityProfile::Enabled;
            if permissions.len() > SSP_BITS_LEN {
                tracing::warn!(
                    "Permission bits of {} bytes exceed {} bytes, sending zeroed bits",
                    permissions.len(),
                    SSP_BITS_LEN
                );
            } else {
                header.ssp_bits[..permissions.len()].copy_from_slice(permissions);
                header.ssp_bits_length = permissions.len() as u8;
            }
        }

        Ok(header)
    }

    /// Decodes a datagram received by this agent's endpoint.
    ///
    /// Malformed datagrams are logged and dropped.
    pub fn handle_datagram(&self, datagram: &InboundDatagram) -> Option<InboundPacket> {
        match decode_datagram(&datagram.data) {
            Ok(packet) => {
                tracing::info!(
                    "{} received {} from hardware ({} payload bytes)",
                    self.entity,
                    packet.request.its_aid,
                    packet.payload.len()
                );
                Some(packet)
            }
            Err(e) => {
                let preview = &datagram.data[..datagram.len().min(16)];
                tracing::warn!(
                    "{} dropped hardware datagram ({}...): {}",
                    self.entity,
                    hex::encode(preview),
                    e
                );
                None
            }
        }
    }

    /// Releases the endpoint; datagrams still queued for it are discarded.
    pub fn teardown<E>(self, scheduler: &mut RealTimeScheduler<E>) {
        tracing::info!("Hardware agent for {} shutting down", self.entity);
        self.endpoint.teardown(scheduler);
    }

    fn classify(&self, indication: &NetworkIndication) -> ItsAid {
        if let Some(aid) = indication.its_aid {
            return aid;
        }

        match &self.port_table {
            Some(table) => table.lookup(indication.destination_port).unwrap_or_else(|| {
                tracing::warn!(
                    "Unclassified destination port {}, using application id 0",
                    indication.destination_port
                );
                ItsAid::Other(0)
            }),
            None => {
                tracing::warn!("Packet carries no application id, using 0");
                ItsAid::Other(0)
            }
        }
    }
}

/// Splits a hardware datagram into its Data Indication and payload.
///
/// # Errors
///
/// - `AgentError::ShortDatagram` - Fewer bytes than one header
/// - `AgentError::Codec` - Header could not be decoded
pub fn decode_datagram(data: &Bytes) -> Result<InboundPacket, AgentError> {
    if data.len() < DataIndicationHeader::SIZE {
        return Err(AgentError::ShortDatagram { len: data.len() });
    }

    let header = DataIndicationHeader::deserialize(&data[..DataIndicationHeader::SIZE])?;
    let payload = data.slice(DataIndicationHeader::SIZE..);
    if usize::from(header.data_length) != payload.len() {
        tracing::debug!(
            "Indication announces {} payload bytes, datagram carries {}",
            header.data_length,
            payload.len()
        );
    }

    let transport = match header.transport {
        PacketTransport::GeoBroadcast => TransportType::Gbc,
        PacketTransport::GeoUnicast => TransportType::Guc,
        PacketTransport::SingleHopBroadcast => TransportType::Shb,
        PacketTransport::Other(raw) => {
            tracing::warn!("Unknown packet transport {}, treating as single-hop broadcast", raw);
            TransportType::Shb
        }
    };

    let area = GeoArea::from_destination(&header.destination);
    if area.is_none() {
        tracing::warn!("Indication destination has an unknown shape");
    }

    let request = NetworkRequest {
        transport,
        destination_port: header.destination_port,
        destination_port_info: header.destination_port_info,
        area,
        its_aid: header.its_aid,
        lifetime: Duration::from_secs(u64::from(header.max_lifetime)),
        traffic_class: header.traffic_class.into(),
    };

    Ok(InboundPacket {
        request,
        payload,
        header,
    })
}
