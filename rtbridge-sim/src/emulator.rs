//! Stand-in for the V2X radio unit.
//!
//! Speaks the hardware side of the UDP interface: receives Data Requests
//! from the bridge and sends Data Indications back to an entity's receive
//! address.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, Bytes};
use rtbridge_core::wire::{CodecError, DataIndicationHeader, DataRequestHeader};
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Largest datagram the emulator accepts.
const MAX_DATAGRAM_SIZE: usize = 4096;

/// Errors raised by the hardware emulator.
#[derive(Debug, thiserror::Error)]
pub enum EmulatorError {
    #[error("Emulator socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No data request within {after:?}")]
    Timeout { after: Duration },

    #[error("Malformed data request from {from}: {source}")]
    Malformed {
        from: SocketAddr,
        #[source]
        source: CodecError,
    },
}

/// Data Request received from the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedRequest {
    pub from: SocketAddr,
    pub header: DataRequestHeader,
    pub payload: Bytes,
}

/// UDP peer emulating the radio unit.
pub struct HardwareEmulator {
    socket: UdpSocket,
    receive_timeout: Duration,
    certificate_id: [u8; 8],
}

impl HardwareEmulator {
    /// Binds the emulator to `addr`.
    ///
    /// # Errors
    ///
    /// - `EmulatorError::Io` - Address unavailable
    pub async fn bind(addr: SocketAddr) -> Result<Self, EmulatorError> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::info!("Hardware emulator listening on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            receive_timeout: Duration::from_secs(5),
            certificate_id: [0; 8],
        })
    }

    /// Sets how long `receive_request` waits for a datagram.
    pub fn with_receive_timeout(mut self, receive_timeout: Duration) -> Self {
        self.receive_timeout = receive_timeout;
        self
    }

    /// Sets the certificate id stamped on every indication.
    pub fn with_certificate_id(mut self, certificate_id: [u8; 8]) -> Self {
        self.certificate_id = certificate_id;
        self
    }

    /// # Errors
    ///
    /// - `EmulatorError::Io` - Socket has no local address
    pub fn local_addr(&self) -> Result<SocketAddr, EmulatorError> {
        Ok(self.socket.local_addr()?)
    }

    /// Waits for the next Data Request.
    ///
    /// # Errors
    ///
    /// - `EmulatorError::Timeout` - Nothing arrived within the receive timeout
    /// - `EmulatorError::Malformed` - Datagram does not start with a request header
    pub async fn receive_request(&self) -> Result<ReceivedRequest, EmulatorError> {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, from) = timeout(self.receive_timeout, self.socket.recv_from(&mut buffer))
            .await
            .map_err(|_| EmulatorError::Timeout {
                after: self.receive_timeout,
            })??;

        let mut datagram = Bytes::copy_from_slice(&buffer[..len]);
        let header = DataRequestHeader::decode(&mut datagram)
            .map_err(|source| EmulatorError::Malformed { from, source })?;
        let payload = datagram.copy_to_bytes(datagram.remaining());

        tracing::debug!(
            "Emulator received {} request from {} ({} payload bytes)",
            header.its_aid,
            from,
            payload.len()
        );
        Ok(ReceivedRequest {
            from,
            header,
            payload,
        })
    }

    /// Sends one Data Indication followed by `payload` to `target`.
    ///
    /// # Errors
    ///
    /// - `EmulatorError::Io` - Send failed
    pub async fn send_indication(
        &self,
        target: SocketAddr,
        header: &DataIndicationHeader,
        payload: &[u8],
    ) -> Result<usize, EmulatorError> {
        let mut datagram = Vec::with_capacity(DataIndicationHeader::SIZE + payload.len());
        datagram.extend_from_slice(&header.serialize());
        datagram.extend_from_slice(payload);
        Ok(self.socket.send_to(&datagram, target).await?)
    }

    /// Answers `count` requests by sending each one back to `target` as an
    /// indication, as if another station had broadcast it.
    ///
    /// Malformed requests are logged and not counted.
    ///
    /// # Errors
    ///
    /// - `EmulatorError::Timeout` - Fewer than `count` requests arrived in time
    /// - `EmulatorError::Io` - Socket failure
    pub async fn reflect_to(
        &self,
        target: SocketAddr,
        count: usize,
    ) -> Result<Vec<ReceivedRequest>, EmulatorError> {
        let mut reflected = Vec::with_capacity(count);
        while reflected.len() < count {
            let request = match self.receive_request().await {
                Ok(request) => request,
                Err(EmulatorError::Malformed { from, source }) => {
                    tracing::warn!("Ignoring malformed request from {}: {}", from, source);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let indication = indication_for(&request.header, self.certificate_id);
            self.send_indication(target, &indication, &request.payload)
                .await?;
            reflected.push(request);
        }
        Ok(reflected)
    }
}

/// Indication the radio unit would deliver for a received request.
pub fn indication_for(request: &DataRequestHeader, certificate_id: [u8; 8]) -> DataIndicationHeader {
    DataIndicationHeader {
        packet_type: request.packet_type,
        transport: request.transport,
        traffic_class: request.traffic_class,
        max_lifetime: request.max_lifetime,
        destination_port: request.destination_port,
        destination_port_info: request.destination_port_info,
        destination: request.destination,
        security_profile: request.security_profile,
        ssp_bits_length: request.ssp_bits_length,
        its_aid: request.its_aid,
        ssp_bits: request.ssp_bits,
        cert_id: certificate_id,
        data_length: request.data_length,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rtbridge_core::wire::{Destination, ItsAid, PacketTransport, PacketType};

    use super::*;

    fn cam_request(data_length: u16) -> DataRequestHeader {
        DataRequestHeader {
            packet_type: PacketType::BtpB,
            transport: PacketTransport::SingleHopBroadcast,
            destination_port: 2001,
            destination: Destination::circle(1, 2, 3, 0),
            its_aid: ItsAid::Cam,
            data_length,
            ..Default::default()
        }
    }

    #[test]
    fn test_indication_mirrors_request() {
        let request = cam_request(9);
        let indication = indication_for(&request, [7; 8]);

        assert_eq!(indication.its_aid, ItsAid::Cam);
        assert_eq!(indication.destination, request.destination);
        assert_eq!(indication.cert_id, [7; 8]);
        assert_eq!(indication.data_length, 9);
    }

    proptest! {
        #[test]
        fn prop_indication_decodes_to_request_fields(
            port in any::<u16>(),
            data_length in any::<u16>(),
            latitude in -900_000_000i32..=900_000_000,
        ) {
            let request = DataRequestHeader {
                destination_port: port,
                destination: Destination::circle(latitude, 0, 10, 0),
                ..cam_request(data_length)
            };
            let bytes = indication_for(&request, [1; 8]).serialize();
            let decoded = DataIndicationHeader::deserialize(&bytes).unwrap();

            prop_assert_eq!(decoded.destination_port, port);
            prop_assert_eq!(decoded.data_length, data_length);
            prop_assert_eq!(decoded.destination.latitude, latitude);
        }
    }

    #[tokio::test]
    async fn test_reflects_request_to_target() {
        let emulator = HardwareEmulator::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
            .with_receive_timeout(Duration::from_secs(2))
            .with_certificate_id([0xC0; 8]);
        let bridge = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let entity = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut datagram = cam_request(3).serialize().to_vec();
        datagram.extend_from_slice(b"xyz");
        bridge
            .send_to(&datagram, emulator.local_addr().unwrap())
            .await
            .unwrap();

        let reflected = emulator
            .reflect_to(entity.local_addr().unwrap(), 1)
            .await
            .unwrap();
        assert_eq!(reflected[0].from, bridge.local_addr().unwrap());
        assert_eq!(reflected[0].payload, Bytes::from_static(b"xyz"));

        let mut buffer = [0u8; 128];
        let (len, _) = entity.recv_from(&mut buffer).await.unwrap();
        let indication = DataIndicationHeader::deserialize(&buffer[..DataIndicationHeader::SIZE]).unwrap();
        assert_eq!(indication.its_aid, ItsAid::Cam);
        assert_eq!(indication.cert_id, [0xC0; 8]);
        assert_eq!(&buffer[DataIndicationHeader::SIZE..len], b"xyz");
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let emulator = HardwareEmulator::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
            .with_receive_timeout(Duration::from_millis(20));

        assert!(matches!(
            emulator.receive_request().await,
            Err(EmulatorError::Timeout { .. })
        ));
    }
}
