//! Data Request header: simulation to hardware.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::CodecError;
use super::primitives::{
    put_destination, put_padding, read_array, read_destination, read_u8, read_u16, read_u32,
    skip_padding,
};
use super::types::{
    CommsProfile, Destination, ItsAid, PacketTransport, PacketType, SSP_BITS_LEN,
    SecurityProfile, TrafficClass,
};

/// Fixed 40-byte header preceding every payload sent to the hardware.
///
/// Built fresh for each outbound packet and never mutated after
/// serialization. `Default` yields the all-zero header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataRequestHeader {
    pub packet_type: PacketType,
    pub transport: PacketTransport,
    pub traffic_class: TrafficClass,
    /// Maximum packet lifetime in seconds
    pub max_lifetime: u8,
    pub destination_port: u16,
    pub destination_port_info: u16,
    pub destination: Destination,
    pub comms_profile: CommsProfile,
    pub repeat_interval: u8,
    pub security_profile: SecurityProfile,
    /// Number of meaningful bytes in `ssp_bits`
    pub ssp_bits_length: u8,
    pub its_aid: ItsAid,
    pub ssp_bits: [u8; SSP_BITS_LEN],
    /// Length of the payload following the header
    pub data_length: u16,
}

impl DataRequestHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 40;

    /// Appends the encoded header to `buf`.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.packet_type.into());
        buf.put_u8(self.transport.into());
        buf.put_u8(self.traffic_class.into());
        buf.put_u8(self.max_lifetime);

        buf.put_u16(self.destination_port);
        buf.put_u16(self.destination_port_info);
        put_destination(buf, &self.destination);
        put_padding(buf, 1);

        buf.put_u8(self.comms_profile.into());
        buf.put_u8(self.repeat_interval);
        buf.put_u8(self.security_profile.into());
        buf.put_u8(self.ssp_bits_length);
        buf.put_u32(self.its_aid.into());

        buf.put_slice(&self.ssp_bits);
        buf.put_u16(self.data_length);
    }

    /// Serializes into a standalone 40-byte buffer.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf);
        debug_assert_eq!(buf.len(), Self::SIZE);
        buf.freeze()
    }

    /// Decodes a header from the front of `buf`, leaving any payload behind it.
    ///
    /// # Errors
    ///
    /// - `CodecError::Truncated` - `buf` ends inside the header
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        let packet_type = read_u8(buf, "packet type")?.into();
        let transport = read_u8(buf, "packet transport")?.into();
        let traffic_class = read_u8(buf, "traffic class")?.into();
        let max_lifetime = read_u8(buf, "max lifetime")?;
        let destination_port = read_u16(buf, "destination port")?;
        let destination_port_info = read_u16(buf, "destination port info")?;
        let destination = read_destination(buf)?;
        skip_padding(buf, 1)?;
        let comms_profile = read_u8(buf, "comms profile")?.into();
        let repeat_interval = read_u8(buf, "repeat interval")?;
        let security_profile = read_u8(buf, "security profile")?.into();
        let ssp_bits_length = read_u8(buf, "ssp bits length")?;
        let its_aid = read_u32(buf, "its aid")?.into();
        let ssp_bits = read_array(buf, "ssp bits")?;
        let data_length = read_u16(buf, "data length")?;

        Ok(Self {
            packet_type,
            transport,
            traffic_class,
            max_lifetime,
            destination_port,
            destination_port_info,
            destination,
            comms_profile,
            repeat_interval,
            security_profile,
            ssp_bits_length,
            its_aid,
            ssp_bits,
            data_length,
        })
    }

    /// Deserializes exactly one header.
    ///
    /// # Errors
    ///
    /// - `CodecError::LengthMismatch` - `data` is not exactly 40 bytes
    /// - `CodecError::Truncated` - A field could not be read
    pub fn deserialize(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() != Self::SIZE {
            return Err(CodecError::LengthMismatch {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = data;
        Self::decode(&mut cursor)
    }

    /// Returns the meaningful prefix of the permission bits.
    pub fn ssp_bits(&self) -> &[u8] {
        let len = usize::from(self.ssp_bits_length).min(SSP_BITS_LEN);
        &self.ssp_bits[..len]
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::wire::Shape;

    fn sample_request() -> DataRequestHeader {
        DataRequestHeader {
            packet_type: PacketType::BtpB,
            transport: PacketTransport::GeoBroadcast,
            traffic_class: TrafficClass::Denm,
            max_lifetime: 60,
            destination_port: 2002,
            destination_port_info: 0x0102,
            destination: Destination::rectangle(485_123_456, -90_654_321, 100, 50, 900),
            comms_profile: CommsProfile::G5,
            repeat_interval: 0,
            security_profile: SecurityProfile::Enabled,
            ssp_bits_length: 3,
            its_aid: ItsAid::Cam,
            ssp_bits: [0x01, 0xFF, 0xFC, 0, 0, 0],
            data_length: 321,
        }
    }

    #[test]
    fn test_serialized_layout() {
        let bytes = sample_request().serialize();

        assert_eq!(bytes.len(), DataRequestHeader::SIZE);
        assert_eq!(&bytes[..4], &[2, 4, 0x01, 60]);
        assert_eq!(&bytes[4..8], &[0x07, 0xD2, 0x01, 0x02]);
        assert_eq!(&bytes[20..22], &900u16.to_be_bytes());
        assert_eq!(bytes[22], 1, "shape byte");
        assert_eq!(bytes[23], 0, "padding");
        assert_eq!(&bytes[24..28], &[0, 0, 1, 3]);
        assert_eq!(&bytes[28..32], &0x24u32.to_be_bytes());
        assert_eq!(&bytes[32..38], &[0x01, 0xFF, 0xFC, 0, 0, 0]);
        assert_eq!(&bytes[38..40], &321u16.to_be_bytes());
    }

    #[test]
    fn test_rectangle_cam_end_to_end() {
        let header = DataRequestHeader {
            destination: Destination::rectangle(0, 0, 100, 50, 900),
            its_aid: ItsAid::Cam,
            ..Default::default()
        };

        let bytes = header.serialize();
        let decoded = DataRequestHeader::deserialize(&bytes).unwrap();

        assert_eq!(decoded, header);
        assert_eq!(decoded.destination.shape, Shape::Rectangle);
        assert_eq!(decoded.destination.distance_a, 100);
        assert_eq!(decoded.destination.distance_b, 50);
        assert_eq!(decoded.destination.angle, 900);
        assert_eq!(bytes[22], u8::from(Shape::Rectangle));
    }

    #[test]
    fn test_padding_tolerated_on_read() {
        let mut bytes = sample_request().serialize().to_vec();
        bytes[23] = 0xEE;

        let decoded = DataRequestHeader::deserialize(&bytes).unwrap();
        assert_eq!(decoded, sample_request());
    }

    #[test]
    fn test_length_guard() {
        let bytes = sample_request().serialize();

        for len in [0, 1, 39, 41, 48] {
            let mut data = bytes.to_vec();
            data.resize(len, 0);
            assert_eq!(
                DataRequestHeader::deserialize(&data),
                Err(CodecError::LengthMismatch {
                    expected: 40,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn test_truncated_prefix_fails_on_decode() {
        let bytes = sample_request().serialize();
        let mut prefix = &bytes[..39];

        let err = DataRequestHeader::decode(&mut prefix).unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                field: "data length",
                needed: 2,
                remaining: 1
            }
        );
    }

    #[test]
    fn test_decode_leaves_payload() {
        let mut datagram = sample_request().serialize().to_vec();
        datagram.extend_from_slice(b"payload");

        let mut cursor = datagram.as_slice();
        let header = DataRequestHeader::decode(&mut cursor).unwrap();

        assert_eq!(header.ssp_bits(), &[0x01, 0xFF, 0xFC]);
        assert_eq!(cursor, b"payload");
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            head in any::<[u8; 4]>(),
            ports in any::<(u16, u16)>(),
            coords in any::<(i32, i32)>(),
            dims in any::<(u16, u16, u16, u8)>(),
            tail in any::<(u8, u8, u8, u8, u32)>(),
            ssp_bits in any::<[u8; 6]>(),
            data_length in any::<u16>(),
        ) {
            let header = DataRequestHeader {
                packet_type: head[0].into(),
                transport: head[1].into(),
                traffic_class: head[2].into(),
                max_lifetime: head[3],
                destination_port: ports.0,
                destination_port_info: ports.1,
                destination: Destination {
                    latitude: coords.0,
                    longitude: coords.1,
                    distance_a: dims.0,
                    distance_b: dims.1,
                    angle: dims.2,
                    shape: dims.3.into(),
                },
                comms_profile: tail.0.into(),
                repeat_interval: tail.1,
                security_profile: tail.2.into(),
                ssp_bits_length: tail.3,
                its_aid: tail.4.into(),
                ssp_bits,
                data_length,
            };

            let bytes = header.serialize();
            prop_assert_eq!(bytes.len(), DataRequestHeader::SIZE);
            prop_assert_eq!(DataRequestHeader::deserialize(&bytes), Ok(header));
        }

        #[test]
        fn prop_never_panics_on_short_input(data in proptest::collection::vec(any::<u8>(), 0..40)) {
            let mut cursor = data.as_slice();
            prop_assert!(DataRequestHeader::decode(&mut cursor).is_err());
        }
    }
}
