//! Data Indication header: hardware to simulation.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::CodecError;
use super::primitives::{
    put_destination, put_padding, read_array, read_destination, read_u8, read_u16, read_u32,
    skip_padding,
};
use super::types::{
    CERT_ID_LEN, Destination, ItsAid, PacketTransport, PacketType, SSP_BITS_LEN, SecurityProfile,
    TrafficClass,
};

/// Fixed 48-byte header the hardware prepends to every received packet.
///
/// Shares its leading fields with [`DataRequestHeader`](super::DataRequestHeader)
/// but carries the signer's certificate id instead of the comms profile and
/// repeat interval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataIndicationHeader {
    pub packet_type: PacketType,
    pub transport: PacketTransport,
    pub traffic_class: TrafficClass,
    pub max_lifetime: u8,
    pub destination_port: u16,
    pub destination_port_info: u16,
    pub destination: Destination,
    pub security_profile: SecurityProfile,
    pub ssp_bits_length: u8,
    pub its_aid: ItsAid,
    pub ssp_bits: [u8; SSP_BITS_LEN],
    pub cert_id: [u8; CERT_ID_LEN],
    pub data_length: u16,
}

impl DataIndicationHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 48;

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

        buf.put_u8(self.security_profile.into());
        put_padding(buf, 2);
        buf.put_u8(self.ssp_bits_length);
        buf.put_u32(self.its_aid.into());

        buf.put_slice(&self.ssp_bits);
        buf.put_slice(&self.cert_id);
        buf.put_u16(self.data_length);
    }

    /// Serializes into a standalone 48-byte buffer.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf);
        debug_assert_eq!(buf.len(), Self::SIZE);
        buf.freeze()
    }

    /// Decodes a header from the front of `buf`, leaving the payload behind it.
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
        let security_profile = read_u8(buf, "security profile")?.into();
        skip_padding(buf, 2)?;
        let ssp_bits_length = read_u8(buf, "ssp bits length")?;
        let its_aid = read_u32(buf, "its aid")?.into();
        let ssp_bits = read_array(buf, "ssp bits")?;
        let cert_id = read_array(buf, "certificate id")?;
        let data_length = read_u16(buf, "data length")?;

        Ok(Self {
            packet_type,
            transport,
            traffic_class,
            max_lifetime,
            destination_port,
            destination_port_info,
            destination,
            security_profile,
            ssp_bits_length,
            its_aid,
            ssp_bits,
            cert_id,
            data_length,
        })
    }

    /// Deserializes exactly one header.
    ///
    /// # Errors
    ///
    /// - `CodecError::LengthMismatch` - `data` is not exactly 48 bytes
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

    fn sample_indication() -> DataIndicationHeader {
        DataIndicationHeader {
            packet_type: PacketType::BtpB,
            transport: PacketTransport::SingleHopBroadcast,
            traffic_class: TrafficClass::Cam,
            max_lifetime: 1,
            destination_port: 2001,
            destination_port_info: 0,
            destination: Destination::circle(485_000_000, 90_000_000, 500, 0),
            security_profile: SecurityProfile::Enabled,
            ssp_bits_length: 2,
            its_aid: ItsAid::Cam,
            ssp_bits: [0x01, 0x00, 0, 0, 0, 0],
            cert_id: [0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8],
            data_length: 64,
        }
    }

    #[test]
    fn test_serialized_layout() {
        let bytes = sample_indication().serialize();

        assert_eq!(bytes.len(), DataIndicationHeader::SIZE);
        assert_eq!(bytes[22], u8::from(Shape::Circle));
        assert_eq!(&bytes[23..28], &[0, 1, 0, 0, 2]);
        assert_eq!(&bytes[28..32], &0x24u32.to_be_bytes());
        assert_eq!(&bytes[38..46], &[0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8]);
        assert_eq!(&bytes[46..48], &64u16.to_be_bytes());
    }

    #[test]
    fn test_round_trip_with_dirty_padding() {
        let mut bytes = sample_indication().serialize().to_vec();
        bytes[23] = 0x11;
        bytes[25] = 0x22;
        bytes[26] = 0x33;

        let decoded = DataIndicationHeader::deserialize(&bytes).unwrap();
        assert_eq!(decoded, sample_indication());
        assert_eq!(decoded.ssp_bits(), &[0x01, 0x00]);
    }

    #[test]
    fn test_length_guard() {
        let bytes = sample_indication().serialize();

        for len in [0, 40, 47, 49] {
            let mut data = bytes.to_vec();
            data.resize(len, 0);
            assert!(matches!(
                DataIndicationHeader::deserialize(&data),
                Err(CodecError::LengthMismatch { expected: 48, .. })
            ));
        }
    }

    #[test]
    fn test_truncated_in_certificate_id() {
        let bytes = sample_indication().serialize();
        let mut prefix = &bytes[..42];

        let err = DataIndicationHeader::decode(&mut prefix).unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                field: "certificate id",
                needed: 8,
                remaining: 4
            }
        );
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            head in any::<[u8; 4]>(),
            ports in any::<(u16, u16)>(),
            coords in any::<(i32, i32)>(),
            dims in any::<(u16, u16, u16, u8)>(),
            security in any::<(u8, u8, u32)>(),
            ssp_bits in any::<[u8; 6]>(),
            cert_id in any::<[u8; 8]>(),
            data_length in any::<u16>(),
        ) {
            let header = DataIndicationHeader {
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
                security_profile: security.0.into(),
                ssp_bits_length: security.1,
                its_aid: security.2.into(),
                ssp_bits,
                cert_id,
                data_length,
            };

            let bytes = header.serialize();
            prop_assert_eq!(bytes.len(), DataIndicationHeader::SIZE);
            prop_assert_eq!(DataIndicationHeader::deserialize(&bytes), Ok(header));
        }
    }
}
