//! Field types and enumerations of the hardware header format.
//!
//! Raw values are fixed by the radio vendor's UDP interface. Every
//! enumeration keeps unknown raw values in an `Other` variant so that
//! decoding never fails for value reasons and re-encoding is lossless.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of security permission (SSP) bytes carried in both headers.
pub const SSP_BITS_LEN: usize = 6;

/// Number of certificate id bytes carried in a data indication.
pub const CERT_ID_LEN: usize = 8;

/// Transport-layer packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    /// BTP-B (non-interactive transport)
    BtpB,
    Other(u8),
}

impl From<u8> for PacketType {
    fn from(raw: u8) -> Self {
        match raw {
            2 => PacketType::BtpB,
            other => PacketType::Other(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        match value {
            PacketType::BtpB => 2,
            PacketType::Other(raw) => raw,
        }
    }
}

impl Default for PacketType {
    fn default() -> Self {
        PacketType::Other(0)
    }
}

/// GeoNetworking packet transport mode as encoded by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketTransport {
    GeoUnicast,
    GeoBroadcast,
    SingleHopBroadcast,
    Other(u8),
}

impl From<u8> for PacketTransport {
    fn from(raw: u8) -> Self {
        match raw {
            2 => PacketTransport::GeoUnicast,
            4 => PacketTransport::GeoBroadcast,
            7 => PacketTransport::SingleHopBroadcast,
            other => PacketTransport::Other(other),
        }
    }
}

impl From<PacketTransport> for u8 {
    fn from(value: PacketTransport) -> Self {
        match value {
            PacketTransport::GeoUnicast => 2,
            PacketTransport::GeoBroadcast => 4,
            PacketTransport::SingleHopBroadcast => 7,
            PacketTransport::Other(raw) => raw,
        }
    }
}

impl Default for PacketTransport {
    fn default() -> Self {
        PacketTransport::Other(0)
    }
}

/// GeoNetworking traffic class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficClass {
    Denm,
    Cam,
    /// Shared class of MAP, SPAT, IVIM and SAEM
    Infrastructure,
    /// Service channel
    Sch,
    Other(u8),
}

impl From<u8> for TrafficClass {
    fn from(raw: u8) -> Self {
        match raw {
            0x01 => TrafficClass::Denm,
            0x02 => TrafficClass::Cam,
            0x03 => TrafficClass::Infrastructure,
            0x09 => TrafficClass::Sch,
            other => TrafficClass::Other(other),
        }
    }
}

impl From<TrafficClass> for u8 {
    fn from(value: TrafficClass) -> Self {
        match value {
            TrafficClass::Denm => 0x01,
            TrafficClass::Cam => 0x02,
            TrafficClass::Infrastructure => 0x03,
            TrafficClass::Sch => 0x09,
            TrafficClass::Other(raw) => raw,
        }
    }
}

impl Default for TrafficClass {
    fn default() -> Self {
        TrafficClass::Other(0)
    }
}

/// Geometric shape of a destination area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    #[default]
    Circle,
    Rectangle,
    Ellipse,
    Other(u8),
}

impl From<u8> for Shape {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Shape::Circle,
            1 => Shape::Rectangle,
            2 => Shape::Ellipse,
            other => Shape::Other(other),
        }
    }
}

impl From<Shape> for u8 {
    fn from(value: Shape) -> Self {
        match value {
            Shape::Circle => 0,
            Shape::Rectangle => 1,
            Shape::Ellipse => 2,
            Shape::Other(raw) => raw,
        }
    }
}

/// Radio communications profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommsProfile {
    /// ITS-G5
    #[default]
    G5,
    Other(u8),
}

impl From<u8> for CommsProfile {
    fn from(raw: u8) -> Self {
        match raw {
            0 => CommsProfile::G5,
            other => CommsProfile::Other(other),
        }
    }
}

impl From<CommsProfile> for u8 {
    fn from(value: CommsProfile) -> Self {
        match value {
            CommsProfile::G5 => 0,
            CommsProfile::Other(raw) => raw,
        }
    }
}

/// Whether the hardware signs/verifies the packet. Carried, not interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityProfile {
    #[default]
    Disabled,
    Enabled,
    Other(u8),
}

impl From<u8> for SecurityProfile {
    fn from(raw: u8) -> Self {
        match raw {
            0 => SecurityProfile::Disabled,
            1 => SecurityProfile::Enabled,
            other => SecurityProfile::Other(other),
        }
    }
}

impl From<SecurityProfile> for u8 {
    fn from(value: SecurityProfile) -> Self {
        match value {
            SecurityProfile::Disabled => 0,
            SecurityProfile::Enabled => 1,
            SecurityProfile::Other(raw) => raw,
        }
    }
}

/// ITS application identifier (ITS-AID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItsAid {
    Cam,
    Denm,
    Map,
    Spat,
    Ivi,
    Saem,
    Cpm,
    Other(u32),
}

impl From<u32> for ItsAid {
    fn from(raw: u32) -> Self {
        match raw {
            0x24 => ItsAid::Cam,
            0x25 => ItsAid::Denm,
            0x8A => ItsAid::Map,
            0x89 => ItsAid::Spat,
            0x8B => ItsAid::Ivi,
            0x84081 => ItsAid::Saem,
            0x27F => ItsAid::Cpm,
            other => ItsAid::Other(other),
        }
    }
}

impl From<ItsAid> for u32 {
    fn from(value: ItsAid) -> Self {
        match value {
            ItsAid::Cam => 0x24,
            ItsAid::Denm => 0x25,
            ItsAid::Map => 0x8A,
            ItsAid::Spat => 0x89,
            ItsAid::Ivi => 0x8B,
            ItsAid::Saem => 0x84081,
            ItsAid::Cpm => 0x27F,
            ItsAid::Other(raw) => raw,
        }
    }
}

impl Default for ItsAid {
    fn default() -> Self {
        ItsAid::Other(0)
    }
}

impl fmt::Display for ItsAid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", u32::from(*self))
    }
}

/// Geographic broadcast/unicast target.
///
/// Coordinates are fixed point in 1/10 microdegree. Distances are meters and
/// their meaning depends on the shape: a circle only uses `distance_a` (the
/// radius) and keeps `distance_b` at zero, rectangles and ellipses use both.
/// The angle is in degrees from north.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub latitude: i32,
    pub longitude: i32,
    pub distance_a: u16,
    pub distance_b: u16,
    pub angle: u16,
    pub shape: Shape,
}

impl Destination {
    pub fn circle(latitude: i32, longitude: i32, radius: u16, angle: u16) -> Self {
        Self {
            latitude,
            longitude,
            distance_a: radius,
            distance_b: 0,
            angle,
            shape: Shape::Circle,
        }
    }

    pub fn rectangle(latitude: i32, longitude: i32, a: u16, b: u16, angle: u16) -> Self {
        Self {
            latitude,
            longitude,
            distance_a: a,
            distance_b: b,
            angle,
            shape: Shape::Rectangle,
        }
    }

    pub fn ellipse(latitude: i32, longitude: i32, a: u16, b: u16, angle: u16) -> Self {
        Self {
            latitude,
            longitude,
            distance_a: a,
            distance_b: b,
            angle,
            shape: Shape::Ellipse,
        }
    }

    /// Checks that unused distance fields are zero for the shape.
    pub fn is_consistent(&self) -> bool {
        match self.shape {
            Shape::Circle => self.distance_b == 0,
            Shape::Rectangle | Shape::Ellipse => true,
            Shape::Other(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_raw_values() {
        assert_eq!(u8::from(PacketType::BtpB), 2);
        assert_eq!(u8::from(PacketTransport::SingleHopBroadcast), 7);
        assert_eq!(u8::from(TrafficClass::Sch), 0x09);
        assert_eq!(u8::from(Shape::Rectangle), 1);
        assert_eq!(u32::from(ItsAid::Saem), 0x84081);
        assert_eq!(ItsAid::from(0x27F), ItsAid::Cpm);
    }

    #[test]
    fn test_unknown_values_survive_conversion() {
        assert_eq!(Shape::from(9), Shape::Other(9));
        assert_eq!(u8::from(Shape::from(9)), 9);
        assert_eq!(u32::from(ItsAid::from(0xABCD)), 0xABCD);
        assert_eq!(u8::from(PacketType::default()), 0);
    }

    #[test]
    fn test_destination_shape_invariant() {
        assert!(Destination::circle(485_000_000, 90_000_000, 300, 0).is_consistent());
        assert!(Destination::rectangle(0, 0, 100, 50, 900).is_consistent());

        let mut broken = Destination::circle(0, 0, 10, 0);
        broken.distance_b = 5;
        assert!(!broken.is_consistent());
    }
}
