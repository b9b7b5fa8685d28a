//! Hardware wire format for bridged V2X packets.
//!
//! Two fixed-layout, big-endian headers travel over UDP between the
//! simulation and the radio unit: the Data Request (simulation to hardware)
//! and the Data Indication (hardware to simulation). Both share the
//! primitive field codecs in [`primitives`] and the enumerations in [`types`].

pub mod indication;
pub mod primitives;
pub mod request;
pub mod types;

pub use indication::DataIndicationHeader;
pub use request::DataRequestHeader;
pub use types::{
    CERT_ID_LEN, CommsProfile, Destination, ItsAid, PacketTransport, PacketType, SSP_BITS_LEN,
    SecurityProfile, Shape, TrafficClass,
};

/// Errors produced while decoding hardware headers.
///
/// Both variants are recoverable: the caller drops the malformed datagram
/// and continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Header length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Truncated header: field '{field}' needs {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
}
