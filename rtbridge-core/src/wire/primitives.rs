//! Big-endian primitive field codecs shared by both header layouts.
//!
//! Reads check the remaining length before consuming anything, so a failed
//! read leaves the cursor where the field started. Writes append without
//! bounds checks; headers are always written into buffers sized for them.

use bytes::{Buf, BufMut};

use super::CodecError;
use super::types::Destination;

fn ensure_remaining<B: Buf>(buf: &B, field: &'static str, needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::Truncated {
            field,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Reads one byte.
///
/// # Errors
///
/// - `CodecError::Truncated` - Cursor is exhausted
pub fn read_u8<B: Buf>(buf: &mut B, field: &'static str) -> Result<u8, CodecError> {
    ensure_remaining(buf, field, 1)?;
    Ok(buf.get_u8())
}

/// Reads a big-endian 16-bit integer.
///
/// # Errors
///
/// - `CodecError::Truncated` - Fewer than 2 bytes remain
pub fn read_u16<B: Buf>(buf: &mut B, field: &'static str) -> Result<u16, CodecError> {
    ensure_remaining(buf, field, 2)?;
    Ok(buf.get_u16())
}

/// Reads a big-endian 32-bit integer.
///
/// # Errors
///
/// - `CodecError::Truncated` - Fewer than 4 bytes remain
pub fn read_u32<B: Buf>(buf: &mut B, field: &'static str) -> Result<u32, CodecError> {
    ensure_remaining(buf, field, 4)?;
    Ok(buf.get_u32())
}

/// Reads a fixed-size opaque byte array.
///
/// # Errors
///
/// - `CodecError::Truncated` - Fewer than `N` bytes remain
pub fn read_array<B: Buf, const N: usize>(
    buf: &mut B,
    field: &'static str,
) -> Result<[u8; N], CodecError> {
    ensure_remaining(buf, field, N)?;
    let mut bytes = [0u8; N];
    buf.copy_to_slice(&mut bytes);
    Ok(bytes)
}

/// Skips reserved bytes whatever their content.
///
/// # Errors
///
/// - `CodecError::Truncated` - Fewer than `count` bytes remain
pub fn skip_padding<B: Buf>(buf: &mut B, count: usize) -> Result<(), CodecError> {
    ensure_remaining(buf, "padding", count)?;
    buf.advance(count);
    Ok(())
}

/// Writes `count` zero bytes of padding.
pub fn put_padding<B: BufMut>(buf: &mut B, count: usize) {
    buf.put_bytes(0, count);
}

/// Writes the 15-byte destination block (coordinates, distances, angle, shape).
pub fn put_destination<B: BufMut>(buf: &mut B, destination: &Destination) {
    buf.put_i32(destination.latitude);
    buf.put_i32(destination.longitude);
    buf.put_u16(destination.distance_a);
    buf.put_u16(destination.distance_b);
    buf.put_u16(destination.angle);
    buf.put_u8(destination.shape.into());
}

/// Reads the 15-byte destination block.
///
/// # Errors
///
/// - `CodecError::Truncated` - Block is cut short
pub fn read_destination<B: Buf>(buf: &mut B) -> Result<Destination, CodecError> {
    Ok(Destination {
        latitude: read_u32(buf, "latitude")? as i32,
        longitude: read_u32(buf, "longitude")? as i32,
        distance_a: read_u16(buf, "distance a")?,
        distance_b: read_u16(buf, "distance b")?,
        angle: read_u16(buf, "angle")?,
        shape: read_u8(buf, "shape")?.into(),
    })
}
