//! Little-endian base-128 varints as used by tx extra and key derivations

use crate::errors::{CoreError, CoreResult};

/// Append `value` to `buf` as a varint
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Read a varint from the front of `bytes`, returning the value and the
/// number of bytes consumed
pub fn read_varint(bytes: &[u8]) -> CoreResult<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        let shift = 7 * i as u32;
        if shift >= 64 {
            return Err(CoreError::MalformedVarint);
        }
        let chunk = u64::from(byte & 0x7f);
        if shift == 63 && chunk > 1 {
            return Err(CoreError::MalformedVarint);
        }
        value |= chunk << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CoreError::MalformedVarint)
}
