//! Fixed-width primitives used by every on-disk record. Integers are
//! big-endian; strings are null-padded to their field width.

use byteorder::{BigEndian, ByteOrder};
use clustervfs::{corrupted, invalid_path, FsResult};

pub const U64_SIZE: usize = 8;
pub const BOOL_SIZE: usize = 1;

pub fn encode_u64(value: u64) -> [u8; U64_SIZE] {
    let mut buf = [0u8; U64_SIZE];
    BigEndian::write_u64(&mut buf, value);
    buf
}

pub fn decode_u64(bytes: &[u8]) -> FsResult<u64> {
    if bytes.len() < U64_SIZE {
        return Err(corrupted(format!("short integer field ({} bytes)", bytes.len())));
    }
    Ok(BigEndian::read_u64(&bytes[..U64_SIZE]))
}

/// Pads `value` with NUL bytes up to `width`. Values that do not fit are
/// rejected rather than truncated.
pub fn encode_string(value: &str, width: usize) -> FsResult<Vec<u8>> {
    let raw = value.as_bytes();
    if raw.len() > width {
        return Err(invalid_path(format!(
            "name `{value}` is longer than {width} bytes"
        )));
    }
    let mut buf = vec![0u8; width];
    buf[..raw.len()].copy_from_slice(raw);
    Ok(buf)
}

pub fn decode_string(bytes: &[u8]) -> FsResult<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[..end].to_vec())
        .map_err(|_| corrupted("stored name is not valid UTF-8"))
}

pub fn encode_bool(value: bool) -> u8 {
    u8::from(value)
}

pub fn decode_bool(byte: u8) -> FsResult<bool> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(corrupted(format!("invalid boolean byte {other:#04x}"))),
    }
}
