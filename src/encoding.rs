//! Bitcoin variable-length integers and the little-endian read helpers
//! shared by every wire parser in the crate.

use crate::error::{Error, Result};
use std::io::Read;

/// Reads exactly `N` bytes or fails with [`Error::ShortRead`].
pub fn read_array<const N: usize, R: Read>(r: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(|_| Error::ShortRead)?;
    Ok(buf)
}

/// Reads `n` bytes into a fresh vector or fails with [`Error::ShortRead`].
pub fn read_bytes<R: Read>(r: &mut R, n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf).map_err(|_| Error::ShortRead)?;
    Ok(buf)
}

pub fn read_u16_le<R: Read>(r: &mut R) -> Result<u16> {
    Ok(u16::from_le_bytes(read_array::<2, _>(r)?))
}

pub fn read_u32_le<R: Read>(r: &mut R) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array::<4, _>(r)?))
}

pub fn read_u64_le<R: Read>(r: &mut R) -> Result<u64> {
    Ok(u64::from_le_bytes(read_array::<8, _>(r)?))
}

pub fn read_i32_le<R: Read>(r: &mut R) -> Result<i32> {
    Ok(i32::from_le_bytes(read_array::<4, _>(r)?))
}

pub fn read_i64_le<R: Read>(r: &mut R) -> Result<i64> {
    Ok(i64::from_le_bytes(read_array::<8, _>(r)?))
}

/// Encodes an integer as a Bitcoin VarInt.
///
/// Values below 0xfd are a single byte; larger values get a 0xfd/0xfe/0xff
/// lead byte followed by 2, 4 or 8 little-endian bytes. The u64 domain makes
/// the encoding total, so unlike the decoder this never fails.
pub fn encode_varint(i: u64) -> Vec<u8> {
    if i < 0xfd {
        vec![i as u8]
    } else if i <= 0xffff {
        let mut buf = vec![0xfd];
        buf.extend_from_slice(&(i as u16).to_le_bytes());
        buf
    } else if i <= 0xffff_ffff {
        let mut buf = vec![0xfe];
        buf.extend_from_slice(&(i as u32).to_le_bytes());
        buf
    } else {
        let mut buf = vec![0xff];
        buf.extend_from_slice(&i.to_le_bytes());
        buf
    }
}

/// Decodes a Bitcoin VarInt by peeking the lead byte and consuming the
/// matching little-endian suffix.
pub fn decode_varint<R: Read>(r: &mut R) -> Result<u64> {
    let [lead] = read_array::<1, _>(r)?;
    match lead {
        0xfd => Ok(read_u16_le(r)? as u64),
        0xfe => Ok(read_u32_le(r)? as u64),
        0xff => read_u64_le(r),
        n => Ok(n as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_varint_sizes() {
        assert_eq!(encode_varint(0xfc).len(), 1);
        assert_eq!(encode_varint(0xffff).len(), 3);
        assert_eq!(encode_varint(0xffff_ffff).len(), 5);
        assert_eq!(encode_varint(0xffff_ffff_ffff_ffff).len(), 9);
    }

    #[test]
    fn test_varint_round_trip() {
        for value in [0u64, 1, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, 0x1_0000_0000, u64::MAX] {
            let encoded = encode_varint(value);
            let decoded = decode_varint(&mut Cursor::new(&encoded)).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_varint_boundary_encodings() {
        assert_eq!(encode_varint(0xfc), vec![0xfc]);
        assert_eq!(encode_varint(0xfd), vec![0xfd, 0xfd, 0x00]);
        assert_eq!(encode_varint(0x10000), vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_varint_short_input() {
        // lead byte promises 2 more bytes than available
        let mut r = Cursor::new(vec![0xfdu8, 0x01]);
        assert!(decode_varint(&mut r).is_err());
    }

    #[test]
    fn test_read_helpers_short_input() {
        let mut r = Cursor::new(vec![0u8; 3]);
        assert!(read_u32_le(&mut r).is_err());
    }
}
