//! Fixed-width little-endian writes into byte buffers.
//!
//! Every multi-byte field in the package format is little-endian and every
//! string field is a fixed-width, zero-padded, null-terminated UTF-8 field.

use sha2::{Digest, Sha256};

use crate::error::Error;

pub(crate) fn put_u8(buf: &mut [u8], offset: usize, value: u8) {
    buf[offset] = value;
}

pub(crate) fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_i16(buf: &mut [u8], offset: usize, value: i16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Writes `s` into the `width`-byte field at `offset` as UTF-8 followed by
/// zero padding. The encoding must leave room for at least one null byte;
/// a string of `width` or more bytes is rejected.
pub(crate) fn put_str(
    buf: &mut [u8],
    offset: usize,
    width: usize,
    field: &str,
    s: &str,
) -> Result<(), Error> {
    let bytes = s.as_bytes();
    if bytes.len() >= width {
        return Err(Error::StringTooLong {
            field: field.to_owned(),
            len: bytes.len(),
            max: width,
        });
    }

    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    buf[offset + bytes.len()..offset + width].fill(0);

    Ok(())
}

/// Computes the SHA-256 digest of `data`.
pub(crate) fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_writes() {
        let mut buf = [0u8; 8];
        put_u16(&mut buf, 0, 0x1234);
        put_u32(&mut buf, 2, 0x8899aabb);
        put_i16(&mut buf, 6, -2);

        assert_eq!(buf, [0x34, 0x12, 0xbb, 0xaa, 0x99, 0x88, 0xfe, 0xff]);
    }

    #[test]
    fn string_field_is_null_terminated() {
        let mut buf = [0xffu8; 8];
        put_str(&mut buf, 0, 8, "f", "abc").unwrap();

        assert_eq!(&buf, b"abc\0\0\0\0\0");
        assert!(buf.contains(&0));
    }

    #[test]
    fn string_field_longest_fit() {
        let mut buf = [0u8; 4];
        put_str(&mut buf, 0, 4, "f", "abc").unwrap();
        assert_eq!(&buf, b"abc\0");

        let err = put_str(&mut buf, 0, 4, "f", "abcd").unwrap_err();
        assert!(matches!(err, Error::StringTooLong { len: 4, max: 4, .. }));
    }

    #[test]
    fn string_field_counts_utf8_bytes() {
        // four characters, eight bytes
        let mut buf = [0u8; 8];
        let err = put_str(&mut buf, 0, 8, "f", "éééé").unwrap_err();
        assert!(matches!(err, Error::StringTooLong { len: 8, .. }));
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
