use std::hash::Hasher;
use byteorder::{ByteOrder, LittleEndian};
use twox_hash::XxHash32;

use crate::common::types::Rid;

/// Fixed-width binary codec for the keys and values stored in bucket pages.
///
/// Every value of an implementing type occupies exactly `WIDTH` bytes on the
/// page, so slot offsets can be computed without per-slot headers.
pub trait FixedLenCodec: Sized + Clone + PartialEq {
    /// Encoded width in bytes
    const WIDTH: usize;

    /// Write the value into `buf`, which is exactly `WIDTH` bytes long
    fn encode_into(&self, buf: &mut [u8]);

    /// Read a value back out of `buf`
    fn decode_from(buf: &[u8]) -> Self;
}

impl FixedLenCodec for u32 {
    const WIDTH: usize = 4;

    fn encode_into(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn decode_from(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl FixedLenCodec for u64 {
    const WIDTH: usize = 8;

    fn encode_into(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, *self);
    }

    fn decode_from(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
}

impl FixedLenCodec for i32 {
    const WIDTH: usize = 4;

    fn encode_into(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode_from(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl FixedLenCodec for i64 {
    const WIDTH: usize = 8;

    fn encode_into(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode_from(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl FixedLenCodec for Rid {
    const WIDTH: usize = 8;

    fn encode_into(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..4], self.page_id);
        LittleEndian::write_u32(&mut buf[4..8], self.slot_num);
    }

    fn decode_from(buf: &[u8]) -> Self {
        Rid {
            page_id: LittleEndian::read_u32(&buf[0..4]),
            slot_num: LittleEndian::read_u32(&buf[4..8]),
        }
    }
}

/// Maps keys to the 32-bit hash values that drive directory addressing
pub trait KeyHasher<K>: Send + Sync {
    fn hash_key(&self, key: &K) -> u32;
}

/// Default hasher: seeded xxHash32 over the key's encoded bytes.
///
/// The seed is fixed so the addressing stays stable across restarts of the
/// process that owns the index file.
#[derive(Debug, Clone, Copy, Default)]
pub struct XxKeyHasher;

const HASH_SEED: u32 = 0x4b53_4442;

impl<K: FixedLenCodec> KeyHasher<K> for XxKeyHasher {
    fn hash_key(&self, key: &K) -> u32 {
        let mut buf = vec![0u8; K::WIDTH];
        key.encode_into(&mut buf);

        let mut hasher = XxHash32::with_seed(HASH_SEED);
        hasher.write(&buf);
        hasher.finish() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_roundtrip() {
        let mut buf = [0u8; 4];
        0xdead_beefu32.encode_into(&mut buf);
        assert_eq!(u32::decode_from(&buf), 0xdead_beef);
    }

    #[test]
    fn test_rid_roundtrip() {
        let rid = Rid::new(17, 3);
        let mut buf = [0u8; 8];
        rid.encode_into(&mut buf);
        assert_eq!(Rid::decode_from(&buf), rid);
    }

    #[test]
    fn test_default_hasher_is_deterministic() {
        let hasher = XxKeyHasher;
        let a = KeyHasher::<u32>::hash_key(&hasher, &42);
        let b = KeyHasher::<u32>::hash_key(&hasher, &42);
        assert_eq!(a, b);
        assert_ne!(a, KeyHasher::<u32>::hash_key(&hasher, &43));
    }
}
