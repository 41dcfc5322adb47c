// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

/// This is a very small reimplementation of [bytes::Buf] with just the parts needed for this
/// crate.
///
/// The camera sends 16-bit words big-endian, but multi-word values have their *words* in
/// little-endian order (the least significant word comes first). The `get_lepton_*` methods
/// handle that mixed ordering.
///
/// [bytes::Buf]: https://docs.rs/bytes/*/bytes/trait.Buf.html
pub(crate) trait Buffer {
    fn get_u16(&mut self) -> u16;
    fn get_lepton_u32(&mut self) -> u32;
    fn get_lepton_i32(&mut self) -> i32;
    fn get_lepton_u64(&mut self) -> u64;
}

impl Buffer for &[u8] {
    fn get_u16(&mut self) -> u16 {
        let (bytes, rest) = self.split_at(2);
        *self = rest;
        u16::from_be_bytes([bytes[0], bytes[1]])
    }

    fn get_lepton_u32(&mut self) -> u32 {
        let low = self.get_u16();
        let high = self.get_u16();
        u32::from(high) << 16 | u32::from(low)
    }

    fn get_lepton_i32(&mut self) -> i32 {
        self.get_lepton_u32() as i32
    }

    fn get_lepton_u64(&mut self) -> u64 {
        (0..4).fold(0u64, |value, word_index| {
            value | u64::from(self.get_u16()) << (16 * word_index)
        })
    }
}

/// Encode a 32-bit value in the camera's word order.
pub(crate) fn lepton_u32_bytes(value: u32) -> [u8; 4] {
    let low = (value as u16).to_be_bytes();
    let high = ((value >> 16) as u16).to_be_bytes();
    [low[0], low[1], high[0], high[1]]
}

/// Check if the n-th bit is set.
///
/// Bits are 0-indexed, from the LSB.
pub(crate) fn is_bit_set<B>(value: B, index: usize) -> bool
where
    B: num_traits::PrimInt + num_traits::Unsigned,
{
    (value & (B::one() << index)) > B::zero()
}

#[cfg(test)]
mod test {
    use super::{lepton_u32_bytes, Buffer};

    #[test]
    fn buffer_get_u16() {
        let data = b"\xde\xad\xbe\xef";
        let mut buf = &data[..];
        let v = buf.get_u16();
        assert_eq!(v, 0xdead);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf, &data[2..]);
    }

    #[test]
    fn buffer_get_lepton_u32() {
        let data = b"\xbe\xef\xde\xad";
        let mut buf = &data[..];
        assert_eq!(buf.get_lepton_u32(), 0xdead_beef);
        assert!(buf.is_empty());
    }

    #[test]
    fn buffer_get_lepton_i32() {
        let data = b"\xff\xfe\xff\xff";
        let mut buf = &data[..];
        assert_eq!(buf.get_lepton_i32(), -2);
    }

    #[test]
    fn buffer_get_lepton_u64() {
        let data = b"\x01\x02\x03\x04\x05\x06\x07\x08";
        let mut buf = &data[..];
        assert_eq!(buf.get_lepton_u64(), 0x0708_0506_0304_0102);
    }

    #[test]
    fn u32_bytes() {
        assert_eq!(lepton_u32_bytes(0xdead_beef), *b"\xbe\xef\xde\xad");
        let bytes = lepton_u32_bytes(0x0102_0304);
        let mut buf = &bytes[..];
        assert_eq!(buf.get_lepton_u32(), 0x0102_0304);
    }

    #[test]
    fn is_bit_set() {
        for n in 0..16 {
            let value: u16 = 1 << n;
            assert!(
                super::is_bit_set(value, n),
                "is_bit_set was incorrect for bit {}",
                n
            );
        }
    }
}
