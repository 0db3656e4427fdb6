//! Little-endian codec for the fixed-width integers that appear in an
//! instruction stream, on the operand stack and in register slots.

use std::fmt::Debug;

/// A fixed-width integer with a little-endian byte form.
pub trait Scalar: Copy + Default + PartialEq + Debug {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Read from the first `SIZE` bytes. `None` if the slice is shorter.
    fn read_le(bytes: &[u8]) -> Option<Self>;

    /// Write into the first `SIZE` bytes. `None` if the slice is shorter.
    fn write_le(self, out: &mut [u8]) -> Option<()>;

    /// Zero- or sign-extended 64-bit word, reinterpreted as `u64`.
    fn to_bits(self) -> u64;

    /// Truncate a 64-bit word to this width.
    fn from_bits(bits: u64) -> Self;
}

macro_rules! impl_scalar {
    ($($t:ty),* $(,)?) => {$(
        impl Scalar for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            fn read_le(bytes: &[u8]) -> Option<Self> {
                let raw = bytes.get(..Self::SIZE)?;
                raw.try_into().ok().map(<$t>::from_le_bytes)
            }

            fn write_le(self, out: &mut [u8]) -> Option<()> {
                out.get_mut(..Self::SIZE)?
                    .copy_from_slice(&self.to_le_bytes());
                Some(())
            }

            fn to_bits(self) -> u64 {
                self as u64
            }

            fn from_bits(bits: u64) -> Self {
                bits as $t
            }
        }
    )*};
}

impl_scalar!(i8, u8, i16, u16, i32, u32, i64, u64);

/// Read `size` bytes (1..=8) as a zero-extended little-endian word.
pub fn read_sized(bytes: &[u8], size: usize) -> Option<u64> {
    let raw = bytes.get(..size)?;
    if size > 8 {
        return None;
    }
    let mut word = [0u8; 8];
    word[..size].copy_from_slice(raw);
    Some(u64::from_le_bytes(word))
}

/// Append the low `size` bytes of `value`, little-endian.
pub fn write_sized(out: &mut Vec<u8>, value: u64, size: usize) {
    out.extend_from_slice(&value.to_le_bytes()[..size.min(8)]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(<i8 as Scalar>::SIZE, 1);
        assert_eq!(<u16 as Scalar>::SIZE, 2);
        assert_eq!(<i32 as Scalar>::SIZE, 4);
        assert_eq!(<u64 as Scalar>::SIZE, 8);
    }

    #[test]
    fn reads_little_endian() {
        let bytes = [0x78, 0x56, 0x34, 0x12, 0xFF];
        assert_eq!(u32::read_le(&bytes), Some(0x1234_5678));
        assert_eq!(u16::read_le(&bytes), Some(0x5678));
        assert_eq!(u8::read_le(&bytes[4..]), Some(0xFF));
        assert_eq!(i8::read_le(&bytes[4..]), Some(-1));
    }

    #[test]
    fn short_slices_are_rejected() {
        assert_eq!(u32::read_le(&[1, 2, 3]), None);
        let mut out = [0u8; 1];
        assert_eq!(0x1234u16.write_le(&mut out), None);
        assert_eq!(out, [0]);
    }

    #[test]
    fn signed_bits_sign_extend() {
        assert_eq!((-1i8).to_bits(), u64::MAX);
        assert_eq!(i16::from_bits(0xFFFF_8000), i16::MIN);
        assert_eq!(u8::from_bits(0x1FF), 0xFF);
    }

    #[test]
    fn sized_words() {
        assert_eq!(read_sized(&[0x01, 0x02, 0x03], 2), Some(0x0201));
        assert_eq!(read_sized(&[0x01], 2), None);
        let mut out = Vec::new();
        write_sized(&mut out, 0xAABB_CCDD, 2);
        assert_eq!(out, vec![0xDD, 0xCC]);
    }
}
