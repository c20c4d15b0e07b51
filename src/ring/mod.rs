//! The word layer: the unsigned words `u8..u128` that back both arithmetic
//! shares (mod `2^k`) and packed boolean shares.
//!
//! The same word is read arithmetically by one kernel and bitwise by the
//! next (B2A consumes boolean bits and emits ring elements), so the two
//! algebras live side by side on one type: the bit algebra through the
//! standard operator traits, the ring algebra through explicit wrapping
//! methods. The operations are **not constant-time**.
use std::borrow::Borrow;
use std::fmt::Debug;
use std::ops::{BitAnd, BitOr, BitXor, Not, Shl, Shr};

use rand::{CryptoRng, Rng};

use crate::rep3_core::network::NetSerializable;
use crate::rep3_core::party::RngExt;
use crate::rep3_core::share::HasZero;

/// An element of `Z/2^BITS`, doubling as a packed vector of `BITS` booleans.
pub trait RingWord:
    Copy
    + Clone
    + Debug
    + Default
    + PartialEq
    + Eq
    + Send
    + Sync
    + 'static
    + HasZero
    + RngExt
    + NetSerializable
    + BitXor<Output = Self>
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Not<Output = Self>
    + Shl<usize, Output = Self>
    + Shr<usize, Output = Self>
{
    /// The width `k` of the word.
    const BITS: usize;
    const ONE: Self;
    const MAX: Self;

    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_neg(self) -> Self;

    /// Truncating conversion; used to derive the repeating lane masks from
    /// their 128-bit patterns.
    fn from_u128(v: u128) -> Self;
    fn to_u128(self) -> u128;

    /// The mask selecting the low `nbits` bits (all-ones for `nbits >= BITS`).
    fn mask_low(nbits: usize) -> Self {
        if nbits >= Self::BITS {
            Self::MAX
        } else {
            (Self::ONE << nbits).wrapping_sub(Self::ONE)
        }
    }

    /// The `i`-th bit of the word.
    fn bit(self, i: usize) -> bool {
        (self >> i) & Self::ONE == Self::ONE
    }
}

macro_rules! impl_ring_word {
    ($t:ty, $nbytes:expr) => {
        impl HasZero for $t {
            const ZERO: Self = 0;
        }

        impl RngExt for $t {
            fn fill<R: Rng + CryptoRng>(rng: &mut R, buf: &mut [Self]) {
                let mut bytes = vec![0u8; buf.len() * $nbytes];
                rng.fill_bytes(&mut bytes);
                for (dst, chunk) in buf.iter_mut().zip(bytes.chunks_exact($nbytes)) {
                    *dst = <$t>::from_le_bytes(chunk.try_into().unwrap());
                }
            }
        }

        impl NetSerializable for $t {
            fn serialized_size(n_elements: usize) -> usize {
                n_elements * $nbytes
            }

            fn as_byte_vec(it: impl IntoIterator<Item = impl Borrow<Self>>, len: usize) -> Vec<u8> {
                let mut out = Vec::with_capacity(len * $nbytes);
                for el in it {
                    out.extend_from_slice(&el.borrow().to_le_bytes());
                }
                out
            }

            fn as_byte_vec_slice(elements: &[Self]) -> Vec<u8> {
                Self::as_byte_vec(elements.iter(), elements.len())
            }

            fn from_byte_vec(v: Vec<u8>, len: usize) -> Vec<Self> {
                debug_assert_eq!(v.len(), len * $nbytes);
                v.chunks_exact($nbytes)
                    .map(|chunk| <$t>::from_le_bytes(chunk.try_into().unwrap()))
                    .collect()
            }

            fn from_byte_slice(v: Vec<u8>, dest: &mut [Self]) {
                debug_assert_eq!(v.len(), dest.len() * $nbytes);
                for (dst, chunk) in dest.iter_mut().zip(v.chunks_exact($nbytes)) {
                    *dst = <$t>::from_le_bytes(chunk.try_into().unwrap());
                }
            }
        }

        impl RingWord for $t {
            const BITS: usize = $nbytes * 8;
            const ONE: Self = 1;
            const MAX: Self = <$t>::MAX;

            #[inline]
            fn wrapping_add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }

            #[inline]
            fn wrapping_sub(self, rhs: Self) -> Self {
                self.wrapping_sub(rhs)
            }

            #[inline]
            fn wrapping_neg(self) -> Self {
                self.wrapping_neg()
            }

            #[inline]
            fn from_u128(v: u128) -> Self {
                v as $t
            }

            #[inline]
            fn to_u128(self) -> u128 {
                self as u128
            }
        }
    };
}

impl_ring_word!(u8, 1);
impl_ring_word!(u16, 2);
impl_ring_word!(u32, 4);
impl_ring_word!(u64, 8);
impl_ring_word!(u128, 16);

#[cfg(test)]
mod test {
    use rand::thread_rng;

    use crate::rep3_core::network::NetSerializable;
    use crate::rep3_core::party::RngExt;

    use super::RingWord;

    #[test]
    fn mask_low() {
        assert_eq!(<u8 as RingWord>::mask_low(0), 0);
        assert_eq!(<u8 as RingWord>::mask_low(3), 0b111);
        assert_eq!(<u8 as RingWord>::mask_low(8), 0xff);
        assert_eq!(<u64 as RingWord>::mask_low(63), u64::MAX >> 1);
        assert_eq!(<u64 as RingWord>::mask_low(64), u64::MAX);
        assert_eq!(<u128 as RingWord>::mask_low(128), u128::MAX);
    }

    #[test]
    fn pattern_truncation() {
        const P: u128 = 0x1111_1111_1111_1111_1111_1111_1111_1111;
        assert_eq!(<u8 as RingWord>::from_u128(P), 0x11);
        assert_eq!(<u16 as RingWord>::from_u128(P), 0x1111);
        assert_eq!(<u64 as RingWord>::from_u128(P), 0x1111_1111_1111_1111);
    }

    #[test]
    fn bits() {
        let x = 0b1010u8;
        assert!(!x.bit(0));
        assert!(x.bit(1));
        assert!(!x.bit(2));
        assert!(x.bit(3));
    }

    #[test]
    fn serialization_roundtrip() {
        fn roundtrip<T: RingWord>(n: usize) {
            let mut rng = thread_rng();
            let v: Vec<T> = T::generate(&mut rng, n);
            let bytes = T::as_byte_vec_slice(&v);
            assert_eq!(bytes.len(), T::serialized_size(n));
            let back = T::from_byte_vec(bytes, n);
            assert_eq!(v, back);
        }
        roundtrip::<u8>(100);
        roundtrip::<u16>(100);
        roundtrip::<u32>(100);
        roundtrip::<u64>(100);
        roundtrip::<u128>(100);
    }
}
