//! Local bit-rearrangement helpers for the prefix adders.
//!
//! `bit_split` separates the even and odd bits of every element
//! (`xAyBzCwD -> (xyzw, ABCD)`), halving the bit-width; two applications
//! yield the four stride-4 lanes the radix-4 cells consume. `pack_2` /
//! `unpack_2` concatenate two equally wide tensors into one word so a level
//! reshares a single value instead of two.
use crate::rep3_core::party::error::{MpcError, MpcResult};
use crate::ring::RingWord;
use crate::sharing::{BoolAss, BoolMss, BoolRss};

// Delta-swap ladder that gathers even bits into the low half and odd bits
// into the high half of an `2^(k+1)`-bit window:
//      0101010101010101
// swap  ^^  ^^  ^^  ^^
//      0011001100110011
// swap   ^^^^    ^^^^
//      0000111100001111
// swap     ^^^^^^^^
//      0000000011111111
const SWAP_MASKS: [u128; 6] = [
    0x2222_2222_2222_2222_2222_2222_2222_2222,
    0x0C0C_0C0C_0C0C_0C0C_0C0C_0C0C_0C0C_0C0C,
    0x00F0_00F0_00F0_00F0_00F0_00F0_00F0_00F0,
    0x0000_FF00_0000_FF00_0000_FF00_0000_FF00,
    0x0000_0000_FFFF_0000_0000_0000_FFFF_0000,
    0x0000_0000_0000_0000_FFFF_FFFF_0000_0000,
];
const KEEP_MASKS: [u128; 6] = [
    0x9999_9999_9999_9999_9999_9999_9999_9999,
    0xC3C3_C3C3_C3C3_C3C3_C3C3_C3C3_C3C3_C3C3,
    0xF00F_F00F_F00F_F00F_F00F_F00F_F00F_F00F,
    0xFF00_00FF_FF00_00FF_FF00_00FF_FF00_00FF,
    0xFFFF_0000_0000_FFFF_FFFF_0000_0000_FFFF,
    0xFFFF_FFFF_0000_0000_0000_0000_FFFF_FFFF,
];

fn log2_ceil(x: usize) -> usize {
    let mut y = 0;
    let mut v = x - 1;
    while v > 0 {
        v >>= 1;
        y += 1;
    }
    y
}

fn split_even_odd_generic<R: RingWord>(mut r: R, nbits: usize) -> (R, R) {
    let levels = log2_ceil(nbits);
    for k in 0..levels.saturating_sub(1) {
        let keep = R::from_u128(KEEP_MASKS[k]);
        let swap = R::from_u128(SWAP_MASKS[k]);
        let shift = 1usize << k;
        r = (r & keep) ^ ((r >> shift) & swap) ^ ((r & swap) << shift);
    }
    let half = nbits / 2;
    let mask = R::mask_low(half);
    ((r >> half) & mask, r & mask)
}

/// Parallel-bit-extract fast path for lanes of at most 64 bits.
#[cfg(all(target_arch = "x86_64", target_feature = "bmi2"))]
#[inline]
fn pext_u64(x: u64, mask: u64) -> u64 {
    unsafe { core::arch::x86_64::_pext_u64(x, mask) }
}

#[cfg(all(target_arch = "x86_64", target_feature = "bmi2"))]
fn split_even_odd<R: RingWord>(r: R, nbits: usize) -> (R, R) {
    if R::BITS <= 64 {
        const EVEN: u64 = 0x5555_5555_5555_5555;
        let half = nbits / 2;
        let mask = R::mask_low(half);
        let x = (r & R::mask_low(nbits)).to_u128() as u64;
        let lo = R::from_u128(pext_u64(x, EVEN) as u128) & mask;
        let hi = R::from_u128(pext_u64(x, !EVEN) as u128) & mask;
        (hi, lo)
    } else {
        split_even_odd_generic(r, nbits)
    }
}

#[cfg(not(all(target_arch = "x86_64", target_feature = "bmi2")))]
fn split_even_odd<R: RingWord>(r: R, nbits: usize) -> (R, R) {
    split_even_odd_generic(r, nbits)
}

fn check_splittable(nbits: usize) -> MpcResult<()> {
    if nbits == 0 || nbits % 2 != 0 {
        return Err(MpcError::InvalidParameters(format!(
            "cannot split a {}-bit value into even and odd bits",
            nbits
        )));
    }
    Ok(())
}

/// Splits the even and odd bits of a replicated tensor; returns `(hi, lo)`
/// where `lo` carries the even bits.
pub fn bit_split_rss<R: RingWord>(x: &BoolRss<R>) -> MpcResult<(BoolRss<R>, BoolRss<R>)> {
    check_splittable(x.nbits())?;
    let out_nbits = x.nbits() / 2;
    let n = x.len();
    let mut lo = BoolRss::zero(n, out_nbits)?;
    let mut hi = BoolRss::zero(n, out_nbits)?;
    for j in 0..n {
        let (h, l) = split_even_odd(x.si[j], x.nbits());
        hi.si[j] = h;
        lo.si[j] = l;
        let (h, l) = split_even_odd(x.sii[j], x.nbits());
        hi.sii[j] = h;
        lo.sii[j] = l;
    }
    Ok((hi, lo))
}

/// Splits the even and odd bits of a masked tensor; all three slots are
/// XOR-linear, so each splits independently.
pub fn bit_split_mss<R: RingWord>(x: &BoolMss<R>) -> MpcResult<(BoolMss<R>, BoolMss<R>)> {
    check_splittable(x.nbits())?;
    let out_nbits = x.nbits() / 2;
    let n = x.len();
    let mut lo = BoolMss::zero(n, out_nbits)?;
    let mut hi = BoolMss::zero(n, out_nbits)?;
    for j in 0..n {
        let (h, l) = split_even_odd(x.mv[j], x.nbits());
        hi.mv[j] = h;
        lo.mv[j] = l;
        let (h, l) = split_even_odd(x.di[j], x.nbits());
        hi.di[j] = h;
        lo.di[j] = l;
        let (h, l) = split_even_odd(x.dii[j], x.nbits());
        hi.dii[j] = h;
        lo.dii[j] = l;
    }
    Ok((hi, lo))
}

fn check_packable<R: RingWord>(lo_nbits: usize, hi_nbits: usize) -> MpcResult<usize> {
    if lo_nbits != hi_nbits {
        return Err(MpcError::InvalidParameters(format!(
            "pack_2 expects equal widths, got {} and {}",
            lo_nbits, hi_nbits
        )));
    }
    let out = lo_nbits + hi_nbits;
    if out > R::BITS {
        return Err(MpcError::InvalidParameters(format!(
            "packed width {} exceeds the {}-bit word",
            out,
            R::BITS
        )));
    }
    Ok(out)
}

fn pack_word<R: RingWord>(lo: R, hi: R, lo_nbits: usize) -> R {
    (lo & R::mask_low(lo_nbits)) | ((hi & R::mask_low(lo_nbits)) << lo_nbits)
}

fn unpack_word<R: RingWord>(x: R, lo_nbits: usize, hi_nbits: usize) -> (R, R) {
    ((x >> lo_nbits) & R::mask_low(hi_nbits), x & R::mask_low(lo_nbits))
}

/// Concatenates two equally wide additive tensors into one of twice the width.
pub fn pack_2_ass<R: RingWord>(lo: &BoolAss<R>, hi: &BoolAss<R>) -> MpcResult<BoolAss<R>> {
    let out_nbits = check_packable::<R>(lo.nbits(), hi.nbits())?;
    let s = lo
        .s
        .iter()
        .zip(&hi.s)
        .map(|(l, h)| pack_word(*l, *h, lo.nbits()))
        .collect();
    BoolAss::new(s, out_nbits)
}

/// Concatenates two equally wide replicated tensors into one of twice the width.
pub fn pack_2_rss<R: RingWord>(lo: &BoolRss<R>, hi: &BoolRss<R>) -> MpcResult<BoolRss<R>> {
    let out_nbits = check_packable::<R>(lo.nbits(), hi.nbits())?;
    let si = lo
        .si
        .iter()
        .zip(&hi.si)
        .map(|(l, h)| pack_word(*l, *h, lo.nbits()))
        .collect();
    let sii = lo
        .sii
        .iter()
        .zip(&hi.sii)
        .map(|(l, h)| pack_word(*l, *h, lo.nbits()))
        .collect();
    BoolRss::new(si, sii, out_nbits)
}

/// Concatenates two equally wide masked tensors into one of twice the width.
pub fn pack_2_mss<R: RingWord>(lo: &BoolMss<R>, hi: &BoolMss<R>) -> MpcResult<BoolMss<R>> {
    let out_nbits = check_packable::<R>(lo.nbits(), hi.nbits())?;
    let zip3 = |a: &[R], b: &[R]| -> Vec<R> {
        a.iter()
            .zip(b)
            .map(|(l, h)| pack_word(*l, *h, lo.nbits()))
            .collect()
    };
    BoolMss::new(
        zip3(&lo.mv, &hi.mv),
        zip3(&lo.di, &hi.di),
        zip3(&lo.dii, &hi.dii),
        out_nbits,
    )
}

/// Splits a packed additive tensor back into `(hi, lo)`.
pub fn unpack_2_ass<R: RingWord>(x: &BoolAss<R>) -> MpcResult<(BoolAss<R>, BoolAss<R>)> {
    check_splittable(x.nbits())?;
    let lo_nbits = x.nbits() / 2;
    let hi_nbits = x.nbits() - lo_nbits;
    let (hi, lo): (Vec<R>, Vec<R>) = x
        .s
        .iter()
        .map(|v| unpack_word(*v, lo_nbits, hi_nbits))
        .unzip();
    Ok((BoolAss::new(hi, hi_nbits)?, BoolAss::new(lo, lo_nbits)?))
}

/// Splits a packed replicated tensor back into `(hi, lo)`.
pub fn unpack_2_rss<R: RingWord>(x: &BoolRss<R>) -> MpcResult<(BoolRss<R>, BoolRss<R>)> {
    check_splittable(x.nbits())?;
    let lo_nbits = x.nbits() / 2;
    let hi_nbits = x.nbits() - lo_nbits;
    let (hi_si, lo_si): (Vec<R>, Vec<R>) = x
        .si
        .iter()
        .map(|v| unpack_word(*v, lo_nbits, hi_nbits))
        .unzip();
    let (hi_sii, lo_sii): (Vec<R>, Vec<R>) = x
        .sii
        .iter()
        .map(|v| unpack_word(*v, lo_nbits, hi_nbits))
        .unzip();
    Ok((
        BoolRss::new(hi_si, hi_sii, hi_nbits)?,
        BoolRss::new(lo_si, lo_sii, lo_nbits)?,
    ))
}

/// Splits a packed masked tensor back into `(hi, lo)`.
pub fn unpack_2_mss<R: RingWord>(x: &BoolMss<R>) -> MpcResult<(BoolMss<R>, BoolMss<R>)> {
    check_splittable(x.nbits())?;
    let lo_nbits = x.nbits() / 2;
    let hi_nbits = x.nbits() - lo_nbits;
    let (hi_mv, lo_mv): (Vec<R>, Vec<R>) = x
        .mv
        .iter()
        .map(|v| unpack_word(*v, lo_nbits, hi_nbits))
        .unzip();
    let (hi_di, lo_di): (Vec<R>, Vec<R>) = x
        .di
        .iter()
        .map(|v| unpack_word(*v, lo_nbits, hi_nbits))
        .unzip();
    let (hi_dii, lo_dii): (Vec<R>, Vec<R>) = x
        .dii
        .iter()
        .map(|v| unpack_word(*v, lo_nbits, hi_nbits))
        .unzip();
    Ok((
        BoolMss::new(hi_mv, hi_di, hi_dii, hi_nbits)?,
        BoolMss::new(lo_mv, lo_di, lo_dii, lo_nbits)?,
    ))
}

#[cfg(test)]
pub mod test {
    use rand::thread_rng;

    use crate::rep3_core::party::RngExt;
    use crate::ring::RingWord;
    use crate::sharing::test::secret_share_vector_bool;
    use crate::sharing::{BoolAss, BoolRss};

    use super::{
        bit_split_rss, pack_2_ass, pack_2_rss, split_even_odd_generic, unpack_2_ass, unpack_2_rss,
    };

    /// Reference even/odd split, one bit at a time.
    fn split_reference<R: RingWord>(x: R, nbits: usize) -> (R, R) {
        let mut lo = R::ZERO;
        let mut hi = R::ZERO;
        for t in 0..nbits / 2 {
            if x.bit(2 * t) {
                lo = lo | (R::ONE << t);
            }
            if x.bit(2 * t + 1) {
                hi = hi | (R::ONE << t);
            }
        }
        (hi, lo)
    }

    #[test]
    fn split_agrees_with_reference() {
        let mut rng = thread_rng();
        for nbits in [2usize, 4, 8, 16, 32, 64] {
            for x in u64::generate(&mut rng, 50) {
                let x = x & <u64 as RingWord>::mask_low(nbits);
                assert_eq!(
                    split_even_odd_generic(x, nbits),
                    split_reference(x, nbits),
                    "nbits={} x={:#x}",
                    nbits,
                    x
                );
            }
        }
        for nbits in [64usize, 128] {
            for x in u128::generate(&mut rng, 50) {
                let x = x & <u128 as RingWord>::mask_low(nbits);
                assert_eq!(
                    split_even_odd_generic(x, nbits),
                    split_reference(x, nbits),
                    "nbits={} x={:#x}",
                    nbits,
                    x
                );
            }
        }
    }

    #[test]
    fn split_agrees_with_reference_u8() {
        let mut rng = thread_rng();
        for nbits in [2usize, 4, 8] {
            for x in u8::generate(&mut rng, 64) {
                let x = x & <u8 as RingWord>::mask_low(nbits);
                assert_eq!(split_even_odd_generic(x, nbits), split_reference(x, nbits));
            }
        }
    }

    #[test]
    fn bit_split_concatenation_restores_value() {
        let mut rng = thread_rng();
        let values: Vec<u64> = u64::generate(&mut rng, 40);
        let (b1, b2, b3) = secret_share_vector_bool(&mut rng, &values, 64);
        let (h1, l1) = bit_split_rss(&b1).unwrap();
        let (h2, l2) = bit_split_rss(&b2).unwrap();
        let (h3, l3) = bit_split_rss(&b3).unwrap();
        assert_eq!(h1.nbits(), 32);
        assert_eq!(l1.nbits(), 32);
        // interleaving the reconstructed halves gives back the value
        let hi = crate::sharing::test::reconstruct_bool(&h1, &h2, &h3);
        let lo = crate::sharing::test::reconstruct_bool(&l1, &l2, &l3);
        for (j, v) in values.iter().enumerate() {
            let mut rebuilt = 0u64;
            for t in 0..32 {
                rebuilt |= ((lo[j] >> t) & 1) << (2 * t);
                rebuilt |= ((hi[j] >> t) & 1) << (2 * t + 1);
            }
            assert_eq!(*v, rebuilt);
        }
    }

    #[test]
    fn pack_unpack_roundtrip_ass() {
        let mut rng = thread_rng();
        let n = 30;
        let lo = BoolAss::new(
            u64::generate(&mut rng, n)
                .into_iter()
                .map(|v| v & 0xffff_ffff)
                .collect(),
            32,
        )
        .unwrap();
        let hi = BoolAss::new(
            u64::generate(&mut rng, n)
                .into_iter()
                .map(|v| v & 0xffff_ffff)
                .collect(),
            32,
        )
        .unwrap();
        let packed = pack_2_ass(&lo, &hi).unwrap();
        assert_eq!(packed.nbits(), 64);
        let (hi2, lo2) = unpack_2_ass(&packed).unwrap();
        assert_eq!(hi, hi2);
        assert_eq!(lo, lo2);
    }

    #[test]
    fn pack_unpack_roundtrip_rss() {
        let mut rng = thread_rng();
        let values: Vec<u64> = u64::generate(&mut rng, 20)
            .into_iter()
            .map(|v| v & 0xff)
            .collect();
        let (a1, _, _) = secret_share_vector_bool(&mut rng, &values, 8);
        let (b1, _, _) = secret_share_vector_bool(&mut rng, &values, 8);
        let packed = pack_2_rss(&a1, &b1).unwrap();
        assert_eq!(packed.nbits(), 16);
        let (hi, lo) = unpack_2_rss(&packed).unwrap();
        assert_eq!(b1, hi);
        assert_eq!(a1, lo);
    }

    #[test]
    fn pack_rejects_overflow() {
        let lo = BoolAss::<u8>::zero(3, 8).unwrap();
        let hi = BoolAss::<u8>::zero(3, 8).unwrap();
        assert!(pack_2_ass(&lo, &hi).is_err());
        let lo = BoolRss::<u8>::zero(3, 4).unwrap();
        let hi = BoolRss::<u8>::zero(3, 4).unwrap();
        assert!(pack_2_rss(&lo, &hi).is_ok());
    }
}
