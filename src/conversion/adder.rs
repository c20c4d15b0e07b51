//! Boolean addition of two replicated sharings with a Kogge-Stone prefix
//! adder: `ceil(log2 nbits)` levels, one fused AND round per level.
//!
//! This is the workhorse behind B2A for wide inputs. The radix-4 adder in
//! [super::ppa] is cheaper per level but wants MSS inputs; here both
//! operands are plain RSS, so the classic radix-2 network applies.
use crate::rep3_core::party::error::MpcResult;
use crate::rep3_core::party::MainParty;
use crate::ring::RingWord;
use crate::sharing::{check_same_len, gate_nbits, BoolRss};

use super::gates::{rss_and2_reshare, rss_and2_reshare_pair, rss_xor2};

pub(super) fn log2_ceil(x: usize) -> usize {
    let mut y = 0;
    let mut v = x - 1;
    while v > 0 {
        v >>= 1;
        y += 1;
    }
    y
}

fn shl_masked<R: RingWord>(x: &BoolRss<R>, shift: usize, mask: R) -> BoolRss<R> {
    let si = x.si.iter().map(|v| (*v << shift) & mask).collect();
    let sii = x.sii.iter().map(|v| (*v << shift) & mask).collect();
    BoolRss::new(si, sii, x.nbits()).expect("nbits already validated")
}

/// Adds two boolean replicated tensors mod `2^nbits`.
///
/// Rounds: `1 + ceil(log2 nbits)` (the generate init plus one per level; the
/// two ANDs of a level share a message).
pub fn add_bb<R: RingWord>(
    party: &mut MainParty,
    x: &BoolRss<R>,
    y: &BoolRss<R>,
) -> MpcResult<BoolRss<R>> {
    check_same_len(x.len(), y.len())?;
    let nbits = gate_nbits(x.nbits(), y.nbits());
    let mask = R::mask_low(nbits);

    let p0 = rss_xor2(x, y)?;
    let mut p = p0.clone();
    let mut g = rss_and2_reshare(party, x, y)?;

    for i in 0..log2_ceil(nbits) {
        let shift = 1usize << i;
        let g_shift = shl_masked(&g, shift, mask);
        let p_shift = shl_masked(&p, shift, mask);
        // g' = g ^ (p & (g << s)); p' = p & (p << s)
        let (t_g, t_p) = rss_and2_reshare_pair(party, (&p, &g_shift), (&p, &p_shift))?;
        g = rss_xor2(&g, &t_g)?;
        p = t_p;
    }

    // sum = x ^ y ^ (carries << 1)
    let carry = shl_masked(&g, 1, mask);
    rss_xor2(&p0, &carry)
}
