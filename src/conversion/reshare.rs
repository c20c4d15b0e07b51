//! Reshare transitions between the three boolean sharing flavors.
//!
//! Each transition preserves the shared value and the bit-width. The
//! communication-free directions (RSS→ASS, MSS→RSS) are plain slot algebra;
//! the others absorb fresh PRSS randomness and cost one logical round.
use itertools::izip;

use crate::rep3_core::party::error::MpcResult;
use crate::rep3_core::party::{MainParty, PrssCtrl};
use crate::ring::RingWord;
use crate::sharing::{BoolAss, BoolMss, BoolRss};

/// RSS → ASS: drop the second slot.
pub fn rss_to_ass<R: RingWord>(x: &BoolRss<R>) -> BoolAss<R> {
    BoolAss::new(x.si.clone(), x.nbits()).expect("nbits already validated")
}

/// MSS → RSS: fold the public value into both replicated slots,
/// `(D ^ d_i, D ^ d_{i+1})`.
pub fn mss_to_rss<R: RingWord>(x: &BoolMss<R>) -> BoolRss<R> {
    let si = izip!(&x.mv, &x.di).map(|(m, d)| *m ^ *d).collect();
    let sii = izip!(&x.mv, &x.dii).map(|(m, d)| *m ^ *d).collect();
    BoolRss::new(si, sii, x.nbits()).expect("nbits already validated")
}

/// ASS → RSS: re-mask the single slot with a PRSS zero sharing, then rotate
/// once so every party learns its successor's masked slot.
pub fn ass_to_rss<R: RingWord>(party: &mut MainParty, x: &BoolAss<R>) -> MpcResult<BoolRss<R>> {
    let n = x.len();
    let (r0, r1) = party.prss_pair::<R>(n, PrssCtrl::Both);
    let si: Vec<R> = izip!(&x.s, r0, r1).map(|(s, a, b)| *s ^ a ^ b).collect();
    let sii = party.rotate(&si, "reshare.ass2rss")?;
    BoolRss::new(si, sii, x.nbits())
}

/// RSS → MSS: sample the mask `d` from PRSS, publish `D = x ^ d` with one
/// right-rotation of the locally maskable part.
pub fn rss_to_mss<R: RingWord>(party: &mut MainParty, x: &BoolRss<R>) -> MpcResult<BoolMss<R>> {
    let n = x.len();
    let (di, dii) = party.prss_pair::<R>(n, PrssCtrl::Both);
    let t: Vec<R> = izip!(&x.si, &di).map(|(s, d)| *s ^ *d).collect();
    let t = party.rotate_right(&t, "reshare.rss2mss")?;
    let mv = izip!(&x.si, &x.sii, &di, &dii, t)
        .map(|(s0, s1, d0, d1, tr)| *s0 ^ *s1 ^ *d0 ^ *d1 ^ tr)
        .collect();
    BoolMss::new(mv, di, dii, x.nbits())
}

/// ASS → MSS: publish `D = x ^ d` with one left- and one right-rotation that
/// travel in the same logical round.
pub fn ass_to_mss<R: RingWord>(party: &mut MainParty, x: &BoolAss<R>) -> MpcResult<BoolMss<R>> {
    let n = x.len();
    let (di, dii) = party.prss_pair::<R>(n, PrssCtrl::Both);
    let a: Vec<R> = izip!(&x.s, &di).map(|(s, d)| *s ^ *d).collect();
    // TODO: mask the left-rotating message with a fresh PRSS share as well.
    let b: Vec<R> = x.s.clone();
    let a = party.rotate_right(&a, "reshare.ass2mss.1")?;
    let b = party.rotate(&b, "reshare.ass2mss.2")?;
    party.add_comm_stats_manually(-1, 0);
    let mv = izip!(&x.s, &di, &dii, a, b)
        .map(|(s, d0, d1, ar, br)| *s ^ *d0 ^ *d1 ^ ar ^ br)
        .collect();
    BoolMss::new(mv, di, dii, x.nbits())
}

/// Reshares two ASS tensors to MSS in one combined message per direction.
///
/// The parallel-prefix cells emit a `(p', g')` pair after every level; this
/// ships both through a single pair of rotations so the level costs one
/// round instead of two.
pub fn ass_to_mss_pair<R: RingWord>(
    party: &mut MainParty,
    p: &BoolAss<R>,
    g: &BoolAss<R>,
) -> MpcResult<(BoolMss<R>, BoolMss<R>)> {
    let n = p.len();
    let mut joined = Vec::with_capacity(2 * n);
    joined.extend_from_slice(&p.s);
    joined.extend_from_slice(&g.s);
    let joined = BoolAss::new(joined, usize::max(p.nbits(), g.nbits()))?;
    let both = ass_to_mss(party, &joined)?;

    let split = |v: &[R]| (v[..n].to_vec(), v[n..].to_vec());
    let (mv_p, mv_g) = split(&both.mv);
    let (di_p, di_g) = split(&both.di);
    let (dii_p, dii_g) = split(&both.dii);
    Ok((
        BoolMss::new(mv_p, di_p, dii_p, p.nbits())?,
        BoolMss::new(mv_g, di_g, dii_g, g.nbits())?,
    ))
}
