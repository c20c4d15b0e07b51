//! The local gate algebra of the three boolean sharing flavors.
//!
//! Every gate is elementwise, preserves the element count and returns the
//! minimum of the input bit-widths. XOR is linear in all three flavors and
//! therefore free. AND is where the flavors differ:
//!
//! * `RSS x RSS -> ASS` costs nothing online; the cross terms of the two
//!   replicated pairs cover the full product and a PRSS zero-sharing
//!   re-randomizes the additive result.
//! * `MSS x MSS -> RSS` costs nothing online either: the terms involving the
//!   public masked values are local, and the single secret-secret cross term
//!   `d_x & d_y` is produced by an offline AND-plus-rotate on the masks.
//! * The wider fan-ins compose these two.
use itertools::izip;
use rayon::iter::{IndexedParallelIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;

use crate::rep3_core::party::error::MpcResult;
use crate::rep3_core::party::{MainParty, PrssCtrl};
use crate::ring::RingWord;
use crate::sharing::{check_same_len, gate_nbits, BoolAss, BoolMss, BoolRss};

use super::reshare::mss_to_rss;

/// XOR of two additive sharings: xor the only live slot.
pub fn ass_xor2<R: RingWord>(lhs: &BoolAss<R>, rhs: &BoolAss<R>) -> MpcResult<BoolAss<R>> {
    check_same_len(lhs.len(), rhs.len())?;
    let s = izip!(&lhs.s, &rhs.s).map(|(l, r)| *l ^ *r).collect();
    BoolAss::new(s, gate_nbits(lhs.nbits(), rhs.nbits()))
}

/// XOR of two replicated sharings: xor both slots.
pub fn rss_xor2<R: RingWord>(lhs: &BoolRss<R>, rhs: &BoolRss<R>) -> MpcResult<BoolRss<R>> {
    check_same_len(lhs.len(), rhs.len())?;
    let si = izip!(&lhs.si, &rhs.si).map(|(l, r)| *l ^ *r).collect();
    let sii = izip!(&lhs.sii, &rhs.sii).map(|(l, r)| *l ^ *r).collect();
    BoolRss::new(si, sii, gate_nbits(lhs.nbits(), rhs.nbits()))
}

/// XOR of two masked sharings: the public value and both mask slots are all
/// XOR-linear.
pub fn mss_xor2<R: RingWord>(lhs: &BoolMss<R>, rhs: &BoolMss<R>) -> MpcResult<BoolMss<R>> {
    check_same_len(lhs.len(), rhs.len())?;
    let mv = izip!(&lhs.mv, &rhs.mv).map(|(l, r)| *l ^ *r).collect();
    let di = izip!(&lhs.di, &rhs.di).map(|(l, r)| *l ^ *r).collect();
    let dii = izip!(&lhs.dii, &rhs.dii).map(|(l, r)| *l ^ *r).collect();
    BoolMss::new(mv, di, dii, gate_nbits(lhs.nbits(), rhs.nbits()))
}

/// AND of two replicated sharings with an additive result; no communication.
///
/// The elementwise loop fans out over the party's worker pool for large
/// tensors; randomness generation stays sequential since the PRSS streams
/// are counters.
pub fn rss_and2<R: RingWord>(
    party: &mut MainParty,
    lhs: &BoolRss<R>,
    rhs: &BoolRss<R>,
) -> MpcResult<BoolAss<R>> {
    check_same_len(lhs.len(), rhs.len())?;
    let n = lhs.len();
    let (z0, z1) = party.prss_pair::<R>(n, PrssCtrl::Both);

    let s = if party.has_multi_threading() && n >= party.num_worker_threads() * 1024 {
        let chunk = party.chunk_size_for_task(n);
        let mut s = vec![R::ZERO; n];
        party.run_in_threadpool(|| {
            s.par_chunks_mut(chunk).enumerate().for_each(|(ci, out)| {
                let base = ci * chunk;
                for (t, o) in out.iter_mut().enumerate() {
                    let j = base + t;
                    *o = (lhs.si[j] & rhs.si[j])
                        ^ (lhs.si[j] & rhs.sii[j])
                        ^ (lhs.sii[j] & rhs.si[j])
                        ^ z0[j]
                        ^ z1[j];
                }
            });
            Ok(())
        })?;
        s
    } else {
        izip!(&lhs.si, &lhs.sii, &rhs.si, &rhs.sii, z0, z1)
            .map(|(li, lii, ri, rii, a, b)| (*li & *ri) ^ (*li & *rii) ^ (*lii & *ri) ^ a ^ b)
            .collect()
    };
    BoolAss::new(s, gate_nbits(lhs.nbits(), rhs.nbits()))
}

/// AND of two replicated sharings with a replicated result in one round.
///
/// The PRSS zero-sharing that re-randomizes the additive cross terms doubles
/// as the reshare mask, so the masked slot rotates directly. This fused form
/// is what the bit-AND trees and the boolean adders are built from.
pub fn rss_and2_reshare<R: RingWord>(
    party: &mut MainParty,
    lhs: &BoolRss<R>,
    rhs: &BoolRss<R>,
) -> MpcResult<BoolRss<R>> {
    let ass = rss_and2(party, lhs, rhs)?;
    let sii = party.rotate(&ass.s, "rss.and2.reshare")?;
    let nbits = ass.nbits();
    BoolRss::new(ass.s, sii, nbits)
}

/// Two fused AND-with-reshare gates whose masked slots travel in a single
/// message, so a prefix-adder level pays one round for both of its ANDs.
pub fn rss_and2_reshare_pair<R: RingWord>(
    party: &mut MainParty,
    first: (&BoolRss<R>, &BoolRss<R>),
    second: (&BoolRss<R>, &BoolRss<R>),
) -> MpcResult<(BoolRss<R>, BoolRss<R>)> {
    let a = rss_and2(party, first.0, first.1)?;
    let b = rss_and2(party, second.0, second.1)?;
    let n = a.len();
    check_same_len(n, b.len())?;
    let mut joined = Vec::with_capacity(2 * n);
    joined.extend_from_slice(&a.s);
    joined.extend_from_slice(&b.s);
    let received = party.rotate(&joined, "rss.and2.reshare.pair")?;
    let a_nbits = a.nbits();
    let b_nbits = b.nbits();
    let first = BoolRss::new(a.s, received[..n].to_vec(), a_nbits)?;
    let second = BoolRss::new(b.s, received[n..].to_vec(), b_nbits)?;
    Ok((first, second))
}

/// AND of two masked sharings with a replicated result; zero online rounds.
///
/// With `x = Dx ^ dx` and `y = Dy ^ dy`,
/// `x & y = Dx&Dy ^ Dx&dy ^ dx&Dy ^ dx&dy`. The first three terms are local
/// in the party's own `(D, d)` slots. The cross term `dx & dy` is an
/// RSS-by-RSS AND on the masks and is produced offline: the additive result
/// is PRSS-masked and rotated once, accounted against the offline counters.
pub fn mss_and2<R: RingWord>(
    party: &mut MainParty,
    lhs: &BoolMss<R>,
    rhs: &BoolMss<R>,
) -> MpcResult<BoolRss<R>> {
    check_same_len(lhs.len(), rhs.len())?;
    let n = lhs.len();

    // offline: dxy = dx & dy as a fresh replicated sharing
    let (z0, z1) = party.prss_pair::<R>(n, PrssCtrl::Both);
    let dxy_i: Vec<R> = izip!(&lhs.di, &lhs.dii, &rhs.di, &rhs.dii, z0, z1)
        .map(|(ldi, ldii, rdi, rdii, a, b)| {
            (*ldi & *rdi) ^ (*ldi & *rdii) ^ (*ldii & *rdi) ^ a ^ b
        })
        .collect();
    let dxy_ii = party.rotate(&dxy_i, "mss.and2.offline")?;
    party.mark_comm_offline(1, R::serialized_size(n) as i64);

    // online: local in the public values and the own mask slots
    let si = izip!(&lhs.mv, &lhs.di, &rhs.mv, &rhs.di, &dxy_i)
        .map(|(lm, ld, rm, rd, dxy)| (*lm & *rm) ^ (*lm & *rd) ^ (*ld & *rm) ^ *dxy)
        .collect();
    let sii = izip!(&lhs.mv, &lhs.dii, &rhs.mv, &rhs.dii, &dxy_ii)
        .map(|(lm, ld, rm, rd, dxy)| (*lm & *rm) ^ (*lm & *rd) ^ (*ld & *rm) ^ *dxy)
        .collect();
    BoolRss::new(si, sii, gate_nbits(lhs.nbits(), rhs.nbits()))
}

/// Fan-in 3 AND on masked sharings with an additive result: compose
/// `(a & b)` with the downgraded third operand.
pub fn mss_and3<R: RingWord>(
    party: &mut MainParty,
    op1: &BoolMss<R>,
    op2: &BoolMss<R>,
    op3: &BoolMss<R>,
) -> MpcResult<BoolAss<R>> {
    let lo = mss_and2(party, op1, op2)?;
    let hi = mss_to_rss(op3);
    rss_and2(party, &lo, &hi)
}

/// Fan-in 4 AND on masked sharings with an additive result: two masked ANDs
/// in parallel, then one replicated AND.
pub fn mss_and4<R: RingWord>(
    party: &mut MainParty,
    op1: &BoolMss<R>,
    op2: &BoolMss<R>,
    op3: &BoolMss<R>,
    op4: &BoolMss<R>,
) -> MpcResult<BoolAss<R>> {
    let lo = mss_and2(party, op1, op2)?;
    let hi = mss_and2(party, op3, op4)?;
    rss_and2(party, &lo, &hi)
}
