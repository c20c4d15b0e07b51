//! Equality-to-zero over arithmetic replicated shares, and the equality
//! comparisons built on it.
//!
//! The protocol re-shares `x` between two parties, masks it with a value `r`
//! dealt by the third (the pivot, drawn publicly so load balances across
//! calls), reveals `c = x + r` to one party and turns `~(c ^ r)` into a
//! three-party boolean sharing that is all-ones iff `x = 0`. A k-ary AND
//! tree then folds the bit-vector to the single indicator bit.
use itertools::izip;

use crate::rep3_core::party::error::MpcResult;
use crate::rep3_core::party::{MainParty, PrssCtrl};
use crate::rep3_core::share::{RssShare, RssShareVec};
use crate::ring::RingWord;
use crate::sharing::{check_same_len, BoolRss};

use super::gates::rss_and2_reshare;

/// Computes a 1-bit boolean replicated indicator of `x == 0 mod 2^k`.
///
/// Rounds: `3 + log2 k` (deal, reveal, flag split, then one per tree level).
pub fn eqz<R: RingWord>(party: &mut MainParty, x: &RssShareVec<R>) -> MpcResult<BoolRss<R>> {
    let n = x.len();
    let k = R::BITS;

    let pivot = (party.public_coin() % 3) as usize;
    let p0 = pivot;
    let p1 = (pivot + 1) % 3;
    let p2 = (pivot + 2) % 3;

    let mut flag_si = vec![R::ZERO; n];
    let mut flag_sii = vec![R::ZERO; n];

    if party.i == p0 {
        // the helper: deal r both arithmetically and bitwise; one half of
        // each sharing is prearranged through the PRSS, the other is sent
        let r: Vec<R> = party.fill_private(n);
        let (_, r_arith_0) = party.prss_pair::<R>(n, PrssCtrl::Second);
        let (_, r_bool_0) = party.prss_pair::<R>(n, PrssCtrl::Second);
        let r_arith_1: Vec<R> = izip!(&r, &r_arith_0)
            .map(|(r, a)| r.wrapping_sub(*a))
            .collect();
        let r_bool_1: Vec<R> = izip!(&r, &r_bool_0).map(|(r, a)| *r ^ *a).collect();
        party.send_to(p2, &r_arith_1, "eqz.r_arith")?;
        party.send_to(p2, &r_bool_1, "eqz.r_bool")?;
        party.add_comm_stats_manually(-1, 0);

        // the helper's flag shares: (r_bool_1, r_z)
        let (_, r_z) = party.prss_pair::<R>(n, PrssCtrl::Second);
        flag_si = r_bool_1;
        flag_sii = r_z;
    } else {
        // P1 and P2 re-share x between them and mask it with r
        let a_s: Vec<R> = if party.i == p1 {
            x.iter().map(|s| s.si.wrapping_add(s.sii)).collect()
        } else {
            x.iter().map(|s| s.sii).collect()
        };
        let (r_arith, r_bool) = if party.i == p1 {
            let (r_arith, _) = party.prss_pair::<R>(n, PrssCtrl::First);
            let (r_bool, _) = party.prss_pair::<R>(n, PrssCtrl::First);
            (r_arith, r_bool)
        } else {
            party.prss_pair::<R>(n, PrssCtrl::None);
            party.prss_pair::<R>(n, PrssCtrl::None);
            let r_arith = party.receive_from::<R>(p0, n, "eqz.r_arith")?;
            let r_bool = party.receive_from::<R>(p0, n, "eqz.r_bool")?;
            party.add_comm_stats_manually(-1, 0);
            (r_arith, r_bool)
        };

        let c_s: Vec<R> = izip!(&a_s, &r_arith)
            .map(|(a, r)| a.wrapping_add(*r))
            .collect();

        if party.i == p1 {
            // reveal c = x + r and split the flag towards P2
            let c_other = party.receive_from::<R>(p2, n, "eqz.c")?;
            let (r_z, _) = party.prss_pair::<R>(n, PrssCtrl::First);
            let flag: Vec<R> = izip!(&c_s, c_other, &r_bool, &r_z)
                .map(|(cs, co, rb, rz)| !(cs.wrapping_add(co) ^ *rb) ^ *rz)
                .collect();
            party.send_to(p2, &flag, "eqz.flag_split")?;
            flag_si = r_z;
            flag_sii = flag;
        } else {
            party.send_to(p1, &c_s, "eqz.c")?;
            party.prss_pair::<R>(n, PrssCtrl::None);
            flag_sii = r_bool;
            flag_si = party.receive_from::<R>(p1, n, "eqz.flag_split")?;
        }
    }

    // if x == 0 the flag is all-ones; fold with a k-ary AND tree, halving
    // the bit-width per fused AND round
    let mut cur = BoolRss::new(flag_si, flag_sii, k)?;
    while cur.nbits() > 1 {
        let half = cur.nbits() / 2;
        let mask = R::mask_low(half);
        let hi = BoolRss::new(
            cur.si.iter().map(|v| (*v >> half) & mask).collect(),
            cur.sii.iter().map(|v| (*v >> half) & mask).collect(),
            half,
        )?;
        let lo = BoolRss::new(
            cur.si.iter().map(|v| *v & mask).collect(),
            cur.sii.iter().map(|v| *v & mask).collect(),
            half,
        )?;
        cur = rss_and2_reshare(party, &hi, &lo)?;
    }
    party.wait_for_completion();
    Ok(cur)
}

/// Equality of two arithmetic replicated tensors: subtract locally, then
/// test for zero.
pub fn equal_aa<R: RingWord>(
    party: &mut MainParty,
    lhs: &RssShareVec<R>,
    rhs: &RssShareVec<R>,
) -> MpcResult<BoolRss<R>> {
    check_same_len(lhs.len(), rhs.len())?;
    let diff: RssShareVec<R> = izip!(lhs, rhs)
        .map(|(l, r)| RssShare::from(l.si.wrapping_sub(r.si), l.sii.wrapping_sub(r.sii)))
        .collect();
    eqz(party, &diff)
}

/// Equality of an arithmetic replicated tensor with a public tensor: the
/// parties holding the summand `x_1` subtract the constant, then test for
/// zero.
pub fn equal_ap<R: RingWord>(
    party: &mut MainParty,
    lhs: &RssShareVec<R>,
    rhs: &[R],
) -> MpcResult<BoolRss<R>> {
    check_same_len(lhs.len(), rhs.len())?;
    let diff: RssShareVec<R> = izip!(lhs, rhs)
        .map(|(l, c)| {
            let mut si = l.si;
            let mut sii = l.sii;
            if party.i == 0 {
                sii = sii.wrapping_sub(*c);
            }
            if party.i == 1 {
                si = si.wrapping_sub(*c);
            }
            RssShare::from(si, sii)
        })
        .collect();
    eqz(party, &diff)
}

#[cfg(test)]
mod test {
    use rand::thread_rng;

    use crate::rep3_core::party::test_export::localhost_setup;
    use crate::rep3_core::party::{MainParty, RngExt};
    use crate::rep3_core::share::RssShareVec;
    use crate::ring::RingWord;
    use crate::sharing::test::{
        arith_shares_from_summands, consistent_bool, reconstruct_bool, secret_share_vector_arith,
    };

    use super::{eqz, equal_aa, equal_ap};

    fn run_eqz<R: RingWord>(
        s1: RssShareVec<R>,
        s2: RssShareVec<R>,
        s3: RssShareVec<R>,
    ) -> Vec<R> {
        let program = |x: RssShareVec<R>| move |p: &mut MainParty| eqz(p, &x).unwrap();
        let ((r1, _), (r2, _), (r3, _)) =
            localhost_setup(program(s1), program(s2), program(s3), None);
        consistent_bool(&r1, &r2, &r3);
        assert_eq!(r1.nbits(), 1);
        reconstruct_bool(&r1, &r2, &r3)
    }

    #[test]
    fn eqz_zero_and_nonzero() {
        // (7, 2^64-7, 0) reconstructs to 0; the others do not
        let summands: Vec<(u64, u64, u64)> = vec![
            (7, 7u64.wrapping_neg(), 0),
            (0, 0, 0),
            (1, 0, 0),
            (u64::MAX, 1, 0),
            (5, 6, 7),
        ];
        let (s1, s2, s3) = arith_shares_from_summands(&summands);
        assert_eq!(run_eqz(s1, s2, s3), vec![1, 1, 0, 1, 0]);
    }

    #[test]
    fn eqz_u8_and_u128() {
        let (s1, s2, s3) = arith_shares_from_summands::<u8>(&[(3, 253, 0), (1, 1, 1)]);
        assert_eq!(run_eqz(s1, s2, s3), vec![1, 0]);
        let (s1, s2, s3) = arith_shares_from_summands::<u128>(&[(9, 0, 9u128.wrapping_neg())]);
        assert_eq!(run_eqz(s1, s2, s3), vec![1]);
    }

    #[test]
    fn eqz_random_inputs_are_nonzero() {
        let mut rng = thread_rng();
        let values: Vec<u64> = u64::generate(&mut rng, 50);
        let (s1, s2, s3) = secret_share_vector_arith(&mut rng, &values);
        let res = run_eqz(s1, s2, s3);
        for (v, r) in values.iter().zip(res) {
            let expected = if *v == 0 { 1 } else { 0 };
            assert_eq!(expected, r);
        }
    }

    #[test]
    fn equal_aa_matches() {
        // (5,0,0) vs (2,3,0) are equal; vs (2,3,1) they are not
        let (x1, x2, x3) = arith_shares_from_summands::<u64>(&[(5, 0, 0), (5, 0, 0)]);
        let (y1, y2, y3) = arith_shares_from_summands::<u64>(&[(2, 3, 0), (2, 3, 1)]);
        let program = |x: RssShareVec<u64>, y: RssShareVec<u64>| {
            move |p: &mut MainParty| equal_aa(p, &x, &y).unwrap()
        };
        let ((r1, _), (r2, _), (r3, _)) = localhost_setup(
            program(x1, y1),
            program(x2, y2),
            program(x3, y3),
            None,
        );
        assert_eq!(reconstruct_bool(&r1, &r2, &r3), vec![1, 0]);
    }

    #[test]
    fn equal_ap_agrees_with_equal_aa() {
        let mut rng = thread_rng();
        let values: Vec<u64> = u64::generate(&mut rng, 20);
        let (s1, s2, s3) = secret_share_vector_arith(&mut rng, &values);
        let mut constants = values.clone();
        constants[0] = constants[0].wrapping_add(1); // force one mismatch
        let program = |x: RssShareVec<u64>, c: Vec<u64>| {
            move |p: &mut MainParty| equal_ap(p, &x, &c).unwrap()
        };
        let ((r1, _), (r2, _), (r3, _)) = localhost_setup(
            program(s1, constants.clone()),
            program(s2, constants.clone()),
            program(s3, constants),
            None,
        );
        let res = reconstruct_bool(&r1, &r2, &r3);
        assert_eq!(res[0], 0);
        for r in &res[1..] {
            assert_eq!(*r, 1);
        }
    }

    #[test]
    fn equal_ap_agrees_with_embedded_constant() {
        // EqualAP(x, c) must agree with EqualAA(x, embed(c)) where embed(c)
        // is the replicated sharing of the public constant
        let mut rng = thread_rng();
        let values: Vec<u64> = u64::generate(&mut rng, 8);
        let (s1, s2, s3) = secret_share_vector_arith(&mut rng, &values);
        let mut constants = values.clone();
        constants[3] = constants[3].wrapping_mul(7).wrapping_add(1);
        let program = |x: RssShareVec<u64>, c: Vec<u64>| {
            move |p: &mut MainParty| {
                let embedded: RssShareVec<u64> = c.iter().map(|v| p.constant(*v)).collect();
                let via_aa = equal_aa(p, &x, &embedded).unwrap();
                let via_ap = equal_ap(p, &x, &c).unwrap();
                (via_aa, via_ap)
            }
        };
        let (((a1, b1), _), ((a2, b2), _), ((a3, b3), _)) = localhost_setup(
            program(s1, constants.clone()),
            program(s2, constants.clone()),
            program(s3, constants),
            None,
        );
        let via_aa = reconstruct_bool(&a1, &a2, &a3);
        let via_ap = reconstruct_bool(&b1, &b2, &b3);
        assert_eq!(via_aa, via_ap);
        assert_eq!(via_ap[3], 0);
        assert!(via_ap.iter().enumerate().all(|(i, v)| i == 3 || *v == 1));
    }

    #[test]
    fn eqz_round_count_u64() {
        let (s1, s2, s3) = arith_shares_from_summands::<u64>(&[(1, 2, 3)]);
        let program = |x: RssShareVec<u64>| {
            move |p: &mut MainParty| {
                p.reset_comm_stats_logical();
                let _ = eqz(p, &x).unwrap();
                p.comm_stats_logical().online_rounds
            }
        };
        let ((r1, _), (r2, _), (r3, _)) =
            localhost_setup(program(s1), program(s2), program(s3), None);
        // the tree alone costs log2(64) = 6 rounds at every party; the
        // deal/reveal/split phase adds 1 to 3 more depending on the role
        for rounds in [r1, r2, r3] {
            assert!((7..=9).contains(&rounds), "rounds = {}", rounds);
        }
    }
}
