//! Boolean-to-arithmetic share conversion.
//!
//! Two variants, dispatched on the input bit-width by [b2a]:
//!
//! * [b2a_via_ppa] masks the boolean input with a PRSS-derived pair
//!   `([r]_B, r)` whose boolean sharing equals the integer known to two
//!   parties, adds `[x]_B + [r]_B` with the Kogge-Stone adder, reveals the
//!   sum to one party and lets the other two negate their mask halves.
//!   Rounds: `4 + ceil(log2 k)`; communication `O(k log k)` bits.
//! * [b2a_via_ot] runs a three-party OT per bit with the pivot as dealer;
//!   two rounds but `O(k^2)` bits, so it only wins on narrow inputs.
//!
//! A zero-width input is known to be zero and converts without
//! communication.
use itertools::izip;

use crate::rep3_core::party::error::MpcResult;
use crate::rep3_core::party::{MainParty, PrssCtrl};
use crate::rep3_core::share::{RssShare, RssShareVec};
use crate::ring::RingWord;
use crate::sharing::BoolRss;

use super::adder::add_bb;

/// Width-dispatching selector: OT for at most 8 live bits, PPA otherwise.
pub fn b2a<R: RingWord>(party: &mut MainParty, x: &BoolRss<R>) -> MpcResult<RssShareVec<R>> {
    if x.nbits() == 0 {
        // special case, it's known to be zero
        return Ok(vec![RssShare::from(R::ZERO, R::ZERO); x.len()]);
    }
    if x.nbits() <= 8 {
        b2a_via_ot(party, x)
    } else {
        b2a_via_ppa(party, x)
    }
}

/// B2A through the boolean adder.
pub fn b2a_via_ppa<R: RingWord>(
    party: &mut MainParty,
    x: &BoolRss<R>,
) -> MpcResult<RssShareVec<R>> {
    let n = x.len();
    if x.nbits() == 0 {
        return Ok(vec![RssShare::from(R::ZERO, R::ZERO); n]);
    }

    // expand the boolean share to the full word width
    let mask = R::mask_low(x.nbits());
    let x_wide = BoolRss::new(
        x.si.iter().map(|v| *v & mask).collect(),
        x.sii.iter().map(|v| *v & mask).collect(),
        R::BITS,
    )?;

    // P1 and P2 share the arithmetic mask halves; the boolean sharing of the
    // same integer is built by P1 folding it into a PRSS zero-sharing
    let (ra0, ra1) = party.prss_pair::<R>(n, PrssCtrl::Both);
    let (rb0, rb1) = party.prss_pair::<R>(n, PrssCtrl::Both);
    let mut rb: Vec<R> = izip!(&rb0, &rb1).map(|(a, b)| *a ^ *b).collect();
    if party.i == 1 {
        for (rb, (a, b)) in rb.iter_mut().zip(ra0.iter().zip(&ra1)) {
            *rb = *rb ^ a.wrapping_add(*b);
        }
    }
    let rb_ii = party.rotate(&rb, "b2a.rand")?;
    let r = BoolRss::new(rb, rb_ii, R::BITS)?;

    // [x + r]_B
    let x_plus_r = add_bb(party, &x_wide, &r)?;

    // reveal x + r to P0
    let mut plain = vec![R::ZERO; n];
    if party.i == 0 {
        let s2 = party.receive_from::<R>(2, n, "b2a.reveal.x_plus_r")?;
        for j in 0..n {
            plain[j] = x_plus_r.si[j] ^ x_plus_r.sii[j] ^ s2[j];
        }
    } else if party.i == 2 {
        party.send_to(0, &x_plus_r.si, "b2a.reveal.x_plus_r")?;
    }

    // P0 holds x + r, P1 and P2 hold -r between them
    let out0: Vec<R> = if party.i == 0 {
        plain
    } else {
        ra0.iter().map(|v| v.wrapping_neg()).collect()
    };
    let out1 = party.rotate(&out0, "b2a.rotate")?;
    let out = izip!(out0, out1)
        .map(|(si, sii)| RssShare::from(si, sii))
        .collect();
    party.wait_for_completion();
    Ok(out)
}

fn bit_decompose<R: RingWord>(words: &[R], nbits: usize) -> Vec<bool> {
    let mut out = Vec::with_capacity(words.len() * nbits);
    for w in words {
        for bit in 0..nbits {
            out.push(w.bit(bit));
        }
    }
    out
}

fn bit_compose<R: RingWord>(parts: &[R], nbits: usize) -> Vec<R> {
    debug_assert_eq!(parts.len() % nbits, 0);
    parts
        .chunks_exact(nbits)
        .map(|chunk| {
            let mut acc = R::ZERO;
            for (bit, part) in chunk.iter().enumerate() {
                acc = acc.wrapping_add(*part << bit);
            }
            acc
        })
        .collect()
}

/// B2A through a per-bit three-party OT.
///
/// The pivot `P0` (drawn publicly so load balances over calls) plays the
/// dealer: it knows the receiver's choice bits and masks the sender's two
/// messages with PRSS shared between dealer and sender, so the receiver
/// learns exactly `c_2 = (b_1^b_2^b_3) - c_1 - c_3` per bit.
pub fn b2a_via_ot<R: RingWord>(party: &mut MainParty, x: &BoolRss<R>) -> MpcResult<RssShareVec<R>> {
    let n = x.len();
    let in_nbits = x.nbits();
    if in_nbits == 0 {
        return Ok(vec![RssShare::from(R::ZERO, R::ZERO); n]);
    }

    let pivot = (party.public_coin() % 3) as usize;
    let p0 = pivot;
    let p1 = (pivot + 1) % 3;
    let p2 = (pivot + 2) % 3;

    let total = n * in_nbits;
    let (r0, r1) = party.prss_pair::<R>(total, PrssCtrl::Both);

    let (out0, out1) = if party.i == p0 {
        // the helper: knows the receiver's choice bits b_2 and the masks of
        // both sender messages; ships the mask of the chosen one
        let b2 = bit_decompose(&x.sii, in_nbits);
        let (m0, _) = party.prss_pair::<R>(total, PrssCtrl::First);
        let (m1, _) = party.prss_pair::<R>(total, PrssCtrl::First);
        let mc: Vec<R> = izip!(&b2, m0, m1)
            .map(|(b, m0, m1)| if *b { m1 } else { m0 })
            .collect();
        party.send_to(p1, &mc, "b2a.ot.mc")?;

        let c1 = bit_compose(&r0, in_nbits);
        let c2 = party.receive_from::<R>(p1, n, "b2a.ot.c2")?;
        (c1, c2)
    } else if party.i == p1 {
        // the receiver
        party.prss_pair::<R>(total, PrssCtrl::None);
        party.prss_pair::<R>(total, PrssCtrl::None);
        let b2 = bit_decompose(&x.si, in_nbits);

        let mc = party.receive_from::<R>(p0, total, "b2a.ot.mc")?;
        let m0 = party.receive_from::<R>(p2, total, "b2a.ot.m0")?;
        let m1 = party.receive_from::<R>(p2, total, "b2a.ot.m1")?;
        party.add_comm_stats_manually(-2, 0);

        // c2 = (b1^b2^b3) - c1 - c3, bit by bit
        let c2_bits: Vec<R> = izip!(&b2, m0, m1, mc)
            .map(|(b, m0, m1, mc)| if *b { m1 ^ mc } else { m0 ^ mc })
            .collect();
        let c2 = bit_compose(&c2_bits, in_nbits);
        party.send_to(p0, &c2, "b2a.ot.c2")?;
        let c3 = bit_compose(&r1, in_nbits);
        (c2, c3)
    } else {
        // the sender
        let c3 = bit_compose(&r0, in_nbits);
        let c1 = bit_compose(&r1, in_nbits);

        // m_i := (i ^ b1 ^ b3) - c1 - c3 for i in {0, 1}
        let mut msg0 = vec![R::ZERO; total];
        let mut msg1 = vec![R::ZERO; total];
        for idx in 0..n {
            let xx = x.si[idx] ^ x.sii[idx];
            for bit in 0..in_nbits {
                let flat = idx * in_nbits + bit;
                let t = r0[flat].wrapping_add(r1[flat]);
                let b = if xx.bit(bit) { R::ONE } else { R::ZERO };
                msg0[flat] = b.wrapping_sub(t);
                msg1[flat] = (R::ONE ^ b).wrapping_sub(t);
            }
        }

        // mask both messages with randomness shared with the helper
        let (_, mask0) = party.prss_pair::<R>(total, PrssCtrl::Second);
        let (_, mask1) = party.prss_pair::<R>(total, PrssCtrl::Second);
        for j in 0..total {
            msg0[j] = msg0[j] ^ mask0[j];
            msg1[j] = msg1[j] ^ mask1[j];
        }
        party.send_to(p1, &msg0, "b2a.ot.m0")?;
        party.send_to(p1, &msg1, "b2a.ot.m1")?;
        party.add_comm_stats_manually(-1, 0);
        (c3, c1)
    };

    let out = izip!(out0, out1)
        .map(|(si, sii)| RssShare::from(si, sii))
        .collect();
    party.wait_for_completion();
    Ok(out)
}

#[cfg(test)]
mod test {
    use rand::thread_rng;

    use crate::rep3_core::party::test_export::localhost_setup;
    use crate::rep3_core::party::{MainParty, RngExt};
    use crate::ring::RingWord;
    use crate::sharing::test::{consistent_arith, secret_share_vector_bool};
    use crate::sharing::{reconstruct_arith, BoolRss};

    use super::{b2a, b2a_via_ot, b2a_via_ppa, bit_compose, bit_decompose};

    #[test]
    fn bit_decompose_compose_roundtrip() {
        let words: Vec<u64> = vec![0xdead_beef, 0x1234_5678_9abc_def0, 0, u64::MAX];
        let bits = bit_decompose(&words, 64);
        let parts: Vec<u64> = bits.iter().map(|b| if *b { 1 } else { 0 }).collect();
        assert_eq!(bit_compose(&parts, 64), words);
    }

    fn b2a_test<R: RingWord>(nbits: usize, n: usize, force_variant: Option<bool>) {
        let mut rng = thread_rng();
        let mask = R::mask_low(nbits);
        let values: Vec<R> = R::generate(&mut rng, n).into_iter().map(|v| v & mask).collect();
        let (b1, b2, b3) = secret_share_vector_bool(&mut rng, &values, nbits);

        let program = |x: BoolRss<R>| {
            move |p: &mut MainParty| match force_variant {
                Some(true) => b2a_via_ppa(p, &x).unwrap(),
                Some(false) => b2a_via_ot(p, &x).unwrap(),
                None => b2a(p, &x).unwrap(),
            }
        };
        let ((r1, _), (r2, _), (r3, _)) =
            localhost_setup(program(b1), program(b2), program(b3), None);
        consistent_arith(&r1, &r2, &r3);
        assert_eq!(values, reconstruct_arith(&r1, &r2, &r3));
    }

    #[test]
    fn b2a_ppa_u64() {
        b2a_test::<u64>(64, 100, Some(true));
    }

    #[test]
    fn b2a_ppa_u128() {
        b2a_test::<u128>(128, 20, Some(true));
    }

    #[test]
    fn b2a_ppa_narrow() {
        b2a_test::<u64>(20, 50, Some(true));
    }

    #[test]
    fn b2a_ot_u8() {
        b2a_test::<u8>(8, 50, Some(false));
    }

    #[test]
    fn b2a_ot_narrow_u64() {
        // 5 live bits in a wide word still go through the OT path
        b2a_test::<u64>(5, 50, Some(false));
    }

    #[test]
    fn b2a_selector_dispatch() {
        b2a_test::<u64>(8, 30, None);
        b2a_test::<u64>(9, 30, None);
    }

    #[test]
    fn b2a_known_value() {
        let mut rng = thread_rng();
        let values: Vec<u64> = vec![0xdead_beef];
        let (b1, b2, b3) = secret_share_vector_bool(&mut rng, &values, 64);
        let program = |x: BoolRss<u64>| move |p: &mut MainParty| b2a(p, &x).unwrap();
        let ((r1, _), (r2, _), (r3, _)) =
            localhost_setup(program(b1), program(b2), program(b3), None);
        assert_eq!(reconstruct_arith(&r1, &r2, &r3), vec![0xdead_beef]);
    }

    #[test]
    fn b2a_zero_width_is_silent() {
        let program = |p: &mut MainParty| {
            let x = BoolRss::<u64>::zero(10, 0).unwrap();
            p.reset_comm_stats_logical();
            let res = b2a(p, &x).unwrap();
            let stats = p.comm_stats_logical();
            p.wait_for_completion();
            (res, stats)
        };
        let (((r1, s1), _), ((r2, _), _), ((r3, _), _)) =
            localhost_setup(program, program, program, None);
        assert_eq!(s1.online_rounds, 0);
        assert_eq!(s1.online_bytes, 0);
        consistent_arith(&r1, &r2, &r3);
        assert_eq!(reconstruct_arith(&r1, &r2, &r3), vec![0u64; 10]);
    }

    #[test]
    fn b2a_ppa_round_count_u64() {
        let mut rng = thread_rng();
        let values: Vec<u64> = u64::generate(&mut rng, 10);
        let (b1, b2, b3) = secret_share_vector_bool(&mut rng, &values, 64);
        let program = |x: BoolRss<u64>| {
            move |p: &mut MainParty| {
                p.reset_comm_stats_logical();
                let _ = b2a_via_ppa(p, &x).unwrap();
                p.comm_stats_logical()
            }
        };
        let ((s1, _), _, _) = localhost_setup(program(b1), program(b2), program(b3), None);
        // mask rotate + adder (1 + log2 k) + reveal + final rotate
        assert_eq!(s1.online_rounds, 1 + (1 + 6) + 1 + 1);
    }
}
