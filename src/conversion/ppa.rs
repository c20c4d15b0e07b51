//! The radix-4 multi-fan-in parallel-prefix adder behind A2B and MSB
//! extraction.
//!
//! Both kernels first lift the arithmetic input `x = x_0 + x_1 + x_2` into
//! two masked boolean operands: `m`, a sharing of the integer `x_s + x_s+1`
//! formed at the start rank, and `n`, a sharing of `x_s+2`. Adding `m + n`
//! with a boolean adder then yields `x` in boolean form.
//!
//! The adder itself mixes 4-fan-in and 2-fan-in generate/propagate cells.
//! The fan-in-4 cells burn their AND gates on MSS inputs (free online) and
//! replicated intermediates (free online), so a whole level costs exactly
//! one reshare of the packed `(p', g')` pair. `a2b` keeps all lanes in the
//! full-width word and walks strides 1, 4, 16, ...; `msb` quarters the
//! bit-width per iteration with even/odd splits and only tracks the carry
//! into the top bit.
use itertools::izip;

use crate::rep3_core::party::error::MpcResult;
use crate::rep3_core::party::{MainParty, PrssCtrl};
use crate::rep3_core::share::RssShareVec;
use crate::ring::RingWord;
use crate::sharing::{BoolAss, BoolMss, BoolRss};

use super::bitops::{bit_split_mss, pack_2_ass, unpack_2_mss, unpack_2_rss};
use super::gates::{ass_xor2, mss_and2, mss_and3, mss_and4, mss_xor2, rss_and2, rss_xor2};
use super::reshare::{ass_to_mss, ass_to_mss_pair, ass_to_rss, mss_to_rss, rss_to_ass};

// Lane patterns, truncated to the word width in use.
const PAT_1111: u128 = 0x1111_1111_1111_1111_1111_1111_1111_1111;
const PAT_8888: u128 = 0x8888_8888_8888_8888_8888_8888_8888_8888;
const PAT_7777: u128 = 0x7777_7777_7777_7777_7777_7777_7777_7777;

#[inline]
fn shl_or_zero<R: RingWord>(v: R, s: usize) -> R {
    if s >= R::BITS {
        R::ZERO
    } else {
        v << s
    }
}

fn map_mss<R: RingWord>(x: &BoolMss<R>, f: impl Fn(R) -> R) -> BoolMss<R> {
    BoolMss::new(
        x.mv.iter().map(|v| f(*v)).collect(),
        x.di.iter().map(|v| f(*v)).collect(),
        x.dii.iter().map(|v| f(*v)).collect(),
        x.nbits(),
    )
    .expect("nbits already validated")
}

/// Lifts the arithmetic replicated input into the two masked boolean
/// operands `m` (the integer `x_s + x_s+1`) and `n` (the summand `x_s+2`).
///
/// The start rank forms and broadcasts `D_m`; its successor forms `D_n`
/// locally and ships it to the start rank in the same round. All mask
/// randomness comes prearranged from the PRSS, so one logical round
/// publishes both masked values.
fn prep_mss_operands<R: RingWord>(
    party: &mut MainParty,
    x: &RssShareVec<R>,
    start_rank: usize,
) -> MpcResult<(BoolMss<R>, BoolMss<R>)> {
    let n = x.len();
    let k = R::BITS;
    let me = party.i;
    let rank_next = (start_rank + 1) % 3;

    let (r0, r1) = party.prss_pair::<R>(n, PrssCtrl::Both);
    let mut m = BoolMss::zero(n, k)?;
    let mut nn = BoolMss::zero(n, k)?;
    let mut msg = vec![R::ZERO; n];

    if me == start_rank {
        for j in 0..n {
            m.di[j] = r0[j];
            m.dii[j] = r1[j];
            msg[j] = r0[j] ^ r1[j] ^ x[j].si.wrapping_add(x[j].sii);
        }
    } else if me == rank_next {
        for j in 0..n {
            m.di[j] = r0[j];
            nn.dii[j] = r1[j];
            msg[j] = r1[j] ^ x[j].sii;
        }
    } else {
        for j in 0..n {
            nn.di[j] = r0[j];
            m.dii[j] = r1[j];
            nn.mv[j] = x[j].si ^ r0[j];
        }
    }

    let dm = party.broadcast(start_rank, &msg, n, "ppa.prep.Dm")?;
    if me == start_rank {
        m.mv = dm;
        nn.mv = party.receive_from::<R>(rank_next, n, "ppa.prep.Dn")?;
        party.add_comm_stats_manually(-1, 0);
    } else if me == rank_next {
        party.send_to(start_rank, &msg, "ppa.prep.Dn")?;
        party.add_comm_stats_manually(-1, 0);
        nn.mv = msg;
        m.mv = dm;
    } else {
        m.mv = dm;
    }
    Ok((m, nn))
}

/// The propagate/generate signals of the adder: `p = m ^ n` locally,
/// `g = m & n` through the masked AND, reshared to MSS so it can feed the
/// first cell level.
fn pg_signals<R: RingWord>(
    party: &mut MainParty,
    m: &BoolMss<R>,
    n: &BoolMss<R>,
) -> MpcResult<(BoolMss<R>, BoolMss<R>)> {
    let p = mss_xor2(m, n)?;
    let g_rss = mss_and2(party, m, n)?;
    let g = ass_to_mss(party, &rss_to_ass(&g_rss))?;
    Ok((p, g))
}

/// The 4-fan-in, 4-output cell of level 0.
///
/// Inputs are the four nibble lanes, each aligned so its bit sits at the top
/// position of its 4-block. Outputs are the intra-block prefixes
/// `p'_s = p_0 & ... & p_s` and `g'_s = g_s ^ g_{s-1} p_s ^ ...` recombined
/// into a single word, reshared back to MSS as one packed pair.
fn pg_cell_4fan_in_4out<R: RingWord>(
    party: &mut MainParty,
    pops: &[BoolMss<R>; 4],
    gops: &[BoolMss<R>; 4],
) -> MpcResult<(BoolMss<R>, BoolMss<R>)> {
    let [p0, p1, p2, p3] = pops;
    let [g0, g1, g2, g3] = gops;

    let p3_rss = mss_to_rss(p3);
    let p2_rss = mss_to_rss(p2);
    let g2_rss = mss_to_rss(g2);
    let g1_rss = mss_to_rss(g1);

    let p01 = mss_and2(party, p0, p1)?;
    let p23 = mss_and2(party, p2, p3)?;
    let g0p1 = mss_and2(party, g0, p1)?;

    let p0123 = rss_and2(party, &p01, &p23)?;
    let p012 = rss_and2(party, &p01, &p2_rss)?;
    let g2p3 = rss_and2(party, &g2_rss, &p3_rss)?;
    let g1p23 = rss_and2(party, &g1_rss, &p23)?;
    let g0p123 = rss_and2(party, &g0p1, &p23)?;
    let g1p2 = rss_and2(party, &g1_rss, &p2_rss)?;
    let g0p12 = rss_and2(party, &g0p1, &p2_rss)?;

    let gr3 = ass_xor2(&g2p3, &ass_xor2(&g1p23, &g0p123)?)?;
    let gr2 = ass_xor2(&g1p2, &g0p12)?;
    let gr1 = rss_to_ass(&g0p1);
    let gr0 = rss_to_ass(&mss_to_rss(g0));
    let pr3 = p0123;
    let pr2 = p012;
    let pr1 = rss_to_ass(&p01);
    let pr0 = rss_to_ass(&mss_to_rss(p0));
    let g3a = rss_to_ass(&mss_to_rss(g3));
    let g2a = rss_to_ass(&g2_rss);
    let g1a = rss_to_ass(&g1_rss);

    // recombine: output bit 4t+3-s holds the prefix of block t up to slot s
    let n = gr3.len();
    let mut gw = vec![R::ZERO; n];
    let mut pw = vec![R::ZERO; n];
    for j in 0..n {
        gw[j] = gr3.s[j]
            ^ (gr2.s[j] >> 1)
            ^ (gr1.s[j] >> 2)
            ^ (gr0.s[j] >> 3)
            ^ g3a.s[j]
            ^ (g2a.s[j] >> 1)
            ^ (g1a.s[j] >> 2);
        pw[j] = pr3.s[j] ^ (pr2.s[j] >> 1) ^ (pr1.s[j] >> 2) ^ (pr0.s[j] >> 3);
    }
    let gw = BoolAss::new(gw, gr3.nbits())?;
    let pw = BoolAss::new(pw, pr3.nbits())?;

    let (p_mss, g_mss) = ass_to_mss_pair(party, &pw, &gw)?;
    Ok((g_mss, p_mss))
}

/// The 4-fan-in, 1-output cell of the middle levels: only the highest
/// output is needed, so most of the level-0 AND gates fall away.
fn pg_cell_4fan_in_1out<R: RingWord>(
    party: &mut MainParty,
    pops: &[BoolMss<R>; 4],
    gops: &[BoolMss<R>; 4],
) -> MpcResult<(BoolMss<R>, BoolMss<R>)> {
    let [p0, p1, p2, p3] = pops;
    let [g0, g1, g2, g3] = gops;

    let p3_rss = mss_to_rss(p3);
    let g2_rss = mss_to_rss(g2);
    let g1_rss = mss_to_rss(g1);

    let p01 = mss_and2(party, p0, p1)?;
    let p23 = mss_and2(party, p2, p3)?;
    let g0p1 = mss_and2(party, g0, p1)?;

    let p0123 = rss_and2(party, &p01, &p23)?;
    let g2p3 = rss_and2(party, &g2_rss, &p3_rss)?;
    let g1p23 = rss_and2(party, &g1_rss, &p23)?;
    let g0p123 = rss_and2(party, &g0p1, &p23)?;

    let g3a = rss_to_ass(&mss_to_rss(g3));
    let gr3 = ass_xor2(&ass_xor2(&g3a, &g2p3)?, &ass_xor2(&g1p23, &g0p123)?)?;
    let pr3 = p0123;

    let (p_mss, g_mss) = ass_to_mss_pair(party, &pr3, &gr3)?;
    Ok((g_mss, p_mss))
}

/// Converts an arithmetic replicated tensor into a boolean replicated
/// tensor of the same value mod `2^k`.
///
/// Rounds: `2 + log4(k)` online (operand prep, the `g` signal reshare, and
/// one packed reshare per cell level; the terminal fan-out is local).
pub fn a2b<R: RingWord>(party: &mut MainParty, x: &RssShareVec<R>) -> MpcResult<BoolRss<R>> {
    let k = R::BITS;
    let start_rank = (party.public_coin() % 3) as usize;
    let (m, n_op) = prep_mss_operands(party, x, start_rank)?;
    let (mut p, mut g) = pg_signals(party, &m, &n_op)?;

    // sum bits before the carries
    let sum0 = mss_to_rss(&p);

    let lane0 = R::from_u128(PAT_1111);
    let top = R::from_u128(PAT_8888);
    let inner = R::from_u128(PAT_7777);

    // level 0: intra-block prefixes on the nibble lanes
    {
        let mut pops: Vec<BoolMss<R>> = Vec::with_capacity(4);
        let mut gops: Vec<BoolMss<R>> = Vec::with_capacity(4);
        for i in 0..4 {
            let sel = move |v: R| (v & (lane0 << i)) << (3 - i);
            pops.push(map_mss(&p, sel));
            gops.push(map_mss(&g, sel));
        }
        let pops: [BoolMss<R>; 4] = pops.try_into().expect("four lanes");
        let gops: [BoolMss<R>; 4] = gops.try_into().expect("four lanes");
        let (g_new, p_new) = pg_cell_4fan_in_4out(party, &pops, &gops)?;
        g = g_new;
        p = p_new;
    }

    // middle levels: combine block tops at strides 4, 16, ...
    let mut stride = 4usize;
    while stride < k {
        let mut pops: Vec<BoolMss<R>> = Vec::with_capacity(4);
        let mut gops: Vec<BoolMss<R>> = Vec::with_capacity(4);
        for i in 0..4 {
            let shift = stride * (3 - i);
            let sel = move |v: R| shl_or_zero(v & top, shift);
            pops.push(map_mss(&p, sel));
            gops.push(map_mss(&g, sel));
        }
        let pops: [BoolMss<R>; 4] = pops.try_into().expect("four lanes");
        let gops: [BoolMss<R>; 4] = gops.try_into().expect("four lanes");
        let (g_top, p_top) = pg_cell_4fan_in_1out(party, &pops, &gops)?;
        // splice the refreshed block tops back in
        g = splice_top(&g, &g_top, inner);
        p = splice_top(&p, &p_top, inner);
        stride *= 4;
    }

    // terminal 2-fan-in cell: distribute each block-top carry to the three
    // positions above it; no communication
    let gspread = map_mss(&g, |v| {
        ((v & top) << 1) ^ ((v & top) << 2) ^ ((v & top) << 3)
    });
    let pmasked = map_mss(&p, |v| v & inner);
    let c = rss_xor2(&mss_to_rss(&g), &mss_and2(party, &gspread, &pmasked)?)?;

    // sum = p ^ (carries << 1)
    let si = izip!(&sum0.si, &c.si).map(|(s, c)| *s ^ (*c << 1)).collect();
    let sii = izip!(&sum0.sii, &c.sii).map(|(s, c)| *s ^ (*c << 1)).collect();
    let out = BoolRss::new(si, sii, k)?;
    party.wait_for_completion();
    Ok(out)
}

fn splice_top<R: RingWord>(base: &BoolMss<R>, tops: &BoolMss<R>, inner: R) -> BoolMss<R> {
    BoolMss::new(
        izip!(&base.mv, &tops.mv).map(|(b, t)| (*b & inner) ^ *t).collect(),
        izip!(&base.di, &tops.di).map(|(b, t)| (*b & inner) ^ *t).collect(),
        izip!(&base.dii, &tops.dii).map(|(b, t)| (*b & inner) ^ *t).collect(),
        base.nbits(),
    )
    .expect("nbits already validated")
}

/// Extracts the most significant bit (the sign) of an arithmetic replicated
/// tensor as a 1-bit boolean replicated tensor.
///
/// Same adder as [a2b], but only the carry into the top bit is tracked: the
/// bit-width is quartered per iteration via even/odd splits, and the initial
/// `p` has its top bit forced to 1 / `g` to 0 so the terminal carry *is* the
/// MSB.
pub fn msb<R: RingWord>(party: &mut MainParty, x: &RssShareVec<R>) -> MpcResult<BoolRss<R>> {
    let n = x.len();
    let k = R::BITS;
    let start_rank = (party.public_coin() % 3) as usize;
    let (m, n_op) = prep_mss_operands(party, x, start_rank)?;
    let (mut p, mut g) = pg_signals(party, &m, &n_op)?;

    let nb = k - 1;
    let low = R::mask_low(nb);

    // the top sum bit, before the carry
    let out_si: Vec<R> = izip!(&p.mv, &p.di).map(|(m, d)| (*m ^ *d) >> nb).collect();
    let out_sii: Vec<R> = izip!(&p.mv, &p.dii).map(|(m, d)| (*m ^ *d) >> nb).collect();

    // force p's top bit to 1 and g's to 0 so the carry chain needs no
    // dedicated carry-out circuit
    for j in 0..n {
        p.mv[j] = p.mv[j] | (R::ONE << nb);
        p.di[j] = p.di[j] & low;
        p.dii[j] = p.dii[j] & low;
        g.mv[j] = g.mv[j] & low;
        g.di[j] = g.di[j] & low;
        g.dii[j] = g.dii[j] & low;
    }

    let carry: BoolRss<R> = loop {
        if p.nbits() == 2 {
            // 2-fan-in terminal: carry = g_hi ^ (g_lo & p_hi), local
            let (g_hi, g_lo) = bit_split_mss(&g)?;
            let (p_hi, _p_lo) = bit_split_mss(&p)?;
            let t = mss_and2(party, &g_lo, &p_hi)?;
            break rss_xor2(&mss_to_rss(&g_hi), &t)?;
        }

        // two even/odd splits yield the four stride-4 lanes
        let (g_hi, g_lo) = bit_split_mss(&g)?;
        let (g3, g1) = bit_split_mss(&g_hi)?;
        let (g2, g0) = bit_split_mss(&g_lo)?;
        let (p_hi, p_lo) = bit_split_mss(&p)?;
        let (p3, p1) = bit_split_mss(&p_hi)?;
        let (p2, p0) = bit_split_mss(&p_lo)?;

        let p_res = mss_and4(party, &p0, &p1, &p2, &p3)?;
        let g3a = rss_to_ass(&mss_to_rss(&g3));
        let g2a = rss_to_ass(&mss_and2(party, &g2, &p3)?);
        let g1a = mss_and3(party, &g1, &p3, &p2)?;
        let g0a = mss_and4(party, &g0, &p3, &p2, &p1)?;
        let g_comb = ass_xor2(&ass_xor2(&g0a, &g1a)?, &ass_xor2(&g2a, &g3a)?)?;

        let pg = pack_2_ass(&p_res, &g_comb)?;
        if p_res.nbits() > 1 {
            let pg = ass_to_mss(party, &pg)?;
            let (g_new, p_new) = unpack_2_mss(&pg)?;
            g = g_new;
            p = p_new;
        } else {
            // single group left; one replicated reshare finishes the chain
            let pg = ass_to_rss(party, &pg)?;
            let (g_new, _p_new) = unpack_2_rss(&pg)?;
            break g_new;
        }
    };

    let si = izip!(out_si, &carry.si).map(|(o, c)| o ^ *c).collect();
    let sii = izip!(out_sii, &carry.sii).map(|(o, c)| o ^ *c).collect();
    let out = BoolRss::new(si, sii, 1)?;
    party.wait_for_completion();
    Ok(out)
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

    use super::{a2b, msb};

    fn a2b_roundtrip<R: RingWord>(n: usize) {
        let mut rng = thread_rng();
        let values: Vec<R> = R::generate(&mut rng, n);
        let (s1, s2, s3) = secret_share_vector_arith(&mut rng, &values);
        let program = |x: RssShareVec<R>| move |p: &mut MainParty| a2b(p, &x).unwrap();
        let ((r1, _), (r2, _), (r3, _)) =
            localhost_setup(program(s1), program(s2), program(s3), None);
        consistent_bool(&r1, &r2, &r3);
        assert_eq!(r1.nbits(), R::BITS);
        assert_eq!(values, reconstruct_bool(&r1, &r2, &r3));
    }

    #[test]
    fn a2b_u8() {
        a2b_roundtrip::<u8>(100);
    }

    #[test]
    fn a2b_u16() {
        a2b_roundtrip::<u16>(100);
    }

    #[test]
    fn a2b_u32() {
        a2b_roundtrip::<u32>(100);
    }

    #[test]
    fn a2b_u64() {
        a2b_roundtrip::<u64>(100);
    }

    #[test]
    fn a2b_u128() {
        a2b_roundtrip::<u128>(25);
    }

    #[test]
    fn a2b_known_summands() {
        // (3, 5, 8) reconstructs to 16
        let (s1, s2, s3) = arith_shares_from_summands::<u64>(&[(3, 5, 8)]);
        let program = |x: RssShareVec<u64>| move |p: &mut MainParty| a2b(p, &x).unwrap();
        let ((r1, _), (r2, _), (r3, _)) =
            localhost_setup(program(s1), program(s2), program(s3), None);
        assert_eq!(reconstruct_bool(&r1, &r2, &r3), vec![16]);
    }

    #[test]
    fn a2b_round_count_u64() {
        let mut rng = thread_rng();
        let values: Vec<u64> = u64::generate(&mut rng, 10);
        let (s1, s2, s3) = secret_share_vector_arith(&mut rng, &values);
        let program = |x: RssShareVec<u64>| {
            move |p: &mut MainParty| {
                p.reset_comm_stats_logical();
                let _ = a2b(p, &x).unwrap();
                p.comm_stats_logical()
            }
        };
        let ((st, _), _, _) = localhost_setup(program(s1), program(s2), program(s3), None);
        // operand prep + g reshare + one packed reshare per cell level
        assert_eq!(st.online_rounds, 2 + 3);
    }

    fn msb_roundtrip<R: RingWord>(n: usize) {
        let mut rng = thread_rng();
        let values: Vec<R> = R::generate(&mut rng, n);
        let (s1, s2, s3) = secret_share_vector_arith(&mut rng, &values);
        let program = |x: RssShareVec<R>| move |p: &mut MainParty| msb(p, &x).unwrap();
        let ((r1, _), (r2, _), (r3, _)) =
            localhost_setup(program(s1), program(s2), program(s3), None);
        consistent_bool(&r1, &r2, &r3);
        assert_eq!(r1.nbits(), 1);
        let actual = reconstruct_bool(&r1, &r2, &r3);
        for (v, bit) in values.iter().zip(actual) {
            let expected = if v.bit(R::BITS - 1) { R::ONE } else { R::ZERO };
            assert_eq!(expected, bit, "wrong sign for {:?}", v);
        }
    }

    #[test]
    fn msb_u8() {
        msb_roundtrip::<u8>(100);
    }

    #[test]
    fn msb_u16() {
        msb_roundtrip::<u16>(100);
    }

    #[test]
    fn msb_u32() {
        msb_roundtrip::<u32>(100);
    }

    #[test]
    fn msb_u64() {
        msb_roundtrip::<u64>(100);
    }

    #[test]
    fn msb_u128() {
        msb_roundtrip::<u128>(25);
    }

    #[test]
    fn msb_known_summands() {
        // 2^31 + 1 + 1 keeps the top bit clear; 2^63 sets it; a sum that
        // wraps past 2^64 clears it again
        let cases: Vec<((u64, u64, u64), u64)> = vec![
            ((1u64 << 31, 1, 1), 0),
            ((1u64 << 63, 0, 0), 1),
            ((u64::MAX, 1, 0), 0),
            ((u64::MAX, 0, 0), 1),
        ];
        let summands: Vec<(u64, u64, u64)> = cases.iter().map(|(s, _)| *s).collect();
        let expected: Vec<u64> = cases.iter().map(|(_, e)| *e).collect();
        let (s1, s2, s3) = arith_shares_from_summands(&summands);
        let program = |x: RssShareVec<u64>| move |p: &mut MainParty| msb(p, &x).unwrap();
        let ((r1, _), (r2, _), (r3, _)) =
            localhost_setup(program(s1), program(s2), program(s3), None);
        assert_eq!(reconstruct_bool(&r1, &r2, &r3), expected);
    }

    #[test]
    fn msb_round_count_u64() {
        let mut rng = thread_rng();
        let values: Vec<u64> = u64::generate(&mut rng, 10);
        let (s1, s2, s3) = secret_share_vector_arith(&mut rng, &values);
        let program = |x: RssShareVec<u64>| {
            move |p: &mut MainParty| {
                p.reset_comm_stats_logical();
                let _ = msb(p, &x).unwrap();
                p.comm_stats_logical()
            }
        };
        let ((st, _), _, _) = localhost_setup(program(s1), program(s2), program(s3), None);
        // operand prep + g reshare + one reshare per radix-4 iteration
        assert_eq!(st.online_rounds, 2 + 3);
    }
}
