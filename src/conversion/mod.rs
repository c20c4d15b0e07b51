//! Share conversions between the arithmetic and boolean representations.
//!
//! The conversion kernels operate on flat tensors of
//! [crate::ring::RingWord] elements:
//! arithmetic values as [crate::rep3_core::share::RssShareVec], boolean
//! values as the three flavors in [crate::sharing]. All kernels are linear
//! pipelines without retries; transport failures and precondition
//! violations surface immediately through
//! [crate::rep3_core::party::error::MpcError].
//!
//! The top-level operations:
//!
//! * [ppa::a2b] / [ppa::msb] — arithmetic to boolean, full conversion or
//!   sign bit only, through the radix-4 multi-fan-in prefix adder.
//! * [b2a::b2a] — boolean to arithmetic, adder- or OT-based by width.
//! * [eqz::eqz], [eqz::equal_aa], [eqz::equal_ap] — equality tests.
//!
//! The layers underneath ([gates], [reshare], [bitops], [adder]) are public
//! building blocks with the same calling conventions.
pub mod adder;
pub mod b2a;
pub mod bitops;
pub mod eqz;
pub mod gates;
pub mod ppa;
pub mod reshare;

pub use adder::add_bb;
pub use b2a::{b2a, b2a_via_ot, b2a_via_ppa};
pub use eqz::{eqz, equal_aa, equal_ap};
pub use ppa::{a2b, msb};

#[cfg(test)]
mod test {
    use rand::thread_rng;

    use crate::rep3_core::party::test_export::localhost_setup;
    use crate::rep3_core::party::{MainParty, RngExt};
    use crate::ring::RingWord;
    use crate::sharing::test::{
        consistent_arith, consistent_bool, reconstruct_bool, secret_share_vector_arith,
        secret_share_vector_bool,
    };
    use crate::sharing::{reconstruct_arith, BoolRss};

    use super::{a2b, b2a};
    use crate::rep3_core::share::RssShareVec;

    /// `A2B . B2A` is the identity on boolean tensors of full width.
    #[test]
    fn a2b_after_b2a_is_identity() {
        let mut rng = thread_rng();
        let values: Vec<u64> = u64::generate(&mut rng, 30);
        let (b1, b2, b3) = secret_share_vector_bool(&mut rng, &values, 64);
        let program = |x: BoolRss<u64>| {
            move |p: &mut MainParty| {
                let arith = b2a(p, &x).unwrap();
                a2b(p, &arith).unwrap()
            }
        };
        let ((r1, _), (r2, _), (r3, _)) =
            localhost_setup(program(b1), program(b2), program(b3), None);
        consistent_bool(&r1, &r2, &r3);
        assert_eq!(values, reconstruct_bool(&r1, &r2, &r3));
    }

    /// `B2A . A2B` is the identity on arithmetic tensors.
    #[test]
    fn b2a_after_a2b_is_identity() {
        fn roundtrip<R: RingWord>(n: usize) {
            let mut rng = thread_rng();
            let values: Vec<R> = R::generate(&mut rng, n);
            let (s1, s2, s3) = secret_share_vector_arith(&mut rng, &values);
            let program = |x: RssShareVec<R>| {
                move |p: &mut MainParty| {
                    let boolean = a2b(p, &x).unwrap();
                    b2a(p, &boolean).unwrap()
                }
            };
            let ((r1, _), (r2, _), (r3, _)) =
                localhost_setup(program(s1), program(s2), program(s3), None);
            consistent_arith(&r1, &r2, &r3);
            assert_eq!(values, reconstruct_arith(&r1, &r2, &r3));
        }
        roundtrip::<u64>(30);
        roundtrip::<u8>(30);
    }
}
