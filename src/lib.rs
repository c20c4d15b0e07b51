//! This crate implements the share-conversion core of a semi-honest
//! three-party MPC runtime over `Z/2^k`.
//!
//! Secret values live in one of several representations: arithmetic
//! replicated shares (addition mod `2^k`), boolean replicated shares (XOR),
//! boolean additive shares, and a masked representation whose public part
//! makes AND gates communication-free online. The [conversion] module
//! provides the transitions between these representations (A2B, B2A, MSB
//! extraction) together with equality tests, built on top of the party and
//! networking core in [rep3_core].
pub mod conversion;
pub mod rep3_core;
pub mod ring;
pub mod sharing;
