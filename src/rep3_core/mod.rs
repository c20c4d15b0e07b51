//! The basic three-party core: networking, party state and replicated shares.
pub mod network;
pub mod party;
pub mod share;
