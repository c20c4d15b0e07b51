//! The representation layer: the three boolean sharing flavors.
//!
//! Arithmetic values travel as [RssShareVec] of a [RingWord]; boolean values
//! travel in one of the three tensor types below. Each tensor carries the
//! live bit-width `nbits` of its elements; operations preserve or shrink it
//! (splits halve it, packs sum two widths). The sharing kind is the *type*,
//! not a runtime tag, so an ASS value physically holds one word vector
//! instead of a replicated container with a dead slot.
use crate::rep3_core::party::error::{MpcError, MpcResult};
use crate::rep3_core::share::RssShareVec;
use crate::ring::RingWord;

fn check_nbits<R: RingWord>(nbits: usize) -> MpcResult<()> {
    if nbits > R::BITS {
        return Err(MpcError::InvalidParameters(format!(
            "nbits={} exceeds the {}-bit word",
            nbits,
            R::BITS
        )));
    }
    Ok(())
}

/// A replicated boolean sharing: party `i` holds `(x_i, x_{i+1})` of
/// `x = x_0 ^ x_1 ^ x_2`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoolRss<R> {
    pub si: Vec<R>,
    pub sii: Vec<R>,
    nbits: usize,
}

/// An additive boolean sharing: party `i` holds only `x_i` of
/// `x = x_0 ^ x_1 ^ x_2`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoolAss<R> {
    pub s: Vec<R>,
    nbits: usize,
}

/// A masked boolean sharing: `x = D ^ d_0 ^ d_1 ^ d_2` where the masked
/// value `D` is public (identical at every party) and the mask `d` is
/// RSS-shared; party `i` holds `(D, d_i, d_{i+1})`.
///
/// Because `D` is public, AND gates on two MSS operands need no online
/// communication, which is the entire reason this representation exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoolMss<R> {
    /// The public masked value `D`.
    pub mv: Vec<R>,
    pub di: Vec<R>,
    pub dii: Vec<R>,
    nbits: usize,
}

impl<R: RingWord> BoolRss<R> {
    pub fn new(si: Vec<R>, sii: Vec<R>, nbits: usize) -> MpcResult<Self> {
        check_nbits::<R>(nbits)?;
        if si.len() != sii.len() {
            return Err(MpcError::InvalidParameters(format!(
                "slot lengths differ: {} vs {}",
                si.len(),
                sii.len()
            )));
        }
        Ok(Self { si, sii, nbits })
    }

    pub fn zero(n: usize, nbits: usize) -> MpcResult<Self> {
        Self::new(vec![R::ZERO; n], vec![R::ZERO; n], nbits)
    }

    pub fn len(&self) -> usize {
        self.si.len()
    }

    pub fn is_empty(&self) -> bool {
        self.si.is_empty()
    }

    pub fn nbits(&self) -> usize {
        self.nbits
    }
}

impl<R: RingWord> BoolAss<R> {
    pub fn new(s: Vec<R>, nbits: usize) -> MpcResult<Self> {
        check_nbits::<R>(nbits)?;
        Ok(Self { s, nbits })
    }

    pub fn zero(n: usize, nbits: usize) -> MpcResult<Self> {
        Self::new(vec![R::ZERO; n], nbits)
    }

    pub fn len(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    pub fn nbits(&self) -> usize {
        self.nbits
    }
}

impl<R: RingWord> BoolMss<R> {
    pub fn new(mv: Vec<R>, di: Vec<R>, dii: Vec<R>, nbits: usize) -> MpcResult<Self> {
        check_nbits::<R>(nbits)?;
        if mv.len() != di.len() || mv.len() != dii.len() {
            return Err(MpcError::InvalidParameters(format!(
                "slot lengths differ: {} vs {} vs {}",
                mv.len(),
                di.len(),
                dii.len()
            )));
        }
        Ok(Self {
            mv,
            di,
            dii,
            nbits,
        })
    }

    pub fn zero(n: usize, nbits: usize) -> MpcResult<Self> {
        Self::new(vec![R::ZERO; n], vec![R::ZERO; n], vec![R::ZERO; n], nbits)
    }

    pub fn len(&self) -> usize {
        self.mv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mv.is_empty()
    }

    pub fn nbits(&self) -> usize {
        self.nbits
    }
}

/// The common bit-width of a binary gate: the minimum of both inputs.
pub fn gate_nbits(lhs: usize, rhs: usize) -> usize {
    usize::min(lhs, rhs)
}

/// Checks that two tensors have the same element count.
pub fn check_same_len(lhs: usize, rhs: usize) -> MpcResult<()> {
    if lhs != rhs {
        return Err(MpcError::InvalidParameters(format!(
            "element counts differ: {} vs {}",
            lhs, rhs
        )));
    }
    Ok(())
}

/// Sums the three arithmetic summands back together.
pub fn reconstruct_arith<R: RingWord>(
    s1: &RssShareVec<R>,
    s2: &RssShareVec<R>,
    s3: &RssShareVec<R>,
) -> Vec<R> {
    s1.iter()
        .zip(s2)
        .zip(s3)
        .map(|((a, b), c)| a.si.wrapping_add(b.si).wrapping_add(c.si))
        .collect()
}
