/// A party's RSS-share of a (2,3)-shared element.
///
/// Party `i` holds the pair `(x_i, x_{i+1})` of the three summands
/// `x = x_0 + x_1 + x_2`; two consecutive parties therefore overlap in one
/// summand, which is what makes resharing a single rotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RssShare<T> {
    /// The first share of the party.
    pub si: T,
    /// The second share of the party.
    pub sii: T,
}

/// A vector of [RssShare]s.
pub type RssShareVec<T> = Vec<RssShare<T>>;

/// Provides the neutral element of addition.
pub trait HasZero {
    /// Zero, the neutral element of addition.
    const ZERO: Self;
}

impl<T> RssShare<T> {
    /// Computes an RSS-share given two shares.
    pub fn from(si: T, sii: T) -> Self {
        Self { si, sii }
    }
}

impl<T: Copy> Copy for RssShare<T> {}

impl<T: HasZero> HasZero for RssShare<T> {
    const ZERO: Self = Self {
        si: T::ZERO,
        sii: T::ZERO,
    };
}
