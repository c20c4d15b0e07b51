use crate::rep3_core::network::task::{Direction, IoLayer};
use rand::{CryptoRng, Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

const CR_SEC_PARAM: usize = 128 / 8;

/// Randomness source shared between two parties, set up via a short random
/// seed exchanged at connection time.
///
/// Every party holds two of these, one per neighbor; a value drawn from the
/// stream shared with the next party is, by construction, the same value the
/// next party draws from its previous-stream. All pseudorandom secret
/// sharing in the conversion kernels reduces to synchronized draws from
/// these two streams.
pub struct SharedRng(ChaCha20Rng);

/// Randomness source whose output is identical at all three parties.
pub struct GlobalRng(ChaCha20Rng);

impl SharedRng {
    /// Sets up both pairwise shared rngs of this party in one round.
    ///
    /// Each party samples a seed for the stream it shares with its previous
    /// neighbor and ships it there; the returned pair is
    /// `(shared with next, shared with previous)`.
    pub fn setup_all_pairwise_semi_honest<LocalRng: Rng + CryptoRng>(
        rng: &mut LocalRng,
        io: &IoLayer,
    ) -> (Self, Self) {
        // receive seed from P+1
        let mut seed_next = [0u8; 32];
        let rcv_seed_next = io.receive_slice(Direction::Next, &mut seed_next[0..CR_SEC_PARAM]);

        // create random seed part
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed[0..CR_SEC_PARAM]);
        // send my seed to P-1
        io.send(Direction::Previous, seed[0..CR_SEC_PARAM].to_vec());
        rcv_seed_next
            .rcv()
            .expect("seed exchange with next party failed");
        io.wait_for_completion();

        (
            Self(ChaCha20Rng::from_seed(seed)),
            Self(ChaCha20Rng::from_seed(seed_next)),
        )
    }

}

impl GlobalRng {
    /// Sets up a three-way shared rng in one round: every party contributes
    /// a seed part, ships it to both neighbors, and all parties XOR the
    /// three parts.
    pub fn setup_semi_honest<LocalRng: Rng + CryptoRng>(rng: &mut LocalRng, io: &IoLayer) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed[0..CR_SEC_PARAM]);

        let mut next_seed = [0u8; CR_SEC_PARAM];
        let mut prev_seed = [0u8; CR_SEC_PARAM];
        let rcv_next = io.receive_slice(Direction::Next, &mut next_seed);
        let rcv_prev = io.receive_slice(Direction::Previous, &mut prev_seed);
        io.send(Direction::Next, seed[0..CR_SEC_PARAM].to_vec());
        io.send(Direction::Previous, seed[0..CR_SEC_PARAM].to_vec());
        rcv_next.rcv().expect("seed exchange with next party failed");
        rcv_prev.rcv().expect("seed exchange with prev party failed");
        io.wait_for_completion();

        let mut common_seed = [0u8; 32];
        for i in 0..CR_SEC_PARAM {
            common_seed[i] = seed[i] ^ next_seed[i] ^ prev_seed[i];
        }
        Self(ChaCha20Rng::from_seed(common_seed))
    }
}

impl AsMut<ChaCha20Rng> for SharedRng {
    fn as_mut(&mut self) -> &mut ChaCha20Rng {
        &mut self.0
    }
}

impl AsMut<ChaCha20Rng> for GlobalRng {
    fn as_mut(&mut self) -> &mut ChaCha20Rng {
        &mut self.0
    }
}
