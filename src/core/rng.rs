//! Deterministic random number generation for move sampling.
//!
//! Every game owns its own stream, derived from the engine seed, the slot
//! index and the game number. Sampling therefore depends only on what happens
//! inside that game, never on how the worker pool interleaves slots.
//!
//! ```
//! use batch_mcts::core::GameRng;
//!
//! let mut a = GameRng::for_game(42, 3, 0);
//! let mut b = GameRng::for_game(42, 3, 0);
//! assert_eq!(a.choose_weighted(&[1.0, 2.0, 3.0]), b.choose_weighted(&[1.0, 2.0, 3.0]));
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Deterministic RNG backed by ChaCha8.
#[derive(Clone, Debug)]
pub struct GameRng {
    inner: ChaCha8Rng,
    seed: u64,
}

impl GameRng {
    /// Create a new RNG with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Stream for game number `game` played in slot `slot`.
    #[must_use]
    pub fn for_game(seed: u64, slot: usize, game: u64) -> Self {
        let slot_seed = seed.wrapping_add((slot as u64 + 1).wrapping_mul(GOLDEN_GAMMA));
        let game_seed = slot_seed ^ game.wrapping_mul(GOLDEN_GAMMA).rotate_left(31);
        Self::new(game_seed)
    }

    /// Seed this stream was created from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform float in [0, 1).
    pub fn gen_unit(&mut self) -> f32 {
        self.inner.gen::<f32>()
    }

    /// Choose an index with probability proportional to its weight.
    ///
    /// Returns `None` if `weights` is empty or sums to zero.
    pub fn choose_weighted(&mut self, weights: &[f32]) -> Option<usize> {
        if weights.is_empty() {
            return None;
        }

        let total: f32 = weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return None;
        }

        let mut threshold = self.gen_unit() * total;

        for (i, &weight) in weights.iter().enumerate() {
            threshold -= weight;
            if threshold < 0.0 {
                return Some(i);
            }
        }

        // Rounding left some mass: return the last non-zero weight.
        weights.iter().rposition(|&w| w > 0.0)
    }
}
