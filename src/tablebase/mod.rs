//! Exact endgame oracle.
//!
//! The engine consults a [`TablebaseOracle`] at search leaves and at the game
//! root. A definite [`Verdict`] replaces network evaluation; anything the
//! oracle cannot answer is [`Verdict::Unknown`] and search proceeds normally.

mod syzygy;

use std::path::Path;
use std::sync::Arc;

use shakmaty::Color;
use tracing::info;

use crate::core::{GameResult, Position};

pub use syzygy::SyzygyOracle;

/// Game-theoretic result for the side to move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verdict {
    Win,
    Loss,
    Draw,
    Unknown,
}

impl Verdict {
    /// Value for the side to move, or `None` if unknown.
    #[must_use]
    pub fn value(self) -> Option<f32> {
        match self {
            Verdict::Win => Some(1.0),
            Verdict::Loss => Some(-1.0),
            Verdict::Draw => Some(0.0),
            Verdict::Unknown => None,
        }
    }

    /// Game result when `turn` is the side to move, or `None` if unknown.
    #[must_use]
    pub fn result(self, turn: Color) -> Option<GameResult> {
        match self {
            Verdict::Win => Some(GameResult::Winner(turn)),
            Verdict::Loss => Some(GameResult::Winner(!turn)),
            Verdict::Draw => Some(GameResult::Draw),
            Verdict::Unknown => None,
        }
    }
}

/// Read-only endgame lookup shared by every worker thread.
pub trait TablebaseOracle: Send + Sync {
    /// Largest piece count (kings included) the oracle can answer.
    fn max_pieces(&self) -> usize;

    /// Look up `pos`. Callers go through [`probe`] so that out-of-range
    /// positions never reach this method.
    fn probe(&self, pos: &Position) -> Verdict;
}

/// Probe `oracle` if `pos` is within its supported material range.
///
/// Positions with castling rights are never probed.
pub fn probe(oracle: &dyn TablebaseOracle, pos: &Position) -> Verdict {
    let max = oracle.max_pieces();
    if max == 0 || pos.piece_count() > max || pos.has_castling_rights() {
        return Verdict::Unknown;
    }
    oracle.probe(pos)
}

/// Oracle that knows nothing. Used when no tablebase is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullOracle;

impl TablebaseOracle for NullOracle {
    fn max_pieces(&self) -> usize {
        0
    }

    fn probe(&self, _pos: &Position) -> Verdict {
        Verdict::Unknown
    }
}

/// Open the oracle for `path`, or a [`NullOracle`] if no path is given.
///
/// Never fails: unreadable tables leave an oracle that answers `Unknown`.
pub fn open_oracle(path: Option<&Path>) -> Arc<dyn TablebaseOracle> {
    match path {
        Some(path) if !path.as_os_str().is_empty() => Arc::new(SyzygyOracle::open(path)),
        _ => {
            info!("no tablebase configured");
            Arc::new(NullOracle)
        }
    }
}
