//! Self-play game log records.
//!
//! A game log is a sequence of [`LogEntry`] values: one `Move` per played
//! move, then a single `Outcome` once the game is over.

use serde::{Deserialize, Serialize};

use crate::core::{GameResult, Termination};

/// One played move, as seen by the network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Encoded board before the move (64 codes, mover's frame).
    pub board: Vec<i32>,

    /// Encoded metadata before the move.
    pub metadata: [i32; 5],

    /// Root visit proportions, keyed by policy index. Moves with no
    /// visits are omitted.
    pub policy: Vec<(u16, f32)>,

    /// Policy index of the move actually played.
    pub move_index: u16,

    /// Side to move.
    pub white_to_move: bool,

    /// Mean root value for the side to move when the move was chosen.
    pub root_value: f32,
}

impl MoveRecord {
    /// Visit proportion recorded for `policy_index` (0 if absent).
    pub fn probability(&self, policy_index: u16) -> f32 {
        self.policy
            .iter()
            .find(|(idx, _)| *idx == policy_index)
            .map_or(0.0, |(_, p)| *p)
    }
}

/// A single entry in a game log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    Move(MoveRecord),
    Outcome {
        /// White's score: +1, 0 or -1.
        result: i8,
        termination: Termination,
    },
}

impl LogEntry {
    /// Outcome entry for a finished game.
    pub fn outcome(result: GameResult, termination: Termination) -> Self {
        LogEntry::Outcome {
            result: result.white_score() as i8,
            termination,
        }
    }
}

/// A game log read back from disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Played moves in order.
    pub moves: Vec<MoveRecord>,

    /// White's score, if the game reached its end.
    pub result: Option<i8>,

    /// How the game ended, if it did.
    pub termination: Option<Termination>,
}

impl GameRecord {
    /// Number of recorded moves.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Whether no moves were recorded.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Whether the log ends with an outcome.
    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    /// Value target for each recorded move, from the mover's perspective.
    ///
    /// Empty for incomplete games.
    pub fn value_targets(&self) -> Vec<f32> {
        let Some(result) = self.result else {
            return Vec::new();
        };
        self.moves
            .iter()
            .map(|m| {
                let white = f32::from(result);
                if m.white_to_move {
                    white
                } else {
                    -white
                }
            })
            .collect()
    }

    pub(crate) fn push(&mut self, entry: LogEntry) {
        match entry {
            LogEntry::Move(record) => self.moves.push(record),
            LogEntry::Outcome { result, termination } => {
                self.result = Some(result);
                self.termination = Some(termination);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::Color;

    fn record(white_to_move: bool) -> MoveRecord {
        MoveRecord {
            board: vec![14; 64],
            metadata: [1, 1, 1, 1, 64],
            policy: vec![(10, 0.75), (20, 0.25)],
            move_index: 10,
            white_to_move,
            root_value: 0.1,
        }
    }

    #[test]
    fn test_probability_lookup() {
        let r = record(true);
        assert_eq!(r.probability(10), 0.75);
        assert_eq!(r.probability(99), 0.0);
    }

    #[test]
    fn test_value_targets_alternate() {
        let mut game = GameRecord::default();
        game.push(LogEntry::Move(record(true)));
        game.push(LogEntry::Move(record(false)));
        assert!(!game.is_complete());
        assert!(game.value_targets().is_empty());

        game.push(LogEntry::outcome(
            GameResult::Winner(Color::Black),
            Termination::Checkmate,
        ));
        assert!(game.is_complete());
        assert_eq!(game.value_targets(), vec![-1.0, 1.0]);
        assert_eq!(game.termination, Some(Termination::Checkmate));
    }

    #[test]
    fn test_entry_serialization() {
        let entry = LogEntry::Move(record(false));
        let bytes = bincode::serialize(&entry).unwrap();
        let back: LogEntry = bincode::deserialize(&bytes).unwrap();
        assert_eq!(entry, back);
    }
}
