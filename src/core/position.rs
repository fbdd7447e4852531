//! Chess position with draw-rule bookkeeping.
//!
//! `Position` is a value type: [`Position::play`] returns a new position and
//! leaves the receiver untouched. Move generation and legality come from
//! `shakmaty`; this wrapper adds the repetition history and ply counter that
//! self-play termination needs.

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, MoveList, Position as _};

use crate::error::PositionError;

/// Halfmove clock value (in plies) at which the game is drawn.
pub const DRAWING_MOVE_COUNT: u32 = 50;

/// Occurrences of one position that end the game in a draw.
pub const REPETITION_LIMIT: usize = 3;

/// Result of a completed game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    /// Single winner.
    Winner(#[serde(with = "color_serde")] Color),
    /// Draw (no winner).
    Draw,
}

impl GameResult {
    /// Score from White's perspective: +1 win, -1 loss, 0 draw.
    #[must_use]
    pub fn white_score(self) -> i32 {
        match self {
            GameResult::Winner(Color::White) => 1,
            GameResult::Winner(Color::Black) => -1,
            GameResult::Draw => 0,
        }
    }

    /// Value of the result for `color`, in [-1, 1].
    #[must_use]
    pub fn value_for(self, color: Color) -> f32 {
        match self {
            GameResult::Winner(winner) if winner == color => 1.0,
            GameResult::Winner(_) => -1.0,
            GameResult::Draw => 0.0,
        }
    }
}

/// Why a game ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Termination {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    Repetition,
    /// Decided by an endgame tablebase.
    Tablebase,
    /// Adjudicated after the configured ply limit.
    MoveLimit,
}

/// One chess position plus the history needed for draw rules.
#[derive(Clone, Debug)]
pub struct Position {
    chess: Chess,

    /// Hashes of every position since the last zeroing move, current last.
    history: Vec<Zobrist64>,

    /// Plies played since this game was set up.
    ply: u32,
}

impl Default for Position {
    fn default() -> Self {
        Self::from_chess(Chess::default())
    }
}

impl Position {
    /// The standard starting position.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set up from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, PositionError> {
        let fen: Fen = fen.parse()?;
        let chess: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| PositionError::Illegal(e.to_string()))?;
        Ok(Self::from_chess(chess))
    }

    fn from_chess(chess: Chess) -> Self {
        let hash = chess.zobrist_hash::<Zobrist64>(EnPassantMode::Legal);
        Self {
            chess,
            history: vec![hash],
            ply: 0,
        }
    }

    /// Underlying `shakmaty` position.
    #[inline]
    #[must_use]
    pub fn chess(&self) -> &Chess {
        &self.chess
    }

    /// Side to move.
    #[inline]
    #[must_use]
    pub fn turn(&self) -> Color {
        self.chess.turn()
    }

    /// Plies played since setup.
    #[inline]
    #[must_use]
    pub fn ply(&self) -> u32 {
        self.ply
    }

    /// Full move number, starting at 1.
    #[must_use]
    pub fn fullmoves(&self) -> u32 {
        self.chess.fullmoves().get()
    }

    /// Plies since the last capture or pawn move.
    #[must_use]
    pub fn halfmoves(&self) -> u32 {
        self.chess.halfmoves()
    }

    /// Legal moves in generation order.
    #[must_use]
    pub fn legal_moves(&self) -> MoveList {
        self.chess.legal_moves()
    }

    /// Play a legal move, returning the resulting position.
    ///
    /// `mv` must come from [`legal_moves`](Self::legal_moves) of this position.
    #[must_use]
    pub fn play(&self, mv: &Move) -> Position {
        let mut chess = self.chess.clone();
        chess.play_unchecked(mv);
        let hash = chess.zobrist_hash::<Zobrist64>(EnPassantMode::Legal);

        let history = if mv.is_zeroing() {
            vec![hash]
        } else {
            let mut history = Vec::with_capacity(self.history.len() + 1);
            history.extend_from_slice(&self.history);
            history.push(hash);
            history
        };

        Position {
            chess,
            history,
            ply: self.ply + 1,
        }
    }

    /// Number of pieces on the board, kings included.
    #[must_use]
    pub fn piece_count(&self) -> usize {
        self.chess.board().occupied().count()
    }

    /// Whether either side may still castle.
    #[must_use]
    pub fn has_castling_rights(&self) -> bool {
        self.chess.castles().castling_rights().any()
    }

    /// How many times the current position has occurred since the last
    /// zeroing move, the current occurrence included.
    #[must_use]
    pub fn repetitions(&self) -> usize {
        match self.history.last() {
            Some(current) => self.history.iter().filter(|h| *h == current).count(),
            None => 0,
        }
    }

    /// The game-ending condition of this position under the rules, if any.
    ///
    /// Checkmate takes precedence over the draw rules.
    #[must_use]
    pub fn termination(&self) -> Option<(Termination, GameResult)> {
        if self.chess.is_checkmate() {
            return Some((Termination::Checkmate, GameResult::Winner(!self.turn())));
        }
        if self.chess.is_stalemate() {
            return Some((Termination::Stalemate, GameResult::Draw));
        }
        if self.chess.is_insufficient_material() {
            return Some((Termination::InsufficientMaterial, GameResult::Draw));
        }
        if self.halfmoves() >= 2 * DRAWING_MOVE_COUNT {
            return Some((Termination::FiftyMoveRule, GameResult::Draw));
        }
        if self.repetitions() >= REPETITION_LIMIT {
            return Some((Termination::Repetition, GameResult::Draw));
        }
        None
    }
}

mod color_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use shakmaty::Color;

    pub fn serialize<S: Serializer>(color: &Color, serializer: S) -> Result<S::Ok, S::Error> {
        color.is_white().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
        Ok(Color::from_white(bool::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::uci::UciMove;

    fn play_uci(pos: &Position, uci: &str) -> Position {
        let uci: UciMove = uci.parse().unwrap();
        let mv = uci.to_move(pos.chess()).unwrap();
        pos.play(&mv)
    }

    #[test]
    fn test_start_position() {
        let pos = Position::new();
        assert_eq!(pos.turn(), Color::White);
        assert_eq!(pos.legal_moves().len(), 20);
        assert_eq!(pos.piece_count(), 32);
        assert!(pos.has_castling_rights());
        assert_eq!(pos.ply(), 0);
        assert!(pos.termination().is_none());
    }

    #[test]
    fn test_play_is_pure() {
        let pos = Position::new();
        let next = play_uci(&pos, "e2e4");

        assert_eq!(pos.turn(), Color::White);
        assert_eq!(next.turn(), Color::Black);
        assert_eq!(next.ply(), 1);
        assert_eq!(pos.ply(), 0);
    }

    #[test]
    fn test_checkmate() {
        let mut pos = Position::new();
        for mv in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            pos = play_uci(&pos, mv);
        }
        let (kind, result) = pos.termination().unwrap();
        assert_eq!(kind, Termination::Checkmate);
        assert_eq!(result, GameResult::Winner(Color::Black));
        assert_eq!(result.white_score(), -1);
    }

    #[test]
    fn test_stalemate() {
        let pos = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(pos.termination(), Some((Termination::Stalemate, GameResult::Draw)));
    }

    #[test]
    fn test_insufficient_material() {
        let pos = Position::from_fen("8/8/4k3/8/8/3K4/8/8 w - - 0 1").unwrap();
        assert_eq!(
            pos.termination().map(|(kind, _)| kind),
            Some(Termination::InsufficientMaterial)
        );
    }

    #[test]
    fn test_fifty_move_rule() {
        let pos = Position::from_fen("8/8/4k3/8/8/3K4/8/R7 w - - 100 80").unwrap();
        assert_eq!(
            pos.termination().map(|(kind, _)| kind),
            Some(Termination::FiftyMoveRule)
        );
    }

    #[test]
    fn test_threefold_repetition() {
        let mut pos = Position::new();
        for mv in ["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1"] {
            pos = play_uci(&pos, mv);
            assert!(pos.termination().is_none());
        }
        pos = play_uci(&pos, "f6g8");
        assert_eq!(pos.repetitions(), 3);
        assert_eq!(
            pos.termination().map(|(kind, _)| kind),
            Some(Termination::Repetition)
        );
    }

    #[test]
    fn test_zeroing_move_clears_history() {
        let mut pos = Position::new();
        for mv in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            pos = play_uci(&pos, mv);
        }
        assert_eq!(pos.repetitions(), 2);

        let pos = play_uci(&pos, "e2e4");
        assert_eq!(pos.repetitions(), 1);
    }

    #[test]
    fn test_invalid_fen() {
        assert!(Position::from_fen("not a fen").is_err());
    }

    #[test]
    fn test_result_values() {
        let win = GameResult::Winner(Color::White);
        assert_eq!(win.value_for(Color::White), 1.0);
        assert_eq!(win.value_for(Color::Black), -1.0);
        assert_eq!(GameResult::Draw.value_for(Color::Black), 0.0);
        assert_eq!(GameResult::Draw.white_score(), 0);
    }
}
