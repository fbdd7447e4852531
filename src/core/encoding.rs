//! Network input/output encoding.
//!
//! Every encoding is relative to the side to move: for Black the board is
//! rotated 180 degrees, so the mover's pieces always start on the low ranks
//! and "north" always points towards the opponent.
//!
//! ## Layout
//!
//! - Board: 64 `i32` codes, index `rank * 8 + file`.
//! - Metadata: [`METADATA_SIZE`] `i32` values (castling rights, en passant).
//! - Policy: [`POLICY_SIZE`] floats, index `(from_rank * 8 + from_file) * 73 + plane`.

use shakmaty::{CastlingSide, Color, EnPassantMode, Move, Position as _, Role};

use super::position::Position;

/// Squares per board.
pub const BOARD_SIZE: usize = 64;

/// Metadata entries per position.
pub const METADATA_SIZE: usize = 5;

/// Move-type planes per from-square.
pub const POLICY_PLANES: usize = 73;

/// Length of one policy vector.
pub const POLICY_SIZE: usize = BOARD_SIZE * POLICY_PLANES;

/// Board code of an empty square.
pub const EMPTY_SQUARE: i32 = 14;

/// Added to the piece code of the opponent's pieces.
pub const OPPONENT_OFFSET: i32 = 8;

/// Metadata value for "no en passant square".
pub const NO_SQUARE: i32 = 64;

const KNIGHT_PLANE: usize = 56;
const UNDERPROMOTION_PLANE: usize = 64;

/// Knight jumps as (rank delta, file delta), in plane order.
const KNIGHT_JUMPS: [(i32, i32); 8] = [
    (2, 1),
    (1, 2),
    (-1, 2),
    (-2, 1),
    (-2, -1),
    (-1, -2),
    (1, -2),
    (2, -1),
];

#[inline]
fn relative_index(square: u32, turn: Color) -> i32 {
    match turn {
        Color::White => square as i32,
        Color::Black => 63 - square as i32,
    }
}

fn role_code(role: Role) -> i32 {
    match role {
        Role::Pawn => 0,
        Role::Knight => 1,
        Role::Bishop => 2,
        Role::Rook => 3,
        Role::Queen => 4,
        Role::King => 5,
    }
}

/// Write the 64 board codes of `pos` into `out`.
pub fn encode_board(pos: &Position, out: &mut [i32]) {
    debug_assert_eq!(out.len(), BOARD_SIZE);
    out.fill(EMPTY_SQUARE);

    let turn = pos.turn();
    let board = pos.chess().board();
    for square in board.occupied() {
        if let Some(piece) = board.piece_at(square) {
            let mut code = role_code(piece.role);
            if piece.color != turn {
                code += OPPONENT_OFFSET;
            }
            out[relative_index(u32::from(square), turn) as usize] = code;
        }
    }
}

/// Write the metadata of `pos` into `out`.
///
/// Layout: own kingside, own queenside, opponent kingside, opponent queenside
/// castling availability (1/0), then the en passant target square in the
/// mover's frame or [`NO_SQUARE`].
pub fn encode_metadata(pos: &Position, out: &mut [i32]) {
    debug_assert_eq!(out.len(), METADATA_SIZE);

    let turn = pos.turn();
    let castles = pos.chess().castles();
    let flag = |color: Color, side: CastlingSide| i32::from(castles.has(color, side));

    out[0] = flag(turn, CastlingSide::KingSide);
    out[1] = flag(turn, CastlingSide::QueenSide);
    out[2] = flag(!turn, CastlingSide::KingSide);
    out[3] = flag(!turn, CastlingSide::QueenSide);
    out[4] = pos
        .chess()
        .ep_square(EnPassantMode::Legal)
        .map_or(NO_SQUARE, |sq| relative_index(u32::from(sq), turn));
}

/// Destination square of a move; for castling, where the king lands.
fn destination(mv: &Move) -> u32 {
    match *mv {
        Move::Castle { king, rook } => {
            let king = u32::from(king);
            let rank_start = king / 8 * 8;
            if u32::from(rook) % 8 > king % 8 {
                rank_start + 6
            } else {
                rank_start + 2
            }
        }
        _ => u32::from(mv.to()),
    }
}

fn sliding_direction(dr: i32, dc: i32) -> Option<usize> {
    if dr != 0 && dc != 0 && dr.abs() != dc.abs() {
        return None;
    }
    let dir = match (dr.signum(), dc.signum()) {
        (1, 0) => 0,
        (1, 1) => 1,
        (0, 1) => 2,
        (-1, 1) => 3,
        (-1, 0) => 4,
        (-1, -1) => 5,
        (0, -1) => 6,
        (1, -1) => 7,
        _ => return None,
    };
    Some(dir)
}

/// Policy index of `mv` played by `turn`.
///
/// Returns `None` for moves that have no from-square (drops), which never
/// occur in standard chess.
#[must_use]
pub fn move_index(mv: &Move, turn: Color) -> Option<usize> {
    let from = relative_index(u32::from(mv.from()?), turn);
    let to = relative_index(destination(mv), turn);
    let (dr, dc) = (to / 8 - from / 8, to % 8 - from % 8);

    let plane = match mv.promotion() {
        Some(role) if role != Role::Queen => {
            let piece = match role {
                Role::Knight => 0,
                Role::Bishop => 1,
                Role::Rook => 2,
                _ => return None,
            };
            UNDERPROMOTION_PLANE + piece * 3 + (dc + 1) as usize
        }
        _ => {
            if let Some(jump) = KNIGHT_JUMPS.iter().position(|&j| j == (dr, dc)) {
                KNIGHT_PLANE + jump
            } else {
                let dir = sliding_direction(dr, dc)?;
                let distance = dr.abs().max(dc.abs()) as usize;
                dir * 7 + distance - 1
            }
        }
    };

    Some(from as usize * POLICY_PLANES + plane)
}

/// Legal moves of `pos` paired with their policy indices, in generation order.
#[must_use]
pub fn legal_move_indices(pos: &Position) -> Vec<(Move, usize)> {
    let turn = pos.turn();
    pos.legal_moves()
        .into_iter()
        .filter_map(|mv| move_index(&mv, turn).map(|idx| (mv, idx)))
        .collect()
}
