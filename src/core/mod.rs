//! Core types: positions, network encodings, RNG.
//!
//! Everything here is independent of the search: a [`Position`] knows the
//! rules of chess and how a game ends, the encoding functions translate it to
//! and from network tensors, and [`GameRng`] drives move sampling.

pub mod encoding;
pub mod position;
pub mod rng;

pub use encoding::{
    encode_board, encode_metadata, legal_move_indices, move_index, BOARD_SIZE, METADATA_SIZE,
    POLICY_SIZE,
};
pub use position::{GameResult, Position, Termination};
pub use rng::GameRng;
