//! Self-play training data.
//!
//! When the engine is given an output path, every slot writes the games it
//! plays to its own log file: one [`MoveRecord`] per played move (the
//! position as the network saw it plus the root visit distribution) and the
//! final outcome once the game ends.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use batch_mcts::training::read_game_log;
//!
//! let game = read_game_log(Path::new("/data/run1_0_1700000000000_0.bin"))?;
//! for (record, target) in game.moves.iter().zip(game.value_targets()) {
//!     println!("move {} -> {}", record.move_index, target);
//! }
//! # Ok::<(), batch_mcts::error::RecordError>(())
//! ```

pub mod record;
pub mod writer;

// Re-export main types
pub use record::{GameRecord, LogEntry, MoveRecord};
pub use writer::{log_path, new_run_id, read_game_log, GameLogWriter};
