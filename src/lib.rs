//! # batch-mcts
//!
//! Batched multi-sector Monte Carlo Tree Search for chess self-play.
//!
//! ## Design Principles
//!
//! 1. **Batch-First**: Leaves from many games are collected into one batch
//!    per sector, so the network is always queried in bulk.
//!
//! 2. **Pipelined Sectors**: While one sector's batch is being evaluated the
//!    next sector is searched. Any sector count from 1 upward works the same.
//!
//! 3. **No Shared Trees**: Every game slot owns its tree; worker threads
//!    never lock game state. Virtual loss keeps repeated selections apart.
//!
//! ## Architecture
//!
//! - **Arena Trees**: Nodes indexed by `NodeId`; playing a move copies the
//!   chosen subtree into a fresh arena and drops the rest.
//!
//! - **External Evaluation**: The engine hands out encoded leaves and takes
//!   back values and policies; it never runs a network itself.
//!
//! - **Exact Endgames**: A tablebase oracle decides small positions without
//!   the network, both inside the search and at the game root.
//!
//! ## Modules
//!
//! - `core`: Position, board/move encoding, RNG
//! - `tablebase`: Endgame oracle trait and Syzygy adapter
//! - `mcts`: Tree, PUCT selection, expansion and backup, configuration
//! - `engine`: Game slots, sectors and the batch engine
//! - `evaluator`: Evaluator trait and the self-play driving loop
//! - `training`: Self-play game logs

pub mod core;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod mcts;
pub mod tablebase;
pub mod training;

#[cfg(feature = "python")]
pub mod python;

// Re-export commonly used types
pub use crate::core::{GameResult, GameRng, Position, Termination, POLICY_SIZE};

pub use crate::engine::{BatchEngine, FinishedGame, GameSlot, SelectedBatch, SlotStatus};

pub use crate::error::{EngineError, Result};

pub use crate::evaluator::{BatchEvaluator, EvalBatch, EvalOutput, SelfPlayDriver, UniformEvaluator};

pub use crate::mcts::{
    EngineConfig, MCTSNode, MCTSTree, NodeId, Edge, PolicyFormat, Puct, SearchParams,
    SearchStats, SelectionPolicy, TreeStats,
};

pub use crate::tablebase::{NullOracle, SyzygyOracle, TablebaseOracle, Verdict};

pub use crate::training::{GameLogWriter, GameRecord, MoveRecord};
