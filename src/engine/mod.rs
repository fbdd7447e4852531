//! Batched self-play engine.
//!
//! ## Overview
//!
//! - **GameSlot**: one game, its position, search tree and move history
//! - **Sector**: `batch_size` slots plus the leaves awaiting evaluation
//! - **BatchEngine**: all sectors, the worker pool and the select/update
//!   protocol
//!
//! ## Usage
//!
//! ```rust
//! use batch_mcts::core::POLICY_SIZE;
//! use batch_mcts::engine::BatchEngine;
//! use batch_mcts::mcts::EngineConfig;
//!
//! let config = EngineConfig::default()
//!     .with_simulations(2)
//!     .with_batching(4, 1);
//! let mut engine = BatchEngine::new(config)?;
//!
//! while !engine.all_moves_decided() {
//!     let batch = engine.select()?;
//!     let (_boards, _metadata) = engine.eval_batch(batch.sector)?;
//!     // Run the network on the boards here.
//!     let values = vec![0.0; batch.len];
//!     let policies = vec![1.0; batch.len * POLICY_SIZE];
//!     engine.update(&values, &policies)?;
//! }
//! engine.play_best_moves(false)?;
//! # Ok::<(), batch_mcts::error::EngineError>(())
//! ```

pub mod batch;
pub mod sector;
pub mod slot;

// Re-export main types
pub use batch::{BatchEngine, SelectedBatch};
pub use sector::{Sector, SectorOutcome, SectorPhase};
pub use slot::{FinishedGame, GameSlot, PendingLeaf, SearchContext, SlotStatus};
