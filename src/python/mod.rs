//! Python bindings for the batch MCTS engine.
//!
//! # Quick Start
//!
//! ```python
//! import numpy as np
//! import batch_mcts
//!
//! engine = batch_mcts.BatchMCTS(simulations_per_move=100, batch_size=256, num_sectors=2)
//!
//! while not engine.all_moves_decided():
//!     sector, n = engine.select()
//!     boards, metadata = engine.boards(sector), engine.metadata(sector)
//!     policies, values = model(boards, metadata)  # (n, 8, 8, 73), (n,)
//!     engine.update(values, policies)
//! engine.play_best_moves()
//! ```
//!
//! With `autoplay=True` the engine plays and replaces games on its own.
//! Finished games are kept until drained, so drain them as you go:
//!
//! ```python
//! engine = batch_mcts.BatchMCTS(autoplay=True, output_path="games/run")
//!
//! while training:
//!     sector, n = engine.select()
//!     policies, values = model(engine.boards(sector), engine.metadata(sector))
//!     engine.update(values, policies)
//!     for slot, game, white_score, plies in engine.drain_finished_games():
//!         record(slot, game, white_score, plies)
//! ```

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::error::EngineError;

mod py_engine;

pub use py_engine::*;

impl From<EngineError> for PyErr {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidConfig(_)
            | EngineError::InvalidTemperature(_)
            | EngineError::ShapeMismatch { .. }
            | EngineError::UnknownSector(_) => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

/// batch_mcts: batched multi-sector MCTS for chess self-play.
#[pymodule]
fn batch_mcts(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyBatchEngine>()?;
    m.add("POLICY_SIZE", crate::core::POLICY_SIZE)?;
    m.add("BOARD_SIZE", crate::core::BOARD_SIZE)?;
    m.add("METADATA_SIZE", crate::core::METADATA_SIZE)?;
    Ok(())
}
