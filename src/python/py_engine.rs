//! Engine bindings for Python.

use numpy::{
    PyArray1, PyArray2, PyArray3, PyArrayMethods, PyReadonlyArrayDyn, PyReadwriteArray1,
    PyReadwriteArrayDyn,
};
use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;

use crate::core::{BOARD_SIZE, METADATA_SIZE};
use crate::engine::BatchEngine;
use crate::mcts::{EngineConfig, PolicyFormat, DEFAULT_NUM_SECTORS, SELF_PLAY_LATE_TEMPERATURE};

/// Batched multi-sector MCTS engine.
///
/// Protocol: `select()` returns `(sector, n)`; read the `n` leaves with
/// `boards(sector)` / `metadata(sector)` (or `write_inputs`), evaluate them,
/// then call `update(values, policies)` with `n` values and `n` policies of
/// 4672 entries (any shape that flattens to `n * 4672`).
#[pyclass(name = "BatchMCTS")]
pub struct PyBatchEngine {
    inner: Option<BatchEngine>,
}

impl PyBatchEngine {
    fn engine(&self) -> PyResult<&BatchEngine> {
        self.inner
            .as_ref()
            .ok_or_else(|| PyRuntimeError::new_err("engine is closed"))
    }

    fn engine_mut(&mut self) -> PyResult<&mut BatchEngine> {
        self.inner
            .as_mut()
            .ok_or_else(|| PyRuntimeError::new_err("engine is closed"))
    }
}

#[pymethods]
impl PyBatchEngine {
    /// Create an engine.
    ///
    /// # Arguments
    /// - simulations_per_move: Simulations before a move is decided (default: 800)
    /// - temperature: Move sampling temperature (default: 1.0)
    /// - autoplay: Play decided moves and replace finished games (default: False)
    /// - output_path: Base path for game logs, or None
    /// - num_threads: Worker threads (default: 1)
    /// - batch_size: Games per sector (default: 64)
    /// - num_sectors: Sectors rotated round-robin (default: 2)
    /// - cpuct: PUCT exploration constant (default: 1.25)
    /// - tablebase_path: Syzygy directory, or None
    /// - temperature_threshold: Ply at which games switch to `late_temperature`;
    ///   0 never switches (default: 40 with autoplay, otherwise 0)
    /// - late_temperature: Temperature after the switch (default: 0.25)
    #[new]
    #[pyo3(signature = (
        simulations_per_move = 800,
        temperature = 1.0,
        autoplay = false,
        output_path = None,
        num_threads = 1,
        batch_size = 64,
        num_sectors = DEFAULT_NUM_SECTORS,
        cpuct = 1.25,
        tablebase_path = None,
        seed = 42,
        max_game_plies = 512,
        log_probabilities = false,
        start_fen = None,
        temperature_threshold = None,
        late_temperature = SELF_PLAY_LATE_TEMPERATURE
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        simulations_per_move: u32,
        temperature: f32,
        autoplay: bool,
        output_path: Option<String>,
        num_threads: usize,
        batch_size: usize,
        num_sectors: usize,
        cpuct: f32,
        tablebase_path: Option<String>,
        seed: u64,
        max_game_plies: u32,
        log_probabilities: bool,
        start_fen: Option<String>,
        temperature_threshold: Option<u32>,
        late_temperature: f32,
    ) -> PyResult<Self> {
        let mut config = EngineConfig::default()
            .with_simulations(simulations_per_move)
            .with_temperature(temperature)
            .with_autoplay(autoplay)
            .with_temperature_schedule(temperature_threshold, late_temperature)
            .with_threads(num_threads)
            .with_batching(batch_size, num_sectors)
            .with_cpuct(cpuct)
            .with_seed(seed)
            .with_max_game_plies(max_game_plies);
        if log_probabilities {
            config = config.with_policy_format(PolicyFormat::LogProbabilities);
        }
        // An empty path disables recording, as does None.
        if let Some(path) = output_path.filter(|p| !p.is_empty()) {
            config = config.with_output_path(path);
        }
        if let Some(path) = tablebase_path.filter(|p| !p.is_empty()) {
            config = config.with_tablebase(path);
        }
        if let Some(fen) = start_fen {
            config = config.with_start_fen(fen);
        }

        Ok(Self {
            inner: Some(BatchEngine::new(config)?),
        })
    }

    /// Run one select step; returns `(sector, number_of_leaves)`.
    fn select(&mut self, py: Python<'_>) -> PyResult<(usize, usize)> {
        let engine = self.engine_mut()?;
        let batch = py.allow_threads(move || engine.select())?;
        Ok((batch.sector, batch.len))
    }

    /// Feed evaluator output for the oldest selected sector.
    ///
    /// Returns the sector that was updated.
    fn update(
        &mut self,
        py: Python<'_>,
        values: PyReadonlyArrayDyn<'_, f32>,
        policies: PyReadonlyArrayDyn<'_, f32>,
    ) -> PyResult<usize> {
        let values = values.as_slice()?;
        let policies = policies.as_slice()?;
        let engine = self.engine_mut()?;
        Ok(py.allow_threads(move || engine.update(values, policies))?)
    }

    /// Leaf boards of `sector`, shape `(n, 8, 8)`.
    fn boards<'py>(&self, py: Python<'py>, sector: usize) -> PyResult<Bound<'py, PyArray3<i32>>> {
        let (boards, _) = self.engine()?.eval_batch(sector)?;
        let n = boards.len() / BOARD_SIZE;
        Ok(PyArray1::from_vec_bound(py, boards).reshape([n, 8, 8])?)
    }

    /// Leaf metadata of `sector`, shape `(n, 5)`.
    fn metadata<'py>(&self, py: Python<'py>, sector: usize) -> PyResult<Bound<'py, PyArray2<i32>>> {
        let (_, metadata) = self.engine()?.eval_batch(sector)?;
        let n = metadata.len() / METADATA_SIZE;
        Ok(PyArray1::from_vec_bound(py, metadata).reshape([n, METADATA_SIZE])?)
    }

    /// Write `sector`'s leaves into caller-owned arrays; returns the count.
    fn write_inputs(
        &self,
        sector: usize,
        mut boards: PyReadwriteArrayDyn<'_, i32>,
        mut metadata: PyReadwriteArrayDyn<'_, i32>,
    ) -> PyResult<usize> {
        let boards = boards.as_slice_mut()?;
        let metadata = metadata.as_slice_mut()?;
        Ok(self.engine()?.write_inputs(sector, boards, metadata)?)
    }

    fn set_temperature(&mut self, temperature: f32) -> PyResult<()> {
        Ok(self.engine_mut()?.set_temperature(temperature)?)
    }

    #[pyo3(signature = (reset = false))]
    fn play_best_moves(&mut self, py: Python<'_>, reset: bool) -> PyResult<()> {
        let engine = self.engine_mut()?;
        Ok(py.allow_threads(move || engine.play_best_moves(reset))?)
    }

    fn current_sector(&self) -> PyResult<usize> {
        Ok(self.engine()?.current_sector())
    }

    fn all_games_over(&self) -> PyResult<bool> {
        Ok(self.engine()?.all_games_over())
    }

    fn all_moves_decided(&self) -> PyResult<bool> {
        Ok(self.engine()?.all_moves_decided())
    }

    fn proportion_of_games_over(&self) -> PyResult<f32> {
        Ok(self.engine()?.proportion_of_games_over())
    }

    /// Simulations each slot has completed towards its current move.
    fn sim_counts<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<u32>>> {
        let counts = self.engine()?.sim_counts();
        Ok(PyArray1::from_vec_bound(py, counts))
    }

    /// Write every slot's result into `out` (0 for unfinished games).
    fn results(&self, mut out: PyReadwriteArray1<'_, f32>) -> PyResult<()> {
        let out = out.as_slice_mut()?;
        Ok(self.engine()?.results(out)?)
    }

    /// Every slot's result; raises while games are in progress.
    fn final_results<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f32>>> {
        let results = self.engine()?.final_results()?;
        Ok(PyArray1::from_vec_bound(py, results))
    }

    /// Finished games since the last call, as
    /// `(slot, game_number, white_score, plies)` tuples.
    ///
    /// The engine keeps every finished game until it is drained; call this
    /// regularly during autoplay.
    fn drain_finished_games(&mut self) -> PyResult<Vec<(usize, u64, i32, usize)>> {
        Ok(self
            .engine_mut()?
            .drain_finished_games()
            .into_iter()
            .map(|g| (g.slot, g.game_number, g.result.white_score(), g.plies))
            .collect())
    }

    fn simulations_per_second(&self) -> PyResult<f64> {
        Ok(self.engine()?.stats().simulations_per_second())
    }

    /// Release the engine and its worker threads.
    fn close(&mut self) {
        self.inner = None;
    }

    fn __repr__(&self) -> String {
        match &self.inner {
            Some(engine) => {
                let config = engine.config();
                format!(
                    "BatchMCTS(slots={}, sectors={}, sims={}, autoplay={})",
                    config.total_slots(),
                    config.num_sectors,
                    config.simulations_per_move,
                    config.autoplay
                )
            }
            None => "BatchMCTS(closed)".to_string(),
        }
    }
}
