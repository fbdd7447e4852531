//! Network evaluation boundary and the self-play driving loop.
//!
//! The engine never calls a network itself. A [`BatchEvaluator`] turns one
//! sector's encoded leaves into values and policies; [`SelfPlayDriver`]
//! moves batches between the two, overlapping evaluation of one sector with
//! selection in the next when the engine has more than one sector.

use std::sync::mpsc;
use std::thread;

use tracing::{debug, info};

use crate::core::{BOARD_SIZE, METADATA_SIZE, POLICY_SIZE};
use crate::engine::{BatchEngine, FinishedGame, SelectedBatch};
use crate::error::{EngineError, EvaluatorError, Result};

/// Encoded leaves of one sector, ready for the network.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalBatch {
    pub sector: usize,

    /// Number of leaves.
    pub len: usize,

    /// `len * 64` board codes.
    pub boards: Vec<i32>,

    /// `len * 5` metadata entries.
    pub metadata: Vec<i32>,
}

impl EvalBatch {
    /// Copy the leaves of a freshly selected sector out of the engine.
    pub fn collect(engine: &BatchEngine, selected: SelectedBatch) -> Result<Self> {
        let (boards, metadata) = engine.eval_batch(selected.sector)?;
        debug_assert_eq!(boards.len(), selected.len * BOARD_SIZE);
        debug_assert_eq!(metadata.len(), selected.len * METADATA_SIZE);
        Ok(Self {
            sector: selected.sector,
            len: selected.len,
            boards,
            metadata,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Board codes of leaf `i`.
    pub fn board(&self, i: usize) -> &[i32] {
        &self.boards[i * BOARD_SIZE..(i + 1) * BOARD_SIZE]
    }

    /// Metadata of leaf `i`.
    pub fn metadata(&self, i: usize) -> &[i32] {
        &self.metadata[i * METADATA_SIZE..(i + 1) * METADATA_SIZE]
    }
}

/// Network output for one [`EvalBatch`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvalOutput {
    /// One value per leaf, for the side to move at the leaf.
    pub values: Vec<f32>,

    /// `POLICY_SIZE` entries per leaf.
    pub policies: Vec<f32>,
}

/// Something that evaluates batches of leaves, typically a neural network.
pub trait BatchEvaluator: Send {
    fn evaluate(&mut self, batch: &EvalBatch) -> std::result::Result<EvalOutput, EvaluatorError>;
}

/// Uniform policy and zero value for every leaf.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformEvaluator;

impl BatchEvaluator for UniformEvaluator {
    fn evaluate(&mut self, batch: &EvalBatch) -> std::result::Result<EvalOutput, EvaluatorError> {
        Ok(EvalOutput {
            values: vec![0.0; batch.len],
            policies: vec![1.0 / POLICY_SIZE as f32; batch.len * POLICY_SIZE],
        })
    }
}

impl<F> BatchEvaluator for F
where
    F: FnMut(&EvalBatch) -> std::result::Result<EvalOutput, EvaluatorError> + Send,
{
    fn evaluate(&mut self, batch: &EvalBatch) -> std::result::Result<EvalOutput, EvaluatorError> {
        self(batch)
    }
}

/// Runs select/evaluate/update rounds until a stop condition holds.
#[derive(Debug)]
pub struct SelfPlayDriver<E: BatchEvaluator> {
    evaluator: E,
    rounds: u64,
}

impl<E: BatchEvaluator> SelfPlayDriver<E> {
    pub fn new(evaluator: E) -> Self {
        Self {
            evaluator,
            rounds: 0,
        }
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn into_evaluator(self) -> E {
        self.evaluator
    }

    /// Select/update rounds completed so far.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Play until at least `games` games have finished (autoplay only).
    ///
    /// Returns the finished games drained from the engine.
    pub fn run(&mut self, engine: &mut BatchEngine, games: usize) -> Result<Vec<FinishedGame>> {
        if !engine.config().autoplay {
            return Err(EngineError::InvalidConfig(
                "run requires autoplay; use play_to_completion".to_string(),
            ));
        }
        self.drive(engine, |e| e.finished_games().len() >= games)?;
        let finished = engine.drain_finished_games();
        info!(games = finished.len(), rounds = self.rounds, "self-play run complete");
        Ok(finished)
    }

    /// Play every slot's single game to the end (autoplay off).
    ///
    /// Searches until every slot has decided its move, plays all moves, and
    /// repeats. Returns the final results.
    pub fn play_to_completion(&mut self, engine: &mut BatchEngine) -> Result<Vec<f32>> {
        if engine.config().autoplay {
            return Err(EngineError::InvalidConfig(
                "play_to_completion requires autoplay off; use run".to_string(),
            ));
        }
        while !engine.all_games_over() {
            self.drive(engine, BatchEngine::all_moves_decided)?;
            engine.play_best_moves(false)?;
            debug!(
                progress = engine.proportion_of_games_over(),
                "moves played"
            );
        }
        engine.final_results()
    }

    /// Run rounds until `done` holds, then drain every sector in flight.
    pub fn drive(
        &mut self,
        engine: &mut BatchEngine,
        done: impl FnMut(&BatchEngine) -> bool,
    ) -> Result<()> {
        if engine.config().num_sectors == 1 {
            self.drive_sequential(engine, done)
        } else {
            self.drive_pipelined(engine, done)
        }
    }

    fn drive_sequential(
        &mut self,
        engine: &mut BatchEngine,
        mut done: impl FnMut(&BatchEngine) -> bool,
    ) -> Result<()> {
        while !done(&*engine) {
            let selected = engine.select()?;
            let batch = EvalBatch::collect(engine, selected)?;
            let output = self.evaluator.evaluate(&batch)?;
            engine.update(&output.values, &output.policies)?;
            self.rounds += 1;
        }
        Ok(())
    }

    /// One sector is evaluated on a scoped thread while the engine selects
    /// the next one. Batches and outputs travel in FIFO order, matching the
    /// engine's oldest-first updates.
    fn drive_pipelined(
        &mut self,
        engine: &mut BatchEngine,
        mut done: impl FnMut(&BatchEngine) -> bool,
    ) -> Result<()> {
        let sectors = engine.config().num_sectors;
        let evaluator = &mut self.evaluator;
        let rounds = &mut self.rounds;

        thread::scope(|scope| -> Result<()> {
            let (batch_tx, batch_rx) = mpsc::channel::<EvalBatch>();
            let (output_tx, output_rx) = mpsc::channel();
            scope.spawn(move || {
                for batch in batch_rx {
                    if output_tx.send(evaluator.evaluate(&batch)).is_err() {
                        break;
                    }
                }
            });

            let send = |engine: &mut BatchEngine| -> Result<()> {
                let selected = engine.select()?;
                let batch = EvalBatch::collect(engine, selected)?;
                batch_tx
                    .send(batch)
                    .map_err(|_| EngineError::Evaluator(EvaluatorError::Disconnected))
            };

            let mut in_flight = 0;
            while in_flight < sectors && !done(&*engine) {
                send(&mut *engine)?;
                in_flight += 1;
            }
            while in_flight > 0 {
                let output: EvalOutput = output_rx
                    .recv()
                    .map_err(|_| EvaluatorError::Disconnected)??;
                engine.update(&output.values, &output.policies)?;
                in_flight -= 1;
                *rounds += 1;

                if !done(&*engine) {
                    send(&mut *engine)?;
                    in_flight += 1;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcts::EngineConfig;

    #[test]
    fn test_uniform_evaluator_shapes() {
        let batch = EvalBatch {
            sector: 0,
            len: 3,
            boards: vec![14; 3 * BOARD_SIZE],
            metadata: vec![0; 3 * METADATA_SIZE],
        };
        let output = UniformEvaluator.evaluate(&batch).unwrap();
        assert_eq!(output.values.len(), 3);
        assert_eq!(output.policies.len(), 3 * POLICY_SIZE);
        assert_eq!(batch.board(2).len(), BOARD_SIZE);
        assert_eq!(batch.metadata(1).len(), METADATA_SIZE);
    }

    #[test]
    fn test_closure_evaluator() {
        let mut calls = 0;
        let mut evaluator = |batch: &EvalBatch| {
            calls += 1;
            UniformEvaluator.evaluate(batch)
        };
        let batch = EvalBatch {
            sector: 0,
            len: 0,
            boards: Vec::new(),
            metadata: Vec::new(),
        };
        assert!(evaluator.evaluate(&batch).unwrap().values.is_empty());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_driver_rounds_sequential() {
        let config = EngineConfig::default()
            .with_simulations(3)
            .with_batching(2, 1);
        let mut engine = BatchEngine::new(config).unwrap();
        let mut driver = SelfPlayDriver::new(UniformEvaluator);

        driver.drive(&mut engine, BatchEngine::all_moves_decided).unwrap();
        assert_eq!(driver.rounds(), 3);
        assert!(engine.slots().all(|s| s.simulations() == 3));
    }

    #[test]
    fn test_driver_rejects_wrong_mode() {
        let config = EngineConfig::default().with_batching(1, 1);
        let mut engine = BatchEngine::new(config).unwrap();
        let mut driver = SelfPlayDriver::new(UniformEvaluator);
        assert!(matches!(
            driver.run(&mut engine, 1),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_evaluator_error_propagates() {
        let config = EngineConfig::default().with_batching(1, 2);
        let mut engine = BatchEngine::new(config).unwrap();
        let mut driver = SelfPlayDriver::new(
            |_: &EvalBatch| -> std::result::Result<EvalOutput, EvaluatorError> {
                Err(EvaluatorError::Failed("out of memory".to_string()))
            },
        );
        let err = driver
            .drive(&mut engine, BatchEngine::all_moves_decided)
            .unwrap_err();
        assert!(matches!(err, EngineError::Evaluator(EvaluatorError::Failed(_))));
    }
}
