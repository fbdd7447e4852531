//! A batch of game slots sharing one pending-evaluation buffer.

use rayon::prelude::*;
use rayon::ThreadPool;
use rustc_hash::FxHashMap;

use crate::core::{BOARD_SIZE, METADATA_SIZE, POLICY_SIZE};
use crate::error::{EngineError, Result, SearchError};
use crate::mcts::StepCounts;

use super::slot::{FinishedGame, GameSlot, PendingLeaf, SearchContext};

/// Whether a sector's batch is out for evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectorPhase {
    Idle,
    AwaitingUpdate,
}

/// What one sector operation produced.
#[derive(Debug, Default)]
pub struct SectorOutcome {
    pub counts: StepCounts,
    pub finished: Vec<FinishedGame>,
}

/// Fixed-size group of slots selected and updated together.
#[derive(Debug)]
pub struct Sector {
    index: usize,
    slots: Vec<GameSlot>,
    phase: SectorPhase,
    pending: Vec<PendingLeaf>,
}

impl Sector {
    /// Sector `index` holding `batch_size` new games; slot indices start at
    /// `index * batch_size`.
    pub fn new(index: usize, batch_size: usize, ctx: &SearchContext<'_>) -> Result<Self> {
        let first = index * batch_size;
        let slots = (first..first + batch_size)
            .map(|slot| GameSlot::new_game(slot, 0, ctx))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            index,
            slots,
            phase: SectorPhase::Idle,
            pending: Vec::with_capacity(batch_size),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn phase(&self) -> SectorPhase {
        self.phase
    }

    pub fn slots(&self) -> &[GameSlot] {
        &self.slots
    }

    /// Leaves from the last `select`, in slot order.
    pub fn pending(&self) -> &[PendingLeaf] {
        &self.pending
    }

    /// Run one select step on every slot in parallel.
    ///
    /// With autoplay, finished slots first start their next game. If any
    /// slot fails, every leaf selected in this step is cancelled and the
    /// sector stays idle.
    pub fn select(&mut self, pool: &ThreadPool, ctx: &SearchContext<'_>) -> Result<SectorOutcome> {
        if self.phase == SectorPhase::AwaitingUpdate {
            return Err(EngineError::SectorInFlight { sector: self.index });
        }

        if ctx.params.autoplay {
            for slot in self.slots.iter_mut().filter(|s| s.is_finished()) {
                slot.start_next_game(ctx)?;
            }
        }

        let results: Vec<std::result::Result<(Option<PendingLeaf>, StepCounts), SearchError>> =
            pool.install(|| {
                self.slots
                    .par_iter_mut()
                    .map(|slot| {
                        let mut counts = StepCounts::default();
                        slot.select(ctx, &mut counts).map(|leaf| (leaf, counts))
                    })
                    .collect()
            });

        let mut outcome = SectorOutcome::default();
        let mut failure = None;
        self.pending.clear();
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok((leaf, counts)) => {
                    outcome.counts += counts;
                    if let Some(mut leaf) = leaf {
                        leaf.slot = i;
                        self.pending.push(leaf);
                    }
                }
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = failure {
            self.abandon_pending();
            return Err(err.into());
        }

        self.collect_finished(&mut outcome);
        self.phase = SectorPhase::AwaitingUpdate;
        Ok(outcome)
    }

    /// Cancel every pending leaf and return the sector to idle.
    fn abandon_pending(&mut self) {
        for leaf in self.pending.drain(..) {
            self.slots[leaf.slot].cancel_evaluation();
        }
        self.phase = SectorPhase::Idle;
    }

    /// Override the sampling temperature of every game in the sector.
    pub fn set_temperature(&mut self, temperature: f32) {
        for slot in &mut self.slots {
            slot.set_temperature(temperature);
        }
    }

    /// Apply one value and one policy per pending leaf, in pending order.
    ///
    /// Shapes are checked before anything is touched.
    pub fn update(
        &mut self,
        values: &[f32],
        policies: &[f32],
        pool: &ThreadPool,
        ctx: &SearchContext<'_>,
    ) -> Result<SectorOutcome> {
        if self.phase != SectorPhase::AwaitingUpdate {
            return Err(EngineError::NoPendingBatch);
        }
        let n = self.pending.len();
        check_len("values", n, values.len())?;
        check_len("policies", n * POLICY_SIZE, policies.len())?;

        let entries: FxHashMap<usize, usize> = self
            .pending
            .iter()
            .enumerate()
            .map(|(entry, leaf)| (leaf.slot, entry))
            .collect();

        let results: Vec<std::result::Result<StepCounts, SearchError>> = pool.install(|| {
            self.slots
                .par_iter_mut()
                .enumerate()
                .filter_map(|(i, slot)| entries.get(&i).map(|&entry| (slot, entry)))
                .map(|(slot, entry)| {
                    let mut counts = StepCounts::default();
                    let policy = &policies[entry * POLICY_SIZE..(entry + 1) * POLICY_SIZE];
                    slot.apply_evaluation(values[entry], policy, ctx, &mut counts)
                        .map(|()| counts)
                })
                .collect()
        });

        let mut outcome = SectorOutcome::default();
        for result in results {
            outcome.counts += result?;
        }

        self.pending.clear();
        self.phase = SectorPhase::Idle;
        self.collect_finished(&mut outcome);
        Ok(outcome)
    }

    /// Play the current move of every unfinished slot.
    pub fn play_best_moves(
        &mut self,
        reset: bool,
        pool: &ThreadPool,
        ctx: &SearchContext<'_>,
    ) -> Result<SectorOutcome> {
        let results: Vec<std::result::Result<StepCounts, SearchError>> = pool.install(|| {
            self.slots
                .par_iter_mut()
                .filter(|slot| !slot.is_finished())
                .map(|slot| {
                    let mut counts = StepCounts::default();
                    slot.play_move(ctx, reset, &mut counts).map(|()| counts)
                })
                .collect()
        });

        let mut outcome = SectorOutcome::default();
        for result in results {
            outcome.counts += result?;
        }
        self.collect_finished(&mut outcome);
        Ok(outcome)
    }

    /// Copy the pending leaves' encodings into flat caller buffers.
    ///
    /// Returns the number of leaves written. Buffers may be longer than
    /// needed; the tail is left untouched.
    pub fn write_inputs(&self, boards: &mut [i32], metadata: &mut [i32]) -> Result<usize> {
        let n = self.pending.len();
        check_min_len("boards", n * BOARD_SIZE, boards.len())?;
        check_min_len("metadata", n * METADATA_SIZE, metadata.len())?;

        for (leaf, (board, meta)) in self.pending.iter().zip(
            boards
                .chunks_exact_mut(BOARD_SIZE)
                .zip(metadata.chunks_exact_mut(METADATA_SIZE)),
        ) {
            board.copy_from_slice(&leaf.board);
            meta.copy_from_slice(&leaf.metadata);
        }
        Ok(n)
    }

    fn collect_finished(&mut self, outcome: &mut SectorOutcome) {
        outcome
            .finished
            .extend(self.slots.iter_mut().filter_map(GameSlot::take_finished));
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(EngineError::ShapeMismatch {
            what,
            expected,
            actual,
        })
    }
}

fn check_min_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if actual >= expected {
        Ok(())
    } else {
        Err(EngineError::ShapeMismatch {
            what,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Position;
    use crate::mcts::{EngineConfig, SearchParams};
    use crate::engine::SlotStatus;
    use crate::tablebase::NullOracle;
    use rayon::ThreadPoolBuilder;

    fn pool() -> ThreadPool {
        ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn params(sims: u32) -> SearchParams {
        EngineConfig::default().with_simulations(sims).search_params()
    }

    #[test]
    fn test_select_fills_pending() {
        let params = params(4);
        let start = Position::new();
        let ctx = SearchContext {
            params: &params,
            oracle: &NullOracle,
            start: &start,
            output_path: None,
            run: 0,
        };
        let pool = pool();
        let mut sector = Sector::new(1, 3, &ctx).unwrap();
        assert_eq!(sector.slots()[0].index(), 3);

        let outcome = sector.select(&pool, &ctx).unwrap();
        assert_eq!(outcome.counts.leaves_evaluated, 3);
        assert_eq!(sector.pending().len(), 3);
        assert_eq!(sector.phase(), SectorPhase::AwaitingUpdate);
        let slots: Vec<usize> = sector.pending().iter().map(|l| l.slot).collect();
        assert_eq!(slots, vec![0, 1, 2]);

        assert!(matches!(
            sector.select(&pool, &ctx),
            Err(EngineError::SectorInFlight { sector: 1 })
        ));
    }

    #[test]
    fn test_update_checks_shapes_first() {
        let params = params(4);
        let start = Position::new();
        let ctx = SearchContext {
            params: &params,
            oracle: &NullOracle,
            start: &start,
            output_path: None,
            run: 0,
        };
        let pool = pool();
        let mut sector = Sector::new(0, 2, &ctx).unwrap();

        assert!(matches!(
            sector.update(&[], &[], &pool, &ctx),
            Err(EngineError::NoPendingBatch)
        ));

        sector.select(&pool, &ctx).unwrap();
        let err = sector.update(&[0.0], &[], &pool, &ctx).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ShapeMismatch { what: "values", expected: 2, actual: 1 }
        ));
        let err = sector.update(&[0.0; 2], &[0.0; 10], &pool, &ctx).unwrap_err();
        assert!(matches!(err, EngineError::ShapeMismatch { what: "policies", .. }));

        // Still in flight and untouched.
        assert_eq!(sector.phase(), SectorPhase::AwaitingUpdate);
        assert!(sector.slots().iter().all(|s| s.simulations() == 0));

        let policies = vec![1.0; 2 * POLICY_SIZE];
        sector.update(&[0.0; 2], &policies, &pool, &ctx).unwrap();
        assert_eq!(sector.phase(), SectorPhase::Idle);
        assert!(sector.slots().iter().all(|s| s.simulations() == 1));
        assert!(sector.pending().is_empty());
    }

    #[test]
    fn test_write_inputs() {
        let params = params(4);
        let start = Position::new();
        let ctx = SearchContext {
            params: &params,
            oracle: &NullOracle,
            start: &start,
            output_path: None,
            run: 0,
        };
        let pool = pool();
        let mut sector = Sector::new(0, 2, &ctx).unwrap();
        sector.select(&pool, &ctx).unwrap();

        let mut boards = vec![-1; 3 * BOARD_SIZE];
        let mut metadata = vec![-1; 3 * METADATA_SIZE];
        assert_eq!(sector.write_inputs(&mut boards, &mut metadata).unwrap(), 2);
        assert_eq!(&boards[..BOARD_SIZE], &sector.pending()[0].board[..]);
        assert!(boards[2 * BOARD_SIZE..].iter().all(|&b| b == -1));

        let mut short = vec![0; BOARD_SIZE];
        assert!(matches!(
            sector.write_inputs(&mut short, &mut metadata),
            Err(EngineError::ShapeMismatch { what: "boards", .. })
        ));
    }

    #[test]
    fn test_play_best_moves_skips_nothing_unfinished() {
        let params = params(100);
        let start = Position::new();
        let ctx = SearchContext {
            params: &params,
            oracle: &NullOracle,
            start: &start,
            output_path: None,
            run: 0,
        };
        let pool = pool();
        let mut sector = Sector::new(0, 2, &ctx).unwrap();
        sector.select(&pool, &ctx).unwrap();
        let policies = vec![1.0; 2 * POLICY_SIZE];
        sector.update(&[0.0; 2], &policies, &pool, &ctx).unwrap();

        let outcome = sector.play_best_moves(false, &pool, &ctx).unwrap();
        assert_eq!(outcome.counts.moves_played, 2);
        assert!(sector.slots().iter().all(|s| s.history().len() == 1));
    }

    #[test]
    fn test_abandoned_select_leaves_sector_idle() {
        let params = params(4);
        let start = Position::new();
        let ctx = SearchContext {
            params: &params,
            oracle: &NullOracle,
            start: &start,
            output_path: None,
            run: 0,
        };
        let pool = pool();
        let mut sector = Sector::new(0, 3, &ctx).unwrap();
        sector.select(&pool, &ctx).unwrap();
        assert!(sector
            .slots()
            .iter()
            .all(|s| s.status() == SlotStatus::AwaitingEvaluation));

        sector.abandon_pending();
        assert_eq!(sector.phase(), SectorPhase::Idle);
        assert!(sector.pending().is_empty());
        for slot in sector.slots() {
            assert_eq!(slot.status(), SlotStatus::Searching);
            assert_eq!(slot.tree().total_virtual_loss(), 0);
            assert_eq!(slot.simulations(), 0);
        }
        assert!(matches!(
            sector.update(&[], &[], &pool, &ctx),
            Err(EngineError::NoPendingBatch)
        ));

        // The next round runs normally.
        sector.select(&pool, &ctx).unwrap();
        assert_eq!(sector.pending().len(), 3);
    }

    #[test]
    fn test_set_temperature_reaches_every_slot() {
        let params = params(4);
        let start = Position::new();
        let ctx = SearchContext {
            params: &params,
            oracle: &NullOracle,
            start: &start,
            output_path: None,
            run: 0,
        };
        let mut sector = Sector::new(0, 2, &ctx).unwrap();
        sector.set_temperature(0.1);
        assert!(sector.slots().iter().all(|s| s.temperature() == 0.1));
    }
}
