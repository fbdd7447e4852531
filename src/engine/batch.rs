//! The batched multi-sector engine.
//!
//! Sectors are selected round-robin and updated oldest-first, so with two or
//! more sectors the caller can evaluate one sector's batch while the next
//! sector is being selected.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::core::{Position, BOARD_SIZE, METADATA_SIZE};
use crate::error::{EngineError, Result};
use crate::mcts::{EngineConfig, SearchParams, SearchStats};
use crate::tablebase::{open_oracle, TablebaseOracle};
use crate::training::new_run_id;

use super::sector::{Sector, SectorOutcome, SectorPhase};
use super::slot::{FinishedGame, GameSlot, PendingLeaf, SearchContext, SlotStatus};

/// The sector a `select()` filled, and how many leaves it holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectedBatch {
    pub sector: usize,
    pub len: usize,
}

/// Many concurrent self-play games searched in evaluator-sized batches.
///
/// Protocol: `select()` fills the sector at the cursor and advances it;
/// `update(values, policies)` consumes the oldest selected sector. Each value
/// and each `POLICY_SIZE` chunk of policies belongs to the pending leaf at the
/// same position.
///
/// Every completed game is kept until [`drain_finished_games`] takes it.
/// Long autoplay runs must drain regularly or the list grows without bound.
///
/// [`drain_finished_games`]: BatchEngine::drain_finished_games
pub struct BatchEngine {
    config: EngineConfig,
    params: SearchParams,
    start: Position,
    sectors: Vec<Sector>,
    cursor: usize,
    in_flight: VecDeque<usize>,
    pool: ThreadPool,
    oracle: Arc<dyn TablebaseOracle>,
    stats: SearchStats,
    finished: Vec<FinishedGame>,
    run: u64,
}

impl BatchEngine {
    /// Build an engine, loading tablebases from `config.tablebase_path`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let oracle = open_oracle(config.tablebase_path.as_deref());
        Self::with_oracle(config, oracle)
    }

    /// Build an engine around an existing oracle.
    pub fn with_oracle(config: EngineConfig, oracle: Arc<dyn TablebaseOracle>) -> Result<Self> {
        config.validate()?;
        let start = match config.start_fen.as_deref() {
            Some(fen) => Position::from_fen(fen)
                .map_err(|e| EngineError::InvalidConfig(format!("start_fen: {e}")))?,
            None => Position::new(),
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|i| format!("mcts-worker-{i}"))
            .build()?;
        let params = config.search_params();
        let run = new_run_id();

        let ctx = SearchContext {
            params: &params,
            oracle: oracle.as_ref(),
            start: &start,
            output_path: config.output_path.as_deref(),
            run,
        };
        let sectors = (0..config.num_sectors)
            .map(|i| Sector::new(i, config.batch_size, &ctx))
            .collect::<Result<Vec<_>>>()?;

        info!(
            slots = config.total_slots(),
            sectors = config.num_sectors,
            threads = config.num_threads,
            simulations = config.simulations_per_move,
            tablebase_pieces = oracle.max_pieces(),
            run,
            "batch engine ready"
        );

        Ok(Self {
            config,
            params,
            start,
            sectors,
            cursor: 0,
            in_flight: VecDeque::new(),
            pool,
            oracle,
            stats: SearchStats::default(),
            finished: Vec::new(),
            run,
        })
    }

    fn split(&mut self) -> (SearchContext<'_>, &mut [Sector], &ThreadPool) {
        (
            SearchContext {
                params: &self.params,
                oracle: self.oracle.as_ref(),
                start: &self.start,
                output_path: self.config.output_path.as_deref(),
                run: self.run,
            },
            &mut self.sectors,
            &self.pool,
        )
    }

    fn absorb(&mut self, outcome: SectorOutcome) {
        self.stats += outcome.counts;
        self.finished.extend(outcome.finished);
    }

    // -------------------------------------------------------------------------
    // Select / update
    // -------------------------------------------------------------------------

    /// Run one select step on the sector at the cursor.
    pub fn select(&mut self) -> Result<SelectedBatch> {
        let started = Instant::now();
        let index = self.cursor;
        let (ctx, sectors, pool) = self.split();
        let outcome = sectors[index].select(pool, &ctx)?;
        let len = sectors[index].pending().len();

        self.cursor = (index + 1) % self.sectors.len();
        self.in_flight.push_back(index);
        debug!(
            sector = index,
            pending = len,
            short_circuits = outcome.counts.short_circuits,
            "select"
        );
        self.absorb(outcome);
        self.stats.selects += 1;
        self.stats.select_time_us += started.elapsed().as_micros() as u64;

        Ok(SelectedBatch { sector: index, len })
    }

    /// Feed evaluator output for the oldest selected sector.
    ///
    /// `values` holds one entry per pending leaf, `policies` one
    /// `POLICY_SIZE` block per pending leaf.
    pub fn update(&mut self, values: &[f32], policies: &[f32]) -> Result<usize> {
        let started = Instant::now();
        let Some(&index) = self.in_flight.front() else {
            return Err(EngineError::NoPendingBatch);
        };
        let (ctx, sectors, pool) = self.split();
        let outcome = sectors[index].update(values, policies, pool, &ctx)?;
        self.in_flight.pop_front();

        debug!(
            sector = index,
            values = values.len(),
            moves = outcome.counts.moves_played,
            "update"
        );
        self.absorb(outcome);
        self.stats.updates += 1;
        self.stats.update_time_us += started.elapsed().as_micros() as u64;
        Ok(index)
    }

    /// Pending leaves of `sector` from its last select.
    pub fn pending(&self, sector: usize) -> &[PendingLeaf] {
        self.sectors.get(sector).map(Sector::pending).unwrap_or_default()
    }

    /// Copy `sector`'s pending leaves into flat buffers; returns the count.
    pub fn write_inputs(&self, sector: usize, boards: &mut [i32], metadata: &mut [i32]) -> Result<usize> {
        self.sector(sector)?.write_inputs(boards, metadata)
    }

    /// `sector`'s pending leaves as owned flat buffers.
    pub fn eval_batch(&self, sector: usize) -> Result<(Vec<i32>, Vec<i32>)> {
        let len = self.sector(sector)?.pending().len();
        let mut boards = vec![0; len * BOARD_SIZE];
        let mut metadata = vec![0; len * METADATA_SIZE];
        self.write_inputs(sector, &mut boards, &mut metadata)?;
        Ok((boards, metadata))
    }

    fn sector(&self, sector: usize) -> Result<&Sector> {
        self.sectors
            .get(sector)
            .ok_or(EngineError::UnknownSector(sector))
    }

    // -------------------------------------------------------------------------
    // Controls
    // -------------------------------------------------------------------------

    /// Sector the next `select()` addresses.
    pub fn current_sector(&self) -> usize {
        self.cursor
    }

    /// Sectors selected and not yet updated, oldest first.
    pub fn sectors_in_flight(&self) -> impl Iterator<Item = usize> + '_ {
        self.in_flight.iter().copied()
    }

    /// Change the sampling temperature for moves played from now on.
    ///
    /// Games in progress use it for the rest of the game unless they have
    /// yet to reach the ply where the schedule switches to
    /// `late_temperature`. New games start with it.
    pub fn set_temperature(&mut self, temperature: f32) -> Result<()> {
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(EngineError::InvalidTemperature(temperature));
        }
        self.config.temperature = temperature;
        self.params.temperature = temperature;
        for sector in &mut self.sectors {
            sector.set_temperature(temperature);
        }
        Ok(())
    }

    /// Play the current move in every unfinished slot, whatever its
    /// simulation count.
    ///
    /// With `reset` the statistics carried over to the new roots are
    /// dropped. No sector may be awaiting its update.
    pub fn play_best_moves(&mut self, reset: bool) -> Result<()> {
        if !self.in_flight.is_empty() {
            return Err(EngineError::BatchInFlight);
        }
        let (ctx, sectors, pool) = self.split();
        let mut total = SectorOutcome::default();
        for sector in sectors.iter_mut() {
            debug_assert_eq!(sector.phase(), SectorPhase::Idle);
            let outcome = sector.play_best_moves(reset, pool, &ctx)?;
            total.counts += outcome.counts;
            total.finished.extend(outcome.finished);
        }
        debug!(moves = total.counts.moves_played, reset, "played best moves");
        self.absorb(total);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Total game slots.
    pub fn total_slots(&self) -> usize {
        self.config.total_slots()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Slot by engine-wide index.
    pub fn slot(&self, index: usize) -> Option<&GameSlot> {
        let batch = self.config.batch_size;
        self.sectors.get(index / batch)?.slots().get(index % batch)
    }

    /// Every slot, in engine-wide order.
    pub fn slots(&self) -> impl Iterator<Item = &GameSlot> + '_ {
        self.sectors.iter().flat_map(|s| s.slots())
    }

    /// Simulations each slot has completed towards its current move.
    pub fn sim_counts(&self) -> Vec<u32> {
        self.slots().map(GameSlot::simulations).collect()
    }

    /// Id stamped into this engine's log file names.
    pub fn run_id(&self) -> u64 {
        self.run
    }

    fn finished_count(&self) -> usize {
        self.slots().filter(|s| s.is_finished()).count()
    }

    /// Whether every slot's game is over.
    pub fn all_games_over(&self) -> bool {
        self.slots().all(GameSlot::is_finished)
    }

    /// Fraction of slots whose game is over.
    pub fn proportion_of_games_over(&self) -> f32 {
        self.finished_count() as f32 / self.total_slots() as f32
    }

    /// Whether every unfinished slot has reached its simulation budget.
    pub fn all_moves_decided(&self) -> bool {
        self.slots()
            .all(|s| matches!(s.status(), SlotStatus::MoveDecided | SlotStatus::Finished))
    }

    /// Write each slot's result for the side that moved first (+1, 0, -1)
    /// into `out`; unfinished slots write 0.
    pub fn results(&self, out: &mut [f32]) -> Result<()> {
        let total = self.total_slots();
        if out.len() != total {
            return Err(EngineError::ShapeMismatch {
                what: "results",
                expected: total,
                actual: out.len(),
            });
        }
        for (dst, slot) in out.iter_mut().zip(self.slots()) {
            *dst = slot.result_value();
        }
        Ok(())
    }

    /// Every slot's result, once all games are over.
    pub fn final_results(&self) -> Result<Vec<f32>> {
        let finished = self.finished_count();
        let total = self.total_slots();
        if finished < total {
            return Err(EngineError::GamesInProgress {
                in_progress: total - finished,
                total,
            });
        }
        Ok(self.slots().map(GameSlot::result_value).collect())
    }

    /// Games finished since the last drain, in completion order.
    pub fn finished_games(&self) -> &[FinishedGame] {
        &self.finished
    }

    /// Take the finished games collected so far, releasing their memory.
    pub fn drain_finished_games(&mut self) -> Vec<FinishedGame> {
        std::mem::take(&mut self.finished)
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }
}

impl std::fmt::Debug for BatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEngine")
            .field("slots", &self.total_slots())
            .field("sectors", &self.sectors.len())
            .field("cursor", &self.cursor)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::POLICY_SIZE;

    fn engine(batch: usize, sectors: usize) -> BatchEngine {
        let config = EngineConfig::default()
            .with_simulations(8)
            .with_batching(batch, sectors)
            .with_threads(2);
        BatchEngine::new(config).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig::default().with_batching(0, 1);
        assert!(matches!(
            BatchEngine::new(config),
            Err(EngineError::InvalidConfig(_))
        ));

        let config = EngineConfig::default().with_start_fen("not a fen");
        assert!(matches!(
            BatchEngine::new(config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_round_robin_cursor() {
        let mut engine = engine(2, 3);
        assert_eq!(engine.current_sector(), 0);
        assert_eq!(engine.select().unwrap().sector, 0);
        assert_eq!(engine.select().unwrap().sector, 1);
        assert_eq!(engine.current_sector(), 2);
        assert_eq!(engine.sectors_in_flight().collect::<Vec<_>>(), vec![0, 1]);

        let policies = vec![1.0; 2 * POLICY_SIZE];
        assert_eq!(engine.update(&[0.0; 2], &policies).unwrap(), 0);
        assert_eq!(engine.update(&[0.0; 2], &policies).unwrap(), 1);
        assert!(matches!(
            engine.update(&[0.0; 2], &policies),
            Err(EngineError::NoPendingBatch)
        ));
    }

    #[test]
    fn test_set_temperature() {
        let mut engine = engine(1, 1);
        engine.set_temperature(0.5).unwrap();
        assert_eq!(engine.config().temperature, 0.5);
        assert!(engine.slots().all(|s| s.temperature() == 0.5));
        assert!(matches!(
            engine.set_temperature(-1.0),
            Err(EngineError::InvalidTemperature(_))
        ));
        assert!(engine.set_temperature(f32::NAN).is_err());
    }

    #[test]
    fn test_slot_lookup() {
        let engine = engine(3, 2);
        assert_eq!(engine.total_slots(), 6);
        assert_eq!(engine.slot(4).unwrap().index(), 4);
        assert!(engine.slot(6).is_none());
        assert_eq!(engine.slots().count(), 6);
    }

    #[test]
    fn test_results_shape() {
        let engine = engine(2, 1);
        let mut out = vec![9.0; 2];
        engine.results(&mut out).unwrap();
        assert_eq!(out, vec![0.0, 0.0]);

        let mut wrong = vec![0.0; 3];
        assert!(matches!(
            engine.results(&mut wrong),
            Err(EngineError::ShapeMismatch { what: "results", .. })
        ));
        assert!(matches!(
            engine.final_results(),
            Err(EngineError::GamesInProgress { in_progress: 2, total: 2 })
        ));
        assert_eq!(engine.proportion_of_games_over(), 0.0);
        assert!(!engine.all_games_over());
    }

    #[test]
    fn test_sim_counts_per_slot() {
        let mut engine = engine(2, 2);
        assert_eq!(engine.sim_counts(), vec![0; 4]);

        engine.select().unwrap();
        let policies = vec![1.0; 2 * POLICY_SIZE];
        engine.update(&[0.0; 2], &policies).unwrap();
        assert_eq!(engine.sim_counts(), vec![1, 1, 0, 0]);

        engine.select().unwrap();
        engine.update(&[0.0; 2], &policies).unwrap();
        engine.select().unwrap();
        engine.update(&[0.0; 2], &policies).unwrap();
        assert_eq!(engine.sim_counts(), vec![2, 2, 1, 1]);
        let expected: Vec<u32> = engine.slots().map(|s| s.simulations()).collect();
        assert_eq!(engine.sim_counts(), expected);
    }
}
