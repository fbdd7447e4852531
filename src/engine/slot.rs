//! One self-play game and its search tree.

use std::path::{Path, PathBuf};

use shakmaty::{Color, Move};
use tracing::{debug, info, trace, warn};

use crate::core::{
    encode_board, encode_metadata, GameResult, GameRng, Position, Termination, BOARD_SIZE,
    METADATA_SIZE,
};
use crate::error::SearchError;
use crate::mcts::{
    backpropagate, expand, game_over, revert_virtual_loss, sample_edge, select_leaf,
    visit_distribution, LeafSelection, MCTSTree, PendingEval, PolicyFormat, Puct, SearchParams,
    StepCounts,
};
use crate::tablebase::TablebaseOracle;
use crate::training::{GameLogWriter, MoveRecord};

/// Read-only state shared by every slot task of one engine call.
#[derive(Clone, Copy)]
pub struct SearchContext<'a> {
    pub params: &'a SearchParams,
    pub oracle: &'a dyn TablebaseOracle,

    /// Position every new game starts from.
    pub start: &'a Position,

    /// Base path for game logs.
    pub output_path: Option<&'a Path>,

    /// Run id stamped into log file names.
    pub run: u64,
}

/// Where a slot is in its select/update cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    /// Ready for the next select-leaf.
    Searching,
    /// A leaf is out for network evaluation.
    AwaitingEvaluation,
    /// Simulation budget reached; waiting for its move to be played.
    MoveDecided,
    /// Game over.
    Finished,
}

/// A leaf handed to the evaluator, encoded for the network.
#[derive(Clone, Debug)]
pub struct PendingLeaf {
    /// Slot index within its sector.
    pub slot: usize,
    pub board: [i32; BOARD_SIZE],
    pub metadata: [i32; METADATA_SIZE],
}

/// A completed game.
#[derive(Clone, Debug, PartialEq)]
pub struct FinishedGame {
    /// Engine-wide slot index.
    pub slot: usize,
    /// Games completed in this slot before this one.
    pub game_number: u64,
    pub result: GameResult,
    pub termination: Termination,
    /// Plies played.
    pub plies: usize,
    /// Result for the side that moved first: +1, 0 or -1.
    pub value: f32,
    /// Log file holding the game, if it was recorded.
    pub log: Option<PathBuf>,
}

/// One game in progress (or finished) and the tree searching it.
#[derive(Debug)]
pub struct GameSlot {
    index: usize,
    game_number: u64,
    first_mover: Color,
    position: Position,
    tree: MCTSTree,
    history: Vec<Move>,
    status: SlotStatus,
    outcome: Option<(Termination, GameResult)>,
    simulations: u32,
    temperature: f32,
    rng: GameRng,
    in_flight: Option<PendingEval>,
    log: Option<GameLogWriter>,
    log_path: Option<PathBuf>,
    unreported: Option<FinishedGame>,
}

impl GameSlot {
    /// Start game `game_number` in slot `index`.
    pub fn new_game(
        index: usize,
        game_number: u64,
        ctx: &SearchContext<'_>,
    ) -> Result<Self, SearchError> {
        let position = ctx.start.clone();
        let log = ctx
            .output_path
            .map(|base| GameLogWriter::create(base, index, ctx.run, game_number));
        let mut slot = Self {
            index,
            game_number,
            first_mover: position.turn(),
            position,
            tree: MCTSTree::new(),
            history: Vec::new(),
            status: SlotStatus::Searching,
            outcome: None,
            simulations: 0,
            temperature: ctx.params.temperature,
            rng: GameRng::for_game(ctx.params.seed, index, game_number),
            in_flight: None,
            log_path: log
                .as_ref()
                .filter(|w| w.is_active())
                .map(|w| w.path().to_path_buf()),
            log,
            unreported: None,
        };

        let mut counts = StepCounts::default();
        match game_over(&slot.position, ctx.params, ctx.oracle) {
            Some((termination, result)) => slot.finish(termination, result, &mut counts),
            None => slot.bootstrap_root(ctx.params.policy_format)?,
        }
        Ok(slot)
    }

    /// Replace this slot's game with the next one.
    pub fn start_next_game(&mut self, ctx: &SearchContext<'_>) -> Result<(), SearchError> {
        *self = Self::new_game(self.index, self.game_number + 1, ctx)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Engine-wide slot index.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn game_number(&self) -> u64 {
        self.game_number
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn tree(&self) -> &MCTSTree {
        &self.tree
    }

    /// Moves played so far in this game.
    pub fn history(&self) -> &[Move] {
        &self.history
    }

    pub fn status(&self) -> SlotStatus {
        self.status
    }

    /// Simulations completed towards the current move.
    pub fn simulations(&self) -> u32 {
        self.simulations
    }

    /// Temperature the next move is sampled with, before the ply schedule
    /// is applied.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Override the sampling temperature for the rest of this game.
    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = temperature;
    }

    /// File this game is recorded to.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.status == SlotStatus::Finished
    }

    pub fn result(&self) -> Option<GameResult> {
        self.outcome.map(|(_, result)| result)
    }

    pub fn termination(&self) -> Option<Termination> {
        self.outcome.map(|(termination, _)| termination)
    }

    /// Result for the side that moved first (0 while in progress).
    pub fn result_value(&self) -> f32 {
        self.result().map_or(0.0, |r| r.value_for(self.first_mover))
    }

    /// The finished game, once, right after it ends.
    pub fn take_finished(&mut self) -> Option<FinishedGame> {
        self.unreported.take()
    }

    // -------------------------------------------------------------------------
    // Search cycle
    // -------------------------------------------------------------------------

    /// Run simulations until one needs the network.
    ///
    /// Terminal and tablebase leaves are backed up on the spot and count as
    /// completed simulations; the loop stops at a network leaf, at the
    /// simulation budget (autoplay off) or at the end of the game.
    pub fn select(
        &mut self,
        ctx: &SearchContext<'_>,
        counts: &mut StepCounts,
    ) -> Result<Option<PendingLeaf>, SearchError> {
        while self.status == SlotStatus::Searching {
            match select_leaf(&mut self.tree, &self.position, &Puct, ctx.params, ctx.oracle) {
                LeafSelection::Pending(eval) => {
                    let mut leaf = PendingLeaf {
                        slot: 0,
                        board: [0; BOARD_SIZE],
                        metadata: [0; METADATA_SIZE],
                    };
                    encode_board(&eval.position, &mut leaf.board);
                    encode_metadata(&eval.position, &mut leaf.metadata);
                    trace!(slot = self.index, depth = eval.path.len(), "leaf awaiting evaluation");

                    self.in_flight = Some(eval);
                    self.status = SlotStatus::AwaitingEvaluation;
                    counts.leaves_evaluated += 1;
                    return Ok(Some(leaf));
                }
                LeafSelection::Resolved { termination, .. } => {
                    counts.short_circuits += 1;
                    if termination == Termination::Tablebase {
                        counts.tablebase_hits += 1;
                    }
                    self.complete_simulation(ctx, counts)?;
                }
            }
        }
        Ok(None)
    }

    /// Drop the in-flight leaf without backing anything up.
    ///
    /// Its virtual loss is removed and the slot is ready to select again.
    pub fn cancel_evaluation(&mut self) {
        if let Some(eval) = self.in_flight.take() {
            revert_virtual_loss(&mut self.tree, &eval.path);
            self.status = SlotStatus::Searching;
        }
    }

    /// Consume the network's answer for the in-flight leaf.
    ///
    /// Non-finite values are treated as 0.
    pub fn apply_evaluation(
        &mut self,
        value: f32,
        policy: &[f32],
        ctx: &SearchContext<'_>,
        counts: &mut StepCounts,
    ) -> Result<(), SearchError> {
        let Some(eval) = self.in_flight.take() else {
            return Ok(());
        };

        let value = if value.is_finite() {
            value.clamp(-1.0, 1.0)
        } else {
            warn!(slot = self.index, value, "non-finite evaluator value, using 0");
            0.0
        };

        let expansion = expand(
            &mut self.tree,
            eval.leaf,
            &eval.position,
            Some(policy),
            value,
            ctx.params.policy_format,
        )?;
        if expansion.uniform_fallback {
            counts.policy_fallbacks += 1;
        }
        backpropagate(&mut self.tree, &eval.path, value);

        self.status = SlotStatus::Searching;
        self.complete_simulation(ctx, counts)
    }

    fn complete_simulation(
        &mut self,
        ctx: &SearchContext<'_>,
        counts: &mut StepCounts,
    ) -> Result<(), SearchError> {
        self.simulations += 1;
        if self.simulations < ctx.params.simulations_per_move {
            return Ok(());
        }
        self.status = SlotStatus::MoveDecided;
        if ctx.params.autoplay {
            self.play_move(ctx, false, counts)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Moves
    // -------------------------------------------------------------------------

    /// Pick a move from the root visit counts, play it and re-root.
    ///
    /// With `reset` the statistics carried into the new root's subtree are
    /// dropped. Does nothing for a finished game.
    pub fn play_move(
        &mut self,
        ctx: &SearchContext<'_>,
        reset: bool,
        counts: &mut StepCounts,
    ) -> Result<(), SearchError> {
        if self.is_finished() {
            return Ok(());
        }
        debug_assert!(self.in_flight.is_none(), "move played with a leaf in flight");

        let ply = self.history.len() as u32 + 1;
        if let Some(late) = ctx.params.temperature_switch(ply) {
            debug!(slot = self.index, ply, temperature = late, "temperature switch");
            self.temperature = late;
        }
        let Some(choice) = sample_edge(self.tree.root_node(), self.temperature, &mut self.rng)
        else {
            let (termination, result) = game_over(&self.position, ctx.params, ctx.oracle)
                .unwrap_or((Termination::Stalemate, GameResult::Draw));
            self.finish(termination, result, counts);
            return Ok(());
        };

        if self.log.is_some() {
            let record = self.move_record(choice);
            if let Some(log) = self.log.as_mut() {
                log.record_move(record);
            }
        }

        let mv = self.tree.root_node().edges[choice].mv.clone();
        self.tree.reroot(choice)?;
        if reset {
            self.tree.reset_statistics();
        }
        self.position = self.position.play(&mv);
        self.history.push(mv);
        self.simulations = 0;
        counts.moves_played += 1;

        match game_over(&self.position, ctx.params, ctx.oracle) {
            Some((termination, result)) => self.finish(termination, result, counts),
            None => {
                self.bootstrap_root(ctx.params.policy_format)?;
                self.status = SlotStatus::Searching;
            }
        }
        Ok(())
    }

    /// Expand a fresh root with uniform priors so the first select already
    /// descends one ply.
    fn bootstrap_root(&mut self, format: PolicyFormat) -> Result<(), SearchError> {
        if self.tree.root_node().is_leaf() {
            let root = self.tree.root();
            expand(&mut self.tree, root, &self.position, None, 0.0, format)?;
        }
        Ok(())
    }

    fn move_record(&self, choice: usize) -> MoveRecord {
        let root = self.tree.root_node();
        let mut record = MoveRecord {
            board: vec![0; BOARD_SIZE],
            metadata: [0; METADATA_SIZE],
            policy: visit_distribution(root, 1.0)
                .into_iter()
                .zip(&root.edges)
                .filter(|(p, _)| *p > 0.0)
                .map(|(p, edge)| (edge.policy_index, p))
                .collect(),
            move_index: root.edges[choice].policy_index,
            white_to_move: self.position.turn() == Color::White,
            root_value: 0.0,
        };
        encode_board(&self.position, &mut record.board);
        encode_metadata(&self.position, &mut record.metadata);

        let visits = root.edge_visits();
        if visits > 0 {
            let value_sum: f64 = root.edges.iter().map(|e| e.value_sum).sum();
            record.root_value = (value_sum / f64::from(visits)) as f32;
        }
        record
    }

    fn finish(&mut self, termination: Termination, result: GameResult, counts: &mut StepCounts) {
        self.status = SlotStatus::Finished;
        self.outcome = Some((termination, result));
        self.in_flight = None;
        if let Some(mut log) = self.log.take() {
            log.finish(result, termination);
        }
        counts.games_finished += 1;

        let finished = FinishedGame {
            slot: self.index,
            game_number: self.game_number,
            result,
            termination,
            plies: self.history.len(),
            value: result.value_for(self.first_mover),
            log: self.log_path.clone(),
        };
        info!(
            slot = self.index,
            game = self.game_number,
            ?termination,
            score = result.white_score(),
            plies = finished.plies,
            "game finished"
        );
        self.unreported = Some(finished);
    }
}
