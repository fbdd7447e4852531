//! Engine counters for diagnostics and tuning.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Counters accumulated across select/update rounds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// `select()` calls completed.
    pub selects: u64,

    /// `update()` calls completed.
    pub updates: u64,

    /// Leaves sent out for network evaluation.
    pub leaves_evaluated: u64,

    /// Simulations resolved without the network (terminal or tablebase).
    pub short_circuits: u64,

    /// Of those, resolved by the tablebase.
    pub tablebase_hits: u64,

    /// Expansions whose policy carried no legal mass.
    pub policy_fallbacks: u64,

    /// Moves played across all games.
    pub moves_played: u64,

    /// Games finished.
    pub games_finished: u64,

    /// Time spent inside `select()` (microseconds).
    pub select_time_us: u64,

    /// Time spent inside `update()` (microseconds).
    pub update_time_us: u64,
}

impl SearchStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all statistics to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Total simulations, evaluated or short-circuited.
    #[must_use]
    pub fn simulations(&self) -> u64 {
        self.leaves_evaluated + self.short_circuits
    }

    /// Simulations per second of engine time.
    #[must_use]
    pub fn simulations_per_second(&self) -> f64 {
        let time_us = self.select_time_us + self.update_time_us;
        if time_us == 0 {
            0.0
        } else {
            self.simulations() as f64 / (time_us as f64 / 1_000_000.0)
        }
    }

    /// Average evaluated leaves per `select()`.
    #[must_use]
    pub fn avg_batch_fill(&self) -> f64 {
        if self.selects == 0 {
            0.0
        } else {
            self.leaves_evaluated as f64 / self.selects as f64
        }
    }
}

/// Per-call counter deltas produced by slot tasks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepCounts {
    pub leaves_evaluated: u64,
    pub short_circuits: u64,
    pub tablebase_hits: u64,
    pub policy_fallbacks: u64,
    pub moves_played: u64,
    pub games_finished: u64,
}

impl AddAssign for StepCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.leaves_evaluated += rhs.leaves_evaluated;
        self.short_circuits += rhs.short_circuits;
        self.tablebase_hits += rhs.tablebase_hits;
        self.policy_fallbacks += rhs.policy_fallbacks;
        self.moves_played += rhs.moves_played;
        self.games_finished += rhs.games_finished;
    }
}

impl AddAssign<StepCounts> for SearchStats {
    fn add_assign(&mut self, rhs: StepCounts) {
        self.leaves_evaluated += rhs.leaves_evaluated;
        self.short_circuits += rhs.short_circuits;
        self.tablebase_hits += rhs.tablebase_hits;
        self.policy_fallbacks += rhs.policy_fallbacks;
        self.moves_played += rhs.moves_played;
        self.games_finished += rhs.games_finished;
    }
}
