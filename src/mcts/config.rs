//! Engine configuration parameters.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Sectors in a default engine.
pub const DEFAULT_NUM_SECTORS: usize = 2;

/// Ply at which self-play drops to [`SELF_PLAY_LATE_TEMPERATURE`].
pub const SELF_PLAY_TEMPERATURE_THRESHOLD: u32 = 40;

/// Sampling temperature of self-play games after the opening.
pub const SELF_PLAY_LATE_TEMPERATURE: f32 = 0.25;

/// How evaluator policy outputs are to be read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyFormat {
    /// Non-negative masses (softmax output).
    #[default]
    Probabilities,
    /// Log-probabilities (log-softmax output); exponentiated before use.
    LogProbabilities,
}

/// Engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Simulations per move before a move is decided.
    pub simulations_per_move: u32,

    /// Sampling temperature games start with (0 = greedy).
    pub temperature: f32,

    /// Ply (1-based) at which a game switches to `late_temperature`
    /// (0 = never).
    pub temperature_threshold: u32,

    /// Temperature a game switches to at `temperature_threshold`.
    pub late_temperature: f32,

    /// Play decided moves automatically and replace finished games.
    pub autoplay: bool,

    /// Base path for self-play game logs; `None` disables recording.
    pub output_path: Option<PathBuf>,

    /// Worker threads in the search pool.
    pub num_threads: usize,

    /// Game slots per sector.
    pub batch_size: usize,

    /// Number of sectors rotated round-robin.
    pub num_sectors: usize,

    /// PUCT exploration constant.
    pub cpuct: f32,

    /// Syzygy tablebase directory (or `:`-separated directories).
    pub tablebase_path: Option<PathBuf>,

    /// Plies after which a game is adjudicated a draw (0 = unlimited).
    pub max_game_plies: u32,

    /// Format of evaluator policy outputs.
    pub policy_format: PolicyFormat,

    /// Starting position for new games (FEN); `None` for the standard start.
    pub start_fen: Option<String>,

    /// Random seed for move sampling.
    /// Same seed produces the same games regardless of thread count.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            simulations_per_move: 800,
            temperature: 1.0,
            temperature_threshold: 0,
            late_temperature: 0.25,
            autoplay: false,
            output_path: None,
            num_threads: 1,
            batch_size: 64,
            num_sectors: DEFAULT_NUM_SECTORS,
            cpuct: 1.25,
            tablebase_path: None,
            max_game_plies: 512,
            policy_format: PolicyFormat::Probabilities,
            start_fen: None,
            seed: 42,
        }
    }
}

impl EngineConfig {
    /// Self-play preset: autoplay on, temperature dropping to 0.25 at ply 40.
    pub fn self_play() -> Self {
        Self::default()
            .with_autoplay(true)
            .with_temperature_drop(SELF_PLAY_TEMPERATURE_THRESHOLD, SELF_PLAY_LATE_TEMPERATURE)
    }

    /// Set simulations per move.
    pub fn with_simulations(mut self, simulations: u32) -> Self {
        self.simulations_per_move = simulations;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Switch to `late` temperature at ply `threshold`.
    pub fn with_temperature_drop(mut self, threshold: u32, late: f32) -> Self {
        self.temperature_threshold = threshold;
        self.late_temperature = late;
        self
    }

    /// Switch to `late` temperature at ply `threshold`, or, for `None`, at
    /// the self-play ply when autoplay is on and never otherwise.
    ///
    /// Set autoplay first.
    pub fn with_temperature_schedule(self, threshold: Option<u32>, late: f32) -> Self {
        let default = if self.autoplay {
            SELF_PLAY_TEMPERATURE_THRESHOLD
        } else {
            0
        };
        self.with_temperature_drop(threshold.unwrap_or(default), late)
    }

    /// Enable or disable autoplay.
    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    /// Record games under `path`.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Set worker thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Set batch size and sector count.
    pub fn with_batching(mut self, batch_size: usize, num_sectors: usize) -> Self {
        self.batch_size = batch_size;
        self.num_sectors = num_sectors;
        self
    }

    /// Set the exploration constant.
    pub fn with_cpuct(mut self, cpuct: f32) -> Self {
        self.cpuct = cpuct;
        self
    }

    /// Load tablebases from `path`.
    pub fn with_tablebase(mut self, path: impl Into<PathBuf>) -> Self {
        self.tablebase_path = Some(path.into());
        self
    }

    /// Set the adjudication ply limit.
    pub fn with_max_game_plies(mut self, plies: u32) -> Self {
        self.max_game_plies = plies;
        self
    }

    /// Set the evaluator policy format.
    pub fn with_policy_format(mut self, format: PolicyFormat) -> Self {
        self.policy_format = format;
        self
    }

    /// Start new games from `fen`.
    pub fn with_start_fen(mut self, fen: impl Into<String>) -> Self {
        self.start_fen = Some(fen.into());
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Total game slots across all sectors.
    #[must_use]
    pub fn total_slots(&self) -> usize {
        self.batch_size * self.num_sectors
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(EngineError::InvalidConfig(msg.to_string()));

        if self.simulations_per_move == 0 {
            return invalid("simulations_per_move must be at least 1");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1");
        }
        if self.num_sectors == 0 {
            return invalid("num_sectors must be at least 1");
        }
        if self.num_threads == 0 {
            return invalid("num_threads must be at least 1");
        }
        if !self.cpuct.is_finite() || self.cpuct < 0.0 {
            return invalid("cpuct must be finite and non-negative");
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return invalid("temperature must be finite and non-negative");
        }
        if !self.late_temperature.is_finite() || self.late_temperature < 0.0 {
            return invalid("late_temperature must be finite and non-negative");
        }
        Ok(())
    }

    /// The subset of settings read by search tasks.
    #[must_use]
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            simulations_per_move: self.simulations_per_move,
            temperature: self.temperature,
            temperature_threshold: self.temperature_threshold,
            late_temperature: self.late_temperature,
            autoplay: self.autoplay,
            cpuct: self.cpuct,
            max_game_plies: self.max_game_plies,
            policy_format: self.policy_format,
            seed: self.seed,
        }
    }
}

/// Read-only settings shared by every slot task.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchParams {
    pub simulations_per_move: u32,
    pub temperature: f32,
    pub temperature_threshold: u32,
    pub late_temperature: f32,
    pub autoplay: bool,
    pub cpuct: f32,
    pub max_game_plies: u32,
    pub policy_format: PolicyFormat,
    pub seed: u64,
}

impl SearchParams {
    /// The temperature a game switches to when about to play ply `ply`
    /// (1-based), if the schedule switches there.
    #[must_use]
    pub fn temperature_switch(&self, ply: u32) -> Option<f32> {
        (self.temperature_threshold > 0 && ply == self.temperature_threshold)
            .then_some(self.late_temperature)
    }

    /// Whether a position `ply` plies into the game is past the ply limit.
    #[must_use]
    pub fn past_ply_limit(&self, ply: u32) -> bool {
        self.max_game_plies > 0 && ply >= self.max_game_plies
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        EngineConfig::default().search_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.simulations_per_move, 800);
        assert_eq!(config.num_sectors, 2);
        assert_eq!(config.num_sectors, DEFAULT_NUM_SECTORS);
        assert!(!config.autoplay);
        assert!(config.output_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::default()
            .with_simulations(16)
            .with_batching(4, 3)
            .with_cpuct(2.0)
            .with_autoplay(true)
            .with_seed(123);

        assert_eq!(config.simulations_per_move, 16);
        assert_eq!(config.total_slots(), 12);
        assert_eq!(config.cpuct, 2.0);
        assert!(config.autoplay);
        assert_eq!(config.seed, 123);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        for config in [
            EngineConfig::default().with_simulations(0),
            EngineConfig::default().with_batching(0, 1),
            EngineConfig::default().with_batching(1, 0),
            EngineConfig::default().with_threads(0),
            EngineConfig::default().with_temperature(-1.0),
            EngineConfig::default().with_cpuct(f32::NAN),
        ] {
            assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_temperature_schedule() {
        let params = EngineConfig::default()
            .with_temperature(1.0)
            .with_temperature_drop(40, 0.25)
            .search_params();

        assert_eq!(params.temperature_switch(1), None);
        assert_eq!(params.temperature_switch(39), None);
        assert_eq!(params.temperature_switch(40), Some(0.25));
        assert_eq!(params.temperature_switch(41), None);

        let never = EngineConfig::default().search_params();
        assert!((1..1000).all(|ply| never.temperature_switch(ply).is_none()));
    }

    #[test]
    fn test_temperature_schedule_follows_autoplay() {
        let config = EngineConfig::default()
            .with_autoplay(true)
            .with_temperature_schedule(None, 0.25);
        assert_eq!(config.temperature_threshold, 40);

        let config = EngineConfig::default().with_temperature_schedule(None, 0.25);
        assert_eq!(config.temperature_threshold, 0);

        let config = EngineConfig::default()
            .with_autoplay(true)
            .with_temperature_schedule(Some(12), 0.1);
        assert_eq!(config.temperature_threshold, 12);
        assert_eq!(config.late_temperature, 0.1);
    }

    #[test]
    fn test_self_play_preset() {
        let config = EngineConfig::self_play();
        assert!(config.autoplay);
        assert_eq!(config.temperature_threshold, 40);
        assert_eq!(config.late_temperature, 0.25);
        assert_eq!(config.num_sectors, EngineConfig::default().num_sectors);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ply_limit() {
        let params = EngineConfig::default().with_max_game_plies(10).search_params();
        assert!(!params.past_ply_limit(9));
        assert!(params.past_ply_limit(10));

        let unlimited = EngineConfig::default().with_max_game_plies(0).search_params();
        assert!(!unlimited.past_ply_limit(u32::MAX));
    }

    #[test]
    fn test_serialization() {
        let config = EngineConfig::default()
            .with_output_path("/tmp/games")
            .with_policy_format(PolicyFormat::LogProbabilities);
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: EngineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.seed, deserialized.seed);
        assert_eq!(config.output_path, deserialized.output_path);
        assert_eq!(deserialized.policy_format, PolicyFormat::LogProbabilities);
    }
}
