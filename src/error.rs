//! Error types for the engine and its collaborators.
//!
//! Usage errors (protocol violations by the driving loop) surface as
//! [`EngineError`]. Data errors in evaluator output are repaired in place and
//! never reach this module. Tablebase resource errors degrade the oracle
//! instead of failing.

use thiserror::Error;

/// Errors reported by [`BatchEngine`](crate::engine::BatchEngine).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sector {sector} already has a batch awaiting update")]
    SectorInFlight { sector: usize },

    #[error("no sector {0}")]
    UnknownSector(usize),

    #[error("update called without a preceding select")]
    NoPendingBatch,

    #[error("a selected batch is still awaiting update")]
    BatchInFlight,

    #[error("{what} length mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{in_progress} of {total} games still in progress")]
    GamesInProgress { in_progress: usize, total: usize },

    #[error("invalid temperature {0}")]
    InvalidTemperature(f32),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Tree invariant violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("node {0} is already expanded")]
    AlreadyExpanded(u32),

    #[error("node {0} is terminal and cannot be expanded")]
    TerminalExpansion(u32),

    #[error("edge {edge} out of range for node with {len} edges")]
    EdgeOutOfRange { edge: usize, len: usize },
}

/// Failures constructing a [`Position`](crate::core::Position).
#[derive(Debug, Error)]
pub enum PositionError {
    #[error("invalid FEN: {0}")]
    Fen(#[from] shakmaty::fen::ParseFenError),

    #[error("illegal position: {0}")]
    Illegal(String),
}

/// Game log I/O failures.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("game log I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("game log encoding: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Failures reported by a [`BatchEvaluator`](crate::evaluator::BatchEvaluator).
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluator failed: {0}")]
    Failed(String),

    #[error("evaluator thread disconnected")]
    Disconnected,
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;
