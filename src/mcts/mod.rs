//! Monte Carlo Tree Search over chess positions.
//!
//! ## Overview
//!
//! - **Arena tree**: nodes in a flat vector addressed by `NodeId`; playing a
//!   move re-roots by compacting the kept subtree
//! - **PUCT selection** with virtual loss on in-flight paths
//! - **External evaluation**: `select_leaf` stops at an unevaluated leaf and
//!   hands its position out; `expand` + `backpropagate` consume the result
//!
//! ## Usage
//!
//! ```rust
//! use batch_mcts::core::Position;
//! use batch_mcts::mcts::{backpropagate, expand, select_leaf, LeafSelection, MCTSTree};
//! use batch_mcts::mcts::{PolicyFormat, Puct, SearchParams};
//! use batch_mcts::tablebase::NullOracle;
//!
//! let position = Position::new();
//! let mut tree = MCTSTree::new();
//! let params = SearchParams::default();
//!
//! let root = tree.root();
//! expand(&mut tree, root, &position, None, 0.0, PolicyFormat::Probabilities).unwrap();
//!
//! if let LeafSelection::Pending(leaf) = select_leaf(&mut tree, &position, &Puct, &params, &NullOracle) {
//!     // Ask the network about `leaf.position`, then:
//!     expand(&mut tree, leaf.leaf, &leaf.position, None, 0.0, PolicyFormat::Probabilities).unwrap();
//!     backpropagate(&mut tree, &leaf.path, 0.0);
//! }
//! assert_eq!(tree.root_node().visits, 1);
//! ```

pub mod config;
pub mod node;
pub mod policy;
pub mod search;
pub mod stats;
pub mod tree;

// Re-export main types
pub use config::{
    EngineConfig, PolicyFormat, SearchParams, DEFAULT_NUM_SECTORS, SELF_PLAY_LATE_TEMPERATURE,
    SELF_PLAY_TEMPERATURE_THRESHOLD,
};
pub use node::{Edge, MCTSNode, NodeId, NodeState};
pub use policy::{sample_edge, visit_distribution, Puct, SelectionPolicy};
pub use search::{
    backpropagate, expand, game_over, revert_virtual_loss, select_leaf, Expansion,
    LeafSelection, PendingEval, SearchPath,
};
pub use stats::{SearchStats, StepCounts};
pub use tree::{MCTSTree, TreeStats};
