//! Select-leaf, expand and backpropagate over one game's tree.
//!
//! The functions here are the whole per-simulation algorithm; the engine
//! only decides when to call them and for which slot.
//!
//! Value convention: a leaf value is from the perspective of the side to move
//! at the leaf. An edge's `value_sum` is from the perspective of the player
//! who makes that move, so backup negates once per ply.

use smallvec::SmallVec;
use tracing::trace;

use crate::core::{legal_move_indices, GameResult, Position, Termination};
use crate::error::SearchError;
use crate::tablebase::{self, TablebaseOracle};

use super::config::{PolicyFormat, SearchParams};
use super::node::{Edge, MCTSNode, NodeId, NodeState};
use super::policy::SelectionPolicy;
use super::tree::MCTSTree;

/// Edges walked from the root: (node, edge index) pairs.
pub type SearchPath = SmallVec<[(NodeId, u16); 32]>;

/// A leaf that needs a network evaluation.
#[derive(Clone, Debug)]
pub struct PendingEval {
    /// Edges from the root to the leaf, virtual loss applied.
    pub path: SearchPath,

    /// The leaf node.
    pub leaf: NodeId,

    /// Position at the leaf.
    pub position: Position,
}

/// Outcome of one select-leaf descent.
#[derive(Clone, Debug)]
pub enum LeafSelection {
    /// Network evaluation required.
    Pending(PendingEval),

    /// Reached a decided position; its value has already been backed up.
    Resolved {
        /// Value for the side to move at the leaf.
        value: f32,
        termination: Termination,
    },
}

/// Summary of one expansion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Expansion {
    /// Number of edges created.
    pub edges: usize,

    /// The policy had no usable mass on legal moves and uniform priors
    /// were used instead.
    pub uniform_fallback: bool,
}

/// Whether `pos` ends the game, by the rules, the ply limit or the oracle.
pub fn game_over(
    pos: &Position,
    params: &SearchParams,
    oracle: &dyn TablebaseOracle,
) -> Option<(Termination, GameResult)> {
    if let Some(decided) = pos.termination() {
        return Some(decided);
    }
    if params.past_ply_limit(pos.ply()) {
        return Some((Termination::MoveLimit, GameResult::Draw));
    }
    tablebase::probe(oracle, pos)
        .result(pos.turn())
        .map(|result| (Termination::Tablebase, result))
}

/// Walk from the root to a leaf, choosing edges with `selection`.
///
/// Every traversed edge gets one unit of virtual loss. Terminal and
/// oracle-decided leaves are marked terminal in the tree and backed up
/// immediately, which also removes that virtual loss again.
pub fn select_leaf(
    tree: &mut MCTSTree,
    root_position: &Position,
    selection: &dyn SelectionPolicy,
    params: &SearchParams,
    oracle: &dyn TablebaseOracle,
) -> LeafSelection {
    let mut node = tree.root();
    let mut position = root_position.clone();
    let mut path = SearchPath::new();

    loop {
        let state = tree.get(node).state;
        match state {
            NodeState::Terminal { value, termination } => {
                backpropagate(tree, &path, value);
                return LeafSelection::Resolved { value, termination };
            }
            NodeState::Leaf => {
                if let Some((termination, result)) = game_over(&position, params, oracle) {
                    let value = result.value_for(position.turn());
                    let depth = tree.get(node).depth;
                    *tree.get_mut(node) = MCTSNode::terminal(depth, value, termination);
                    backpropagate(tree, &path, value);
                    trace!(?termination, value, depth, "leaf decided without evaluation");
                    return LeafSelection::Resolved { value, termination };
                }
                return LeafSelection::Pending(PendingEval {
                    path,
                    leaf: node,
                    position,
                });
            }
            NodeState::Expanded => {
                let Some(idx) = selection.select(tree.get(node), params.cpuct) else {
                    // Expanded without moves: only possible for a decided
                    // position, treat as a draw.
                    backpropagate(tree, &path, 0.0);
                    return LeafSelection::Resolved {
                        value: 0.0,
                        termination: Termination::Stalemate,
                    };
                };

                let depth = tree.get(node).depth;
                let edge = &mut tree.get_mut(node).edges[idx];
                edge.virtual_loss += 1;
                let mv = edge.mv.clone();
                let mut child = edge.child;
                if child.is_none() {
                    child = tree.alloc(MCTSNode::leaf(depth + 1));
                    tree.get_mut(node).edges[idx].child = child;
                }

                path.push((node, idx as u16));
                position = position.play(&mv);
                node = child;
            }
        }
    }
}

/// Back up `leaf_value` along `path`, leaf first.
///
/// Each edge gains one visit and the value from its mover's perspective, and
/// loses the virtual loss applied when it was selected.
pub fn backpropagate(tree: &mut MCTSTree, path: &[(NodeId, u16)], leaf_value: f32) {
    let mut value = -f64::from(leaf_value);
    for &(node_id, idx) in path.iter().rev() {
        let node = tree.get_mut(node_id);
        node.visits += 1;

        let edge = &mut node.edges[idx as usize];
        edge.visits += 1;
        edge.value_sum += value;
        debug_assert!(edge.virtual_loss > 0, "virtual loss underflow");
        edge.virtual_loss = edge.virtual_loss.saturating_sub(1);

        value = -value;
    }
}

/// Undo the virtual loss of a selection that will never be evaluated.
///
/// Visits and values are untouched.
pub fn revert_virtual_loss(tree: &mut MCTSTree, path: &[(NodeId, u16)]) {
    for &(node_id, idx) in path {
        let edge = &mut tree.get_mut(node_id).edges[idx as usize];
        debug_assert!(edge.virtual_loss > 0, "virtual loss underflow");
        edge.virtual_loss = edge.virtual_loss.saturating_sub(1);
    }
}

/// Create one edge per legal move of `pos` at `node`.
///
/// Priors are read from `policy` at each move's encoded index and
/// renormalized over the legal moves; `None` gives uniform priors. Mass on
/// illegal moves, negative or non-finite entries are ignored.
pub fn expand(
    tree: &mut MCTSTree,
    node: NodeId,
    pos: &Position,
    policy: Option<&[f32]>,
    value: f32,
    format: PolicyFormat,
) -> Result<Expansion, SearchError> {
    match tree.get(node).state {
        NodeState::Expanded => return Err(SearchError::AlreadyExpanded(node.raw())),
        NodeState::Terminal { .. } => return Err(SearchError::TerminalExpansion(node.raw())),
        NodeState::Leaf => {}
    }

    let moves = legal_move_indices(pos);
    let (priors, uniform_fallback) = legal_priors(&moves, policy, format);

    let target = tree.get_mut(node);
    target.edges = moves
        .into_iter()
        .zip(priors)
        .map(|((mv, idx), prior)| Edge::new(mv, idx as u16, prior))
        .collect();
    target.value = value;
    target.state = NodeState::Expanded;

    Ok(Expansion {
        edges: target.edges.len(),
        uniform_fallback,
    })
}

fn legal_priors(
    moves: &[(shakmaty::Move, usize)],
    policy: Option<&[f32]>,
    format: PolicyFormat,
) -> (Vec<f32>, bool) {
    let n = moves.len();
    let uniform = || vec![1.0 / n.max(1) as f32; n];

    let Some(policy) = policy else {
        return (uniform(), false);
    };

    let raw = moves.iter().map(|(_, idx)| policy.get(*idx).copied().unwrap_or(0.0));
    let mut masses: Vec<f32> = match format {
        PolicyFormat::Probabilities => raw
            .map(|p| if p.is_finite() && p > 0.0 { p } else { 0.0 })
            .collect(),
        PolicyFormat::LogProbabilities => {
            let logits: Vec<f32> = raw.collect();
            let max = logits
                .iter()
                .copied()
                .filter(|l| l.is_finite())
                .fold(f32::NEG_INFINITY, f32::max);
            logits
                .into_iter()
                .map(|l| if l.is_finite() { (l - max).exp() } else { 0.0 })
                .collect()
        }
    };

    let total: f32 = masses.iter().sum();
    if n > 0 && total > 0.0 && total.is_finite() {
        masses.iter_mut().for_each(|m| *m /= total);
        (masses, false)
    } else {
        (uniform(), n > 0)
    }
}
