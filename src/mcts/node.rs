//! MCTS node and edge structures.
//!
//! Uses arena-based allocation with index references (NodeId). A node owns
//! its outgoing edges; an edge points at the child node once the search has
//! walked through it.

use shakmaty::Move;
use smallvec::SmallVec;

use crate::core::Termination;

/// Index into the MCTSTree node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value representing no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Create a new node ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Check if this is the NONE sentinel.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Get the raw index value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            write!(f, "NodeId(NONE)")
        } else {
            write!(f, "NodeId({})", self.0)
        }
    }
}

/// One legal move out of a node.
#[derive(Clone, Debug)]
pub struct Edge {
    /// The move this edge represents.
    pub mv: Move,

    /// Index of the move in the policy vector.
    pub policy_index: u16,

    /// Child node (NONE until first traversed).
    pub child: NodeId,

    /// Completed visits through this edge.
    pub visits: u32,

    /// Sum of backed-up values, from the perspective of the player making
    /// this move.
    pub value_sum: f64,

    /// Prior probability from the policy head.
    pub prior: f32,

    /// Selections through this edge still awaiting their backup.
    pub virtual_loss: u32,
}

impl Edge {
    /// Create an unvisited edge.
    pub fn new(mv: Move, policy_index: u16, prior: f32) -> Self {
        Self {
            mv,
            policy_index,
            child: NodeId::NONE,
            visits: 0,
            value_sum: 0.0,
            prior,
            virtual_loss: 0,
        }
    }

    /// Mean backed-up value Q (0 if unvisited).
    #[inline]
    #[must_use]
    pub fn mean_value(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.value_sum / f64::from(self.visits)
        }
    }

    /// Check if the child node exists.
    #[must_use]
    pub fn has_child(&self) -> bool {
        !self.child.is_none()
    }

    /// Clear visit statistics, keeping the move and prior.
    pub fn clear_statistics(&mut self) {
        self.child = NodeId::NONE;
        self.visits = 0;
        self.value_sum = 0.0;
        self.virtual_loss = 0;
    }
}

/// Lifecycle of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeState {
    /// Not yet evaluated by the network.
    Leaf,
    /// Edges materialized.
    Expanded,
    /// Game over (or tablebase-decided); `value` is for the side to move.
    Terminal { value: f32, termination: Termination },
}

/// A node in the MCTS tree.
#[derive(Clone, Debug)]
pub struct MCTSNode {
    pub state: NodeState,

    /// Depth below the current root.
    pub depth: u16,

    /// Sum of the visits of all edges.
    pub visits: u32,

    /// Network value estimate for the side to move, once expanded.
    pub value: f32,

    /// Outgoing edges in move-generation order.
    pub edges: SmallVec<[Edge; 8]>,
}

impl MCTSNode {
    /// A fresh leaf.
    pub fn leaf(depth: u16) -> Self {
        Self {
            state: NodeState::Leaf,
            depth,
            visits: 0,
            value: 0.0,
            edges: SmallVec::new(),
        }
    }

    /// A terminal node with a known value for the side to move.
    pub fn terminal(depth: u16, value: f32, termination: Termination) -> Self {
        Self {
            state: NodeState::Terminal { value, termination },
            ..Self::leaf(depth)
        }
    }

    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.state == NodeState::Leaf
    }

    #[inline]
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.state == NodeState::Expanded
    }

    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, NodeState::Terminal { .. })
    }

    /// Sum of child edge visits.
    #[must_use]
    pub fn edge_visits(&self) -> u32 {
        self.edges.iter().map(|e| e.visits).sum()
    }

    /// Index of the most-visited edge; ties go to the earliest edge.
    #[must_use]
    pub fn most_visited_edge(&self) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (i, edge) in self.edges.iter().enumerate() {
            if best.map_or(true, |(_, v)| edge.visits > v) {
                best = Some((i, edge.visits));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Index of the edge with the highest prior; ties go to the earliest edge.
    #[must_use]
    pub fn highest_prior_edge(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, edge) in self.edges.iter().enumerate() {
            if best.map_or(true, |(_, p)| edge.prior > p) {
                best = Some((i, edge.prior));
            }
        }
        best.map(|(i, _)| i)
    }
}
