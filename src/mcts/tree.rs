//! Arena-based MCTS tree.
//!
//! Nodes live in a flat `Vec<MCTSNode>` and reference each other through
//! `NodeId` indices. Playing a move re-roots the tree by copying the chosen
//! subtree into a fresh arena; everything else is dropped with the old vector.

use super::node::{MCTSNode, NodeId, NodeState};
use crate::error::SearchError;

/// Arena-based MCTS tree.
#[derive(Clone, Debug)]
pub struct MCTSTree {
    /// All nodes in the tree.
    nodes: Vec<MCTSNode>,

    /// The root node ID (always 0 after construction or re-rooting).
    root: NodeId,
}

impl Default for MCTSTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MCTSTree {
    /// Create a new tree with an unevaluated root.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a tree with custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity.max(1));
        nodes.push(MCTSNode::leaf(0));
        Self {
            nodes,
            root: NodeId::new(0),
        }
    }

    /// Get the root node ID.
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get a node by ID.
    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> &MCTSNode {
        &self.nodes[id.0 as usize]
    }

    /// Get a mutable node by ID.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut MCTSNode {
        &mut self.nodes[id.0 as usize]
    }

    /// Allocate a new node, returning its ID.
    pub fn alloc(&mut self, node: MCTSNode) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tree is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get the root node.
    #[must_use]
    pub fn root_node(&self) -> &MCTSNode {
        self.get(self.root)
    }

    /// Get the root node mutably.
    pub fn root_node_mut(&mut self) -> &mut MCTSNode {
        self.get_mut(self.root)
    }

    /// Iterate over all nodes.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &MCTSNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::new(i as u32), n))
    }

    /// Make the child behind root edge `edge` the new root.
    ///
    /// The child's subtree is copied into a fresh arena with its statistics
    /// untouched; siblings and the old root are dropped. If the edge was never
    /// traversed the new root is a fresh leaf.
    pub fn reroot(&mut self, edge: usize) -> Result<(), SearchError> {
        let root = self.root_node();
        let len = root.edges.len();
        let child = root
            .edges
            .get(edge)
            .ok_or(SearchError::EdgeOutOfRange { edge, len })?
            .child;

        if child.is_none() {
            *self = Self::with_capacity(self.nodes.capacity());
            return Ok(());
        }

        let base_depth = self.get(child).depth;
        let mut old = std::mem::take(&mut self.nodes);
        let mut nodes = Vec::with_capacity(old.capacity());

        // Breadth-first copy; a node's new index is its position in `nodes`.
        let mut queue = std::collections::VecDeque::from([child]);
        while let Some(old_id) = queue.pop_front() {
            let mut node = std::mem::replace(&mut old[old_id.0 as usize], MCTSNode::leaf(0));
            node.depth -= base_depth;
            for edge in node.edges.iter_mut().filter(|e| e.has_child()) {
                queue.push_back(edge.child);
                edge.child = NodeId::new((nodes.len() + queue.len()) as u32);
            }
            nodes.push(node);
        }

        self.nodes = nodes;
        self.root = NodeId::new(0);
        Ok(())
    }

    /// Drop everything below the root and zero the root's statistics.
    ///
    /// The root keeps its expansion state and priors.
    pub fn reset_statistics(&mut self) {
        let mut root = std::mem::replace(self.root_node_mut(), MCTSNode::leaf(0));
        root.depth = 0;
        root.visits = 0;
        root.edges.iter_mut().for_each(|e| e.clear_statistics());

        self.nodes.clear();
        self.nodes.push(root);
        self.root = NodeId::new(0);
    }

    /// Sum of virtual loss over every edge in the tree.
    #[must_use]
    pub fn total_virtual_loss(&self) -> u64 {
        self.nodes
            .iter()
            .flat_map(|n| n.edges.iter())
            .map(|e| u64::from(e.virtual_loss))
            .sum()
    }

    /// Whether every expanded node's visit count equals the sum of its
    /// edges' visit counts.
    #[must_use]
    pub fn visits_conserved(&self) -> bool {
        self.nodes
            .iter()
            .filter(|n| n.state == NodeState::Expanded)
            .all(|n| n.visits == n.edge_visits())
    }

    /// Get statistics about the tree.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        let max_depth = self.nodes.iter().map(|n| n.depth).max().unwrap_or(0);
        let terminal_count = self.nodes.iter().filter(|n| n.is_terminal()).count();
        let expanded_count = self.nodes.iter().filter(|n| n.is_expanded()).count();
        let total_edges: usize = self.nodes.iter().map(|n| n.edges.len()).sum();

        TreeStats {
            node_count: self.nodes.len(),
            max_depth,
            terminal_count,
            expanded_count,
            total_edges,
        }
    }
}

/// Statistics about the MCTS tree.
#[derive(Clone, Debug, Default)]
pub struct TreeStats {
    /// Total number of nodes.
    pub node_count: usize,

    /// Maximum depth reached.
    pub max_depth: u16,

    /// Number of terminal nodes.
    pub terminal_count: usize,

    /// Number of expanded nodes.
    pub expanded_count: usize,

    /// Total number of edges (legal moves) materialized.
    pub total_edges: usize,
}

impl TreeStats {
    /// Average edges per expanded node.
    #[must_use]
    pub fn branching_factor(&self) -> f64 {
        if self.expanded_count == 0 {
            0.0
        } else {
            self.total_edges as f64 / self.expanded_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Position, Termination};
    use crate::mcts::node::Edge;

    /// Root with three edges, children behind the first two, and a
    /// grandchild behind child 0.
    fn sample_tree() -> MCTSTree {
        let mut tree = MCTSTree::new();
        let moves: Vec<_> = Position::new().legal_moves().into_iter().take(3).collect();

        let root = tree.root();
        tree.get_mut(root).state = NodeState::Expanded;
        for mv in moves.iter() {
            tree.get_mut(root).edges.push(Edge::new(mv.clone(), 0, 1.0 / 3.0));
        }

        let a = tree.alloc(MCTSNode::leaf(1));
        let b = tree.alloc(MCTSNode::terminal(1, 0.0, Termination::Stalemate));
        tree.get_mut(root).edges[0].child = a;
        tree.get_mut(root).edges[1].child = b;

        tree.get_mut(a).state = NodeState::Expanded;
        tree.get_mut(a).edges.push(Edge::new(moves[0].clone(), 0, 1.0));
        let grandchild = tree.alloc(MCTSNode::leaf(2));
        tree.get_mut(a).edges[0].child = grandchild;

        tree.get_mut(a).edges[0].visits = 3;
        tree.get_mut(a).edges[0].value_sum = 1.5;
        tree.get_mut(a).visits = 3;
        tree.get_mut(root).edges[0].visits = 4;
        tree.get_mut(root).edges[1].visits = 2;
        tree.get_mut(root).visits = 6;
        tree
    }

    #[test]
    fn test_tree_new() {
        let tree = MCTSTree::new();

        assert_eq!(tree.len(), 1);
        assert!(!tree.is_empty());
        assert_eq!(tree.root(), NodeId::new(0));
        assert!(tree.root_node().is_leaf());
    }

    #[test]
    fn test_tree_alloc() {
        let mut tree = MCTSTree::new();
        let child_id = tree.alloc(MCTSNode::leaf(1));

        assert_eq!(child_id, NodeId::new(1));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(child_id).depth, 1);
    }

    #[test]
    fn test_reroot_keeps_child_statistics() {
        let mut tree = sample_tree();
        let before = tree.get(tree.root_node().edges[0].child).clone();

        tree.reroot(0).unwrap();

        assert_eq!(tree.len(), 2);
        let root = tree.root_node();
        assert_eq!(root.depth, 0);
        assert_eq!(root.visits, before.visits);
        assert_eq!(root.edges.len(), before.edges.len());
        assert_eq!(root.edges[0].visits, 3);
        assert_eq!(root.edges[0].value_sum, 1.5);

        // Grandchild remapped and re-depthed.
        let grandchild = root.edges[0].child;
        assert_eq!(grandchild, NodeId::new(1));
        assert_eq!(tree.get(grandchild).depth, 1);
    }

    #[test]
    fn test_reroot_drops_siblings() {
        let mut tree = sample_tree();
        tree.reroot(1).unwrap();

        assert_eq!(tree.len(), 1);
        assert!(tree.root_node().is_terminal());
        assert_eq!(tree.stats().terminal_count, 1);
    }

    #[test]
    fn test_reroot_untraversed_edge() {
        let mut tree = sample_tree();
        tree.reroot(2).unwrap();

        assert_eq!(tree.len(), 1);
        assert!(tree.root_node().is_leaf());
        assert_eq!(tree.root_node().visits, 0);
    }

    #[test]
    fn test_reroot_out_of_range() {
        let mut tree = sample_tree();
        assert_eq!(
            tree.reroot(7),
            Err(SearchError::EdgeOutOfRange { edge: 7, len: 3 })
        );
    }

    #[test]
    fn test_reset_statistics() {
        let mut tree = sample_tree();
        tree.reset_statistics();

        assert_eq!(tree.len(), 1);
        let root = tree.root_node();
        assert!(root.is_expanded());
        assert_eq!(root.visits, 0);
        assert_eq!(root.edges.len(), 3);
        assert!(root.edges.iter().all(|e| e.visits == 0 && !e.has_child()));
        assert!((root.edges[0].prior - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_invariant_checks() {
        let mut tree = sample_tree();
        assert!(tree.visits_conserved());
        assert_eq!(tree.total_virtual_loss(), 0);

        tree.root_node_mut().edges[2].virtual_loss = 2;
        tree.root_node_mut().visits += 1;
        assert_eq!(tree.total_virtual_loss(), 2);
        assert!(!tree.visits_conserved());
    }

    #[test]
    fn test_tree_stats() {
        let tree = sample_tree();
        let stats = tree.stats();

        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.max_depth, 2);
        assert_eq!(stats.terminal_count, 1);
        assert_eq!(stats.expanded_count, 2);
        assert_eq!(stats.total_edges, 4);
        assert_eq!(stats.branching_factor(), 2.0);
    }
}
