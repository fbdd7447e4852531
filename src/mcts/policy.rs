//! Child selection during search and move selection at the root.
//!
//! - `SelectionPolicy`: which edge to descend during select-leaf (PUCT)
//! - `visit_distribution` / `sample_edge`: which move to play once the
//!   simulation budget is spent

use crate::core::GameRng;

use super::node::MCTSNode;

/// Temperatures at or below this are treated as arg-max.
pub const MIN_TEMPERATURE: f32 = 1e-3;

// =============================================================================
// Selection Policy
// =============================================================================

/// Policy for selecting which child edge to explore.
pub trait SelectionPolicy: Send + Sync {
    /// Select the edge index to follow from an expanded node.
    ///
    /// Returns `None` if the node has no edges.
    fn select(&self, node: &MCTSNode, cpuct: f32) -> Option<usize>;
}

/// PUCT selection policy (Predictor + UCB for Trees).
///
/// Formula: Q(a) + c * P(a) * sqrt(N) / (1 + n(a) + vl(a)), with N clamped to
/// at least 1. Ties go to the earliest edge in move-generation order.
#[derive(Clone, Copy, Debug, Default)]
pub struct Puct;

impl SelectionPolicy for Puct {
    fn select(&self, node: &MCTSNode, cpuct: f32) -> Option<usize> {
        let sqrt_parent = f64::from(node.visits.max(1)).sqrt();
        let cpuct = f64::from(cpuct);

        let mut best: Option<(usize, f64)> = None;
        for (i, edge) in node.edges.iter().enumerate() {
            let u = cpuct * f64::from(edge.prior) * sqrt_parent
                / (1.0 + f64::from(edge.visits) + f64::from(edge.virtual_loss));
            let score = edge.mean_value() + u;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| i)
    }
}

// =============================================================================
// Root move selection
// =============================================================================

/// Probability of playing each root edge at `temperature`.
///
/// Proportional to `N^(1/T)`; at `T <= MIN_TEMPERATURE` all mass goes to the
/// most-visited edge. A root without visits falls back to its priors (arg-max
/// prior at low temperature).
#[must_use]
pub fn visit_distribution(node: &MCTSNode, temperature: f32) -> Vec<f32> {
    let mut probs = vec![0.0; node.edges.len()];
    if probs.is_empty() {
        return probs;
    }

    let total_visits = node.edge_visits();
    if temperature <= MIN_TEMPERATURE {
        let best = if total_visits > 0 {
            node.most_visited_edge()
        } else {
            node.highest_prior_edge()
        };
        if let Some(best) = best {
            probs[best] = 1.0;
        }
        return probs;
    }

    if total_visits == 0 {
        let total: f32 = node.edges.iter().map(|e| e.prior).sum();
        for (p, edge) in probs.iter_mut().zip(&node.edges) {
            *p = if total > 0.0 { edge.prior / total } else { 1.0 / node.edges.len() as f32 };
        }
        return probs;
    }

    // Scale by the maximum first so large counts and small temperatures
    // stay finite.
    let max = node.edges.iter().map(|e| e.visits).max().unwrap_or(1).max(1) as f64;
    let exponent = 1.0 / f64::from(temperature);
    let weights: Vec<f64> = node
        .edges
        .iter()
        .map(|e| (f64::from(e.visits) / max).powf(exponent))
        .collect();
    let total: f64 = weights.iter().sum();
    for (p, w) in probs.iter_mut().zip(weights) {
        *p = (w / total) as f32;
    }
    probs
}

/// Sample a root edge according to [`visit_distribution`].
pub fn sample_edge(node: &MCTSNode, temperature: f32, rng: &mut GameRng) -> Option<usize> {
    let probs = visit_distribution(node, temperature);
    if temperature <= MIN_TEMPERATURE {
        return probs.iter().position(|&p| p > 0.0);
    }
    rng.choose_weighted(&probs).or_else(|| node.most_visited_edge())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Position;
    use crate::mcts::node::{Edge, NodeState};

    fn node_with(priors: &[f32], visits: &[u32]) -> MCTSNode {
        let moves: Vec<_> = Position::new().legal_moves().into_iter().collect();
        let mut node = MCTSNode::leaf(0);
        node.state = NodeState::Expanded;
        for (i, (&p, &v)) in priors.iter().zip(visits).enumerate() {
            let mut edge = Edge::new(moves[i].clone(), 0, p);
            edge.visits = v;
            node.edges.push(edge);
        }
        node.visits = visits.iter().sum();
        node
    }

    #[test]
    fn test_puct_tie_breaks_first() {
        let node = node_with(&[0.25; 4], &[0; 4]);
        assert_eq!(Puct.select(&node, 1.5), Some(0));
    }

    #[test]
    fn test_puct_prefers_prior() {
        let node = node_with(&[0.1, 0.7, 0.2], &[0, 0, 0]);
        assert_eq!(Puct.select(&node, 1.5), Some(1));
    }

    #[test]
    fn test_puct_prefers_value() {
        let mut node = node_with(&[0.5, 0.5], &[2, 2]);
        node.edges[1].value_sum = 1.6;
        assert_eq!(Puct.select(&node, 1.0), Some(1));
    }

    #[test]
    fn test_virtual_loss_discourages() {
        let mut node = node_with(&[0.5, 0.5], &[1, 1]);
        node.edges[0].virtual_loss = 3;
        assert_eq!(Puct.select(&node, 1.0), Some(1));
    }

    #[test]
    fn test_puct_empty() {
        let node = MCTSNode::leaf(0);
        assert_eq!(Puct.select(&node, 1.0), None);
    }

    #[test]
    fn test_zero_temperature_is_argmax() {
        let node = node_with(&[0.3, 0.3, 0.4], &[5, 9, 9]);
        let probs = visit_distribution(&node, 0.0);
        assert_eq!(probs, vec![0.0, 1.0, 0.0]);

        let mut rng = GameRng::new(3);
        for _ in 0..20 {
            assert_eq!(sample_edge(&node, 0.0, &mut rng), Some(1));
        }
    }

    #[test]
    fn test_unit_temperature_matches_visits() {
        let node = node_with(&[0.25; 4], &[1, 2, 3, 4]);
        let probs = visit_distribution(&node, 1.0);
        for (p, expected) in probs.iter().zip([0.1, 0.2, 0.3, 0.4]) {
            assert!((p - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unit_temperature_sampling_converges() {
        let node = node_with(&[0.5, 0.5], &[1, 3]);
        let mut rng = GameRng::new(11);
        let mut counts = [0usize; 2];
        for _ in 0..20_000 {
            counts[sample_edge(&node, 1.0, &mut rng).unwrap()] += 1;
        }
        let frac = counts[1] as f64 / 20_000.0;
        assert!((frac - 0.75).abs() < 0.02, "got {frac}");
    }

    #[test]
    fn test_low_temperature_sharpens() {
        let node = node_with(&[0.5, 0.5], &[1, 2]);
        let probs = visit_distribution(&node, 0.25);
        // (1/2)^4 = 1/16 -> 1/17 vs 16/17
        assert!((probs[1] - 16.0 / 17.0).abs() < 1e-5);
    }

    #[test]
    fn test_unvisited_root_falls_back_to_priors() {
        let node = node_with(&[0.2, 0.5, 0.3], &[0, 0, 0]);
        assert_eq!(visit_distribution(&node, 0.0), vec![0.0, 1.0, 0.0]);
        let probs = visit_distribution(&node, 1.0);
        assert!((probs[1] - 0.5).abs() < 1e-6);
    }
}
