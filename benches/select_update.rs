//! Engine throughput benchmarks.
//!
//! Run with: `cargo bench --bench select_update`
//!
//! These benchmarks measure:
//! - One select/update round across batch sizes
//! - A single tree's leaf selection and backup
//! - Full games played by the self-play driver

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use batch_mcts::core::{Position, POLICY_SIZE};
use batch_mcts::engine::BatchEngine;
use batch_mcts::evaluator::{SelfPlayDriver, UniformEvaluator};
use batch_mcts::mcts::{
    backpropagate, expand, select_leaf, EngineConfig, LeafSelection, MCTSTree, PolicyFormat, Puct,
    SearchParams,
};
use batch_mcts::tablebase::NullOracle;

// =============================================================================
// Batch Rounds
// =============================================================================

fn bench_select_update_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_update_round");

    for batch in [16usize, 64, 256] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("batch", batch), &batch, |b, &batch| {
            let config = EngineConfig::default()
                .with_simulations(u32::MAX / 2)
                .with_batching(batch, 1)
                .with_seed(42);
            let mut engine = BatchEngine::new(config).unwrap();
            let values = vec![0.0; batch];
            let policies = vec![1.0; batch * POLICY_SIZE];

            b.iter(|| {
                let selected = engine.select().unwrap();
                let n = selected.len;
                black_box(engine.update(&values[..n], &policies[..n * POLICY_SIZE]).unwrap())
            });
        });
    }

    group.finish();
}

// =============================================================================
// Tree Operations
// =============================================================================

fn bench_select_leaf(c: &mut Criterion) {
    let pos = Position::new();
    let params = SearchParams::default();
    let policy = vec![1.0; POLICY_SIZE];

    c.bench_function("select_expand_backup_400", |b| {
        b.iter(|| {
            let mut tree = MCTSTree::new();
            let root = tree.root();
            expand(&mut tree, root, &pos, None, 0.0, PolicyFormat::Probabilities).unwrap();
            for _ in 0..400 {
                if let LeafSelection::Pending(leaf) =
                    select_leaf(&mut tree, &pos, &Puct, &params, &NullOracle)
                {
                    if tree.get(leaf.leaf).is_leaf() {
                        expand(
                            &mut tree,
                            leaf.leaf,
                            &leaf.position,
                            Some(&policy),
                            0.0,
                            PolicyFormat::Probabilities,
                        )
                        .unwrap();
                    }
                    backpropagate(&mut tree, &leaf.path, 0.0);
                }
            }
            black_box(tree.len())
        });
    });
}

// =============================================================================
// Self-Play
// =============================================================================

fn bench_self_play(c: &mut Criterion) {
    let mut group = c.benchmark_group("self_play");
    group.sample_size(10);

    for sectors in [1usize, 2] {
        group.bench_with_input(
            BenchmarkId::new("sectors", sectors),
            &sectors,
            |b, &sectors| {
                b.iter(|| {
                    let config = EngineConfig::default()
                        .with_simulations(16)
                        .with_batching(8, sectors)
                        .with_max_game_plies(40)
                        .with_seed(7);
                    let mut engine = BatchEngine::new(config).unwrap();
                    black_box(
                        SelfPlayDriver::new(UniformEvaluator)
                            .play_to_completion(&mut engine)
                            .unwrap(),
                    )
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_select_update_round, bench_select_leaf, bench_self_play);
criterion_main!(benches);
