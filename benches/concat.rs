//! Benchmarks for the concatenation passes.
//!
//! Each benchmark builds a synthetic graph once and runs a pass on fresh clones of it:
//! - Prefix chains of variadic concatenations (common-input elimination)
//! - Nested concatenations with known shapes (expansion and buffer fusion)
//! - Lists grown by appends before concatenation (variadic fixpoint)
//! - The full pipeline on a mix of all three

extern crate catopt;

use catopt::prelude::*;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

const SIZES: [usize; 3] = [16, 64, 256];

/// `n` variadic concatenations where each one extends the previous by a single operand.
fn prefix_chain(n: usize) -> Graph {
    GraphBuilder::new().build_with(|g| {
        let inputs: Vec<ValueId> = (0..=n).map(|_| g.input(Type::tensor_of([1, 8]))).collect();
        let dim = g.const_int(0);
        let outputs: Vec<ValueId> = (2..=n)
            .map(|len| g.var_concat(&inputs[..len], dim))
            .collect();
        g.ret(&outputs);
    })
}

/// A left-leaning tree of `n` nested `aten::cat` nodes over known shapes.
fn nested_cats(n: usize) -> Graph {
    GraphBuilder::new().build_with(|g| {
        let dim = g.const_int(1);
        let mut acc = g.input(Type::tensor_of([4, 2]));
        let mut width = 2;
        for _ in 0..n {
            let next = g.input(Type::tensor_of([4, 3]));
            let list = g.list(&[acc, next]);
            width += 3;
            let cat = g.node(NodeKind::Cat, &[list, dim], vec![Type::tensor_of([4, width])]);
            acc = g.graph().node(cat).output();
        }
        g.ret(&[acc]);
    })
}

/// `n` independent lists, each grown by two appends before being concatenated.
fn appended_lists(n: usize) -> Graph {
    GraphBuilder::new().build_with(|g| {
        let x = g.input(Type::tensor_of([2]));
        let y = g.input(Type::tensor_of([3]));
        let dim = g.const_int(0);
        let outputs: Vec<ValueId> = (0..n)
            .map(|_| {
                let list = g.list(&[x]);
                let _ = g.append(list, y);
                let _ = g.append(list, x);
                let cat = g.node(NodeKind::Cat, &[list, dim], vec![Type::tensor_of([7])]);
                g.graph().node(cat).output()
            })
            .collect();
        g.ret(&outputs);
    })
}

fn bench_pass<F>(c: &mut Criterion, group_name: &str, build: fn(usize) -> Graph, pass: F)
where
    F: Fn(&mut Graph) + Copy,
{
    let mut group = c.benchmark_group(group_name);
    for n in SIZES {
        let graph = build(n);
        group.throughput(Throughput::Elements(graph.node_count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &graph, |b, graph| {
            b.iter_batched(
                || graph.clone(),
                |mut graph| {
                    pass(&mut graph);
                    black_box(graph)
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_eliminate_common_inputs(c: &mut Criterion) {
    bench_pass(c, "eliminate_common_inputs", prefix_chain, |g| {
        eliminate_common_concat_inputs(g).unwrap();
    });
}

fn bench_expand_and_fuse(c: &mut Criterion) {
    bench_pass(c, "expand_and_fuse", nested_cats, |g| {
        expand_concat_and_fuse(g).unwrap();
    });
}

fn bench_variadic_fixpoint(c: &mut Criterion) {
    bench_pass(c, "variadic_fixpoint", appended_lists, |g| {
        remove_list_mutation_and_promote_to_variadic(g).unwrap();
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let pipeline = ConcatPipeline::new(OptimizerConfig::default());
    let mut group = c.benchmark_group("pipeline");
    for n in SIZES {
        let graphs = [prefix_chain(n), nested_cats(n), appended_lists(n)];
        group.bench_with_input(BenchmarkId::new("single", n), &graphs, |b, graphs| {
            b.iter_batched(
                || graphs.clone(),
                |mut graphs| {
                    for graph in &mut graphs {
                        pipeline.run(graph).unwrap();
                    }
                    black_box(graphs)
                },
                BatchSize::SmallInput,
            );
        });
        group.bench_with_input(BenchmarkId::new("batch", n), &graphs, |b, graphs| {
            b.iter_batched(
                || graphs.to_vec(),
                |mut graphs| {
                    let report = pipeline.run_batch(&mut graphs).unwrap();
                    black_box((graphs, report))
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_eliminate_common_inputs,
    bench_expand_and_fuse,
    bench_variadic_fixpoint,
    bench_pipeline,
);
criterion_main!(benches);
