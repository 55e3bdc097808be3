// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use launch_graph::StateFlowGraph;
use launch_ir::{
    AsyncState, BinaryOp, BodyBuilder, ConstValue, IrBank, LaunchShape, StateSpace,
    TaskLaunchRecord,
};

/// Entry point for `launch_graph` wind-tunnel benchmarks.
///
/// The scenarios stress the shapes that dominate real pipelines: long
/// write/read chains, wide batches of compatible element-wise writers, the
/// transitive closure over layered DAG "cones", and the full
/// rebuild-and-sort cycle the optimization passes lean on.
fn bench_graph(c: &mut Criterion) {
    bench_insert_extract_chain(c);
    bench_fuse_wide_batches(c);
    bench_transitive_closure_cone(c);
    bench_rebuild_graph(c);
    bench_dead_store_sweep(c);
}

struct Bench {
    bank: Arc<IrBank>,
    space: Arc<StateSpace>,
}

impl Bench {
    fn new() -> Self {
        Self {
            bank: Arc::new(IrBank::new()),
            space: Arc::new(StateSpace::new()),
        }
    }

    fn graph(&self) -> StateFlowGraph {
        StateFlowGraph::new(Arc::clone(&self.bank), Arc::clone(&self.space))
    }

    fn chain_records(&self, len: usize) -> Vec<TaskLaunchRecord> {
        let states: Vec<AsyncState> = (0..=len)
            .map(|i| AsyncState::value(self.space.add_root(format!("chain{i}"))))
            .collect();
        (0..len)
            .map(|i| {
                let mut b = BodyBuilder::new(format!("link{i}"), LaunchShape::Serial);
                let v = b.load(states[i]);
                let one = b.constant(ConstValue::I64(1));
                let sum = b.binary(BinaryOp::Add, v, one);
                b.store(states[i + 1], sum);
                TaskLaunchRecord::new(self.bank.intern(b.finish().unwrap()))
            })
            .collect()
    }

    fn wide_writer_records(&self, count: usize) -> Vec<TaskLaunchRecord> {
        let s = AsyncState::value(self.space.add_root("accum"));
        (0..count)
            .map(|i| {
                let mut b = BodyBuilder::new(
                    format!("w{i}"),
                    LaunchShape::RangeFor { begin: 0, end: 1024 },
                )
                .element_wise(true);
                let c = b.constant(ConstValue::I64(i64::try_from(i).unwrap_or(i64::MAX)));
                b.store(s, c);
                TaskLaunchRecord::new(self.bank.intern(b.finish().unwrap()))
            })
            .collect()
    }

    /// A layered cone: `width` writers per layer, each layer reading the
    /// previous layer's states.
    fn cone_records(&self, layers: usize, width: usize) -> Vec<TaskLaunchRecord> {
        let mut records = Vec::with_capacity(layers * width);
        let mut prev: Vec<AsyncState> = (0..width)
            .map(|i| AsyncState::value(self.space.add_root(format!("l0_{i}"))))
            .collect();
        for layer in 1..=layers {
            let next: Vec<AsyncState> = (0..width)
                .map(|i| AsyncState::value(self.space.add_root(format!("l{layer}_{i}"))))
                .collect();
            for i in 0..width {
                let mut b =
                    BodyBuilder::new(format!("cone_{layer}_{i}"), LaunchShape::Serial);
                let a = b.load(prev[i]);
                let z = b.load(prev[(i + 1) % width]);
                let sum = b.binary(BinaryOp::Add, a, z);
                b.store(next[i], sum);
                records.push(TaskLaunchRecord::new(self.bank.intern(b.finish().unwrap())));
            }
            prev = next;
        }
        records
    }
}

fn bench_insert_extract_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_extract_chain");
    for len in [64_usize, 512] {
        let bench = Bench::new();
        let records = bench.chain_records(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                let mut g = bench.graph();
                g.insert_tasks(&records, false);
                black_box(g.extract_to_execute())
            });
        });
    }
    group.finish();
}

fn bench_fuse_wide_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("fuse_wide_batch");
    for count in [16_usize, 128] {
        let bench = Bench::new();
        let records = bench.wide_writer_records(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let mut g = bench.graph();
                g.insert_tasks(&records, false);
                black_box(g.fuse())
            });
        });
    }
    group.finish();
}

fn bench_transitive_closure_cone(c: &mut Criterion) {
    let mut group = c.benchmark_group("transitive_closure_cone");
    for (layers, width) in [(8_usize, 8_usize), (16, 16)] {
        let bench = Bench::new();
        let records = bench.cone_records(layers, width);
        let mut g = bench.graph();
        g.insert_tasks(&records, false);
        let n = g.num_pending_tasks();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{layers}x{width}")),
            &n,
            |b, &n| {
                b.iter(|| black_box(g.compute_transitive_closure(0, n)));
            },
        );
    }
    group.finish();
}

/// Performance probe for the rebuild-and-sort cycle every optimization
/// pass pays after a mutation.
fn bench_rebuild_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild_graph");
    for (layers, width) in [(8_usize, 8_usize), (16, 16)] {
        let bench = Bench::new();
        let records = bench.cone_records(layers, width);
        let mut g = bench.graph();
        g.insert_tasks(&records, false);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{layers}x{width}")),
            &(),
            |b, _| {
                b.iter(|| {
                    g.rebuild_graph(true);
                    black_box(g.num_pending_tasks())
                });
            },
        );
    }
    group.finish();
}

fn bench_dead_store_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("dead_store_sweep");
    for count in [64_usize, 256] {
        let bench = Bench::new();
        let scratch = bench.space.add_root("scratch");
        bench.space.set_host_visible(scratch, false).unwrap();
        let s = AsyncState::value(scratch);
        let records: Vec<TaskLaunchRecord> = (0..count)
            .map(|i| {
                let mut b = BodyBuilder::new(format!("dead{i}"), LaunchShape::Serial);
                let c = b.constant(ConstValue::I64(i64::try_from(i).unwrap_or(i64::MAX)));
                b.store(s, c);
                TaskLaunchRecord::new(bench.bank.intern(b.finish().unwrap()))
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let mut g = bench.graph();
                g.insert_tasks(&records, false);
                black_box(g.optimize_dead_store())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_graph);
criterion_main!(benches);
