// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the partitioner.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use delegate_partitioner::{partition, DelegateBackend, ReferenceDelegate};
use graph_ir::{Graph, GraphBuilder, OpKind, TensorType};
use tensor_core::{DType, Shape};

/// A chain of `len` unary ops where every `stride`-th node is `neg`.
fn chain(len: usize, stride: usize) -> Graph {
    let mut b = GraphBuilder::new("chain");
    let mut v = b.input(TensorType::new(DType::F32, Shape::vector(16)));
    for i in 0..len {
        v = if i % stride == stride - 1 {
            b.neg(&v).unwrap()
        } else {
            b.abs(&v).unwrap()
        };
    }
    b.finish(&[v]).unwrap()
}

fn bench_full_capture(c: &mut Criterion) {
    let backend = ReferenceDelegate::portable();
    let mut group = c.benchmark_group("partition_full_capture");
    for len in [16, 64, 256] {
        let graph = chain(len, usize::MAX);
        group.bench_with_input(BenchmarkId::from_parameter(len), &graph, |bench, g| {
            bench.iter(|| partition(black_box(g.clone()), &[&backend as &dyn DelegateBackend]).unwrap())
        });
    }
    group.finish();
}

fn bench_fragmented(c: &mut Criterion) {
    let backend = ReferenceDelegate::new("abs-only", [OpKind::Abs]);
    let graph = chain(128, 4);
    c.bench_function("partition_fragmented_128", |bench| {
        bench.iter(|| partition(black_box(graph.clone()), &[&backend as &dyn DelegateBackend]).unwrap())
    });
}

criterion_group!(benches, bench_full_capture, bench_fragmented);
criterion_main!(benches);
