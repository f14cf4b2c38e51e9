// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use eikonal_agsi::{
    ActiveBlockBound, EikonalSolver, ModelDescriptor, ProblemInputs, SolverKind, SolverOptions,
};

fn make_solver<const N: usize>(n: usize, opts: SolverOptions) -> (EikonalSolver<N>, ProblemInputs<N>) {
    let model = ModelDescriptor::isotropic(N).unwrap();
    let solver = EikonalSolver::new(model, [n; N], &opts).unwrap();
    let inputs = ProblemInputs::default().with_seed([(n / 2) as f64; N]);
    (solver, inputs)
}

fn threads(t: usize) -> SolverOptions {
    SolverOptions {
        threads: Some(t),
        ..Default::default()
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Single-thread baseline: 512^2 homogeneous, 1 thread.
fn bench_single_thread_2d(c: &mut Criterion) {
    c.bench_function("2d_512x512_1thread", |b| {
        b.iter_with_setup(
            || make_solver::<2>(512, threads(1)),
            |(mut solver, inputs)| black_box(solver.solve(&inputs).unwrap()),
        );
    });
}

/// Thread scaling: 1024^2 homogeneous with varying thread counts.
fn bench_thread_scaling_2d(c: &mut Criterion) {
    let cpus = num_cpus();
    let mut group = c.benchmark_group("thread_scaling_1024x1024");
    for &t in &[1, 2, 4, 8] {
        if t <= cpus {
            group.bench_function(format!("{}threads", t), |b| {
                b.iter_with_setup(
                    || make_solver::<2>(1024, threads(t)),
                    |(mut solver, inputs)| black_box(solver.solve(&inputs).unwrap()),
                );
            });
        }
    }
    group.finish();
}

/// Scheduler variants on the same 512^2 problem.
fn bench_schedulers(c: &mut Criterion) {
    let cpus = num_cpus();
    let variants = [
        ("agsi", threads(cpus)),
        (
            "agsi_pruned",
            SolverOptions {
                pruning: Some(true),
                ..threads(cpus)
            },
        ),
        (
            "agsi_bounded_auto",
            SolverOptions {
                bound_active_blocks: ActiveBlockBound::Auto,
                ..threads(cpus)
            },
        ),
        (
            "global_iteration",
            SolverOptions {
                solver: SolverKind::GlobalIteration,
                ..threads(cpus)
            },
        ),
    ];
    let mut group = c.benchmark_group("schedulers_512x512");
    group.sample_size(10);
    for (name, opts) in variants {
        group.bench_function(name, |b| {
            b.iter_with_setup(
                || make_solver::<2>(512, opts.clone()),
                |(mut solver, inputs)| black_box(solver.solve(&inputs).unwrap()),
            );
        });
    }
    group.finish();
}

/// 3D: 128^3 homogeneous, 1 thread and all cores.
fn bench_3d_scaling(c: &mut Criterion) {
    let cpus = num_cpus();
    let mut group = c.benchmark_group("3d_128x128x128");
    group.sample_size(10);
    let mut counts = vec![1, cpus];
    counts.dedup();
    for t in counts {
        group.bench_function(format!("{}threads", t), |b| {
            b.iter_with_setup(
                || make_solver::<3>(128, threads(t)),
                |(mut solver, inputs)| black_box(solver.solve(&inputs).unwrap()),
            );
        });
    }
    group.finish();
}

/// Geodesic backtracking from the corners of a solved 512^2 grid.
fn bench_geodesics(c: &mut Criterion) {
    let (mut solver, inputs) = make_solver::<2>(512, threads(num_cpus()));
    solver.solve(&inputs).unwrap();
    let tips = [[0.0, 0.0], [0.0, 511.0], [511.0, 0.0], [511.0, 511.0]];
    c.bench_function("geodesics_512x512_4tips", |b| {
        b.iter(|| black_box(solver.trace(&tips).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_single_thread_2d,
    bench_thread_scaling_2d,
    bench_schedulers,
    bench_3d_scaling,
    bench_geodesics,
);
criterion_main!(benches);
