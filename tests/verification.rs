// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use eikonal_agsi::{
    ActiveBlockBound, CostField, EikonalError, EikonalSolver, ModelDescriptor, Precision,
    ProblemInputs, SolveReport, SolverKind, SolverOptions,
};

fn solve<const N: usize>(
    shape: [usize; N],
    opts: &SolverOptions,
    inputs: &ProblemInputs<N>,
) -> (Vec<f64>, SolveReport) {
    let model = ModelDescriptor::isotropic(N).unwrap();
    let mut solver = EikonalSolver::new(model, shape, opts).unwrap();
    let report = solver.solve(inputs).unwrap();
    (solver.values().unwrap(), report)
}

fn max_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() || y.is_finite())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

fn blocked(block: Vec<usize>) -> SolverOptions {
    SolverOptions {
        block_shape: Some(block),
        threads: Some(4),
        ..Default::default()
    }
}

/// Deterministic heterogeneous cost in [0.5, 2.0].
fn wavy_cost(shape: [usize; 2]) -> Vec<f64> {
    (0..shape[0] * shape[1])
        .map(|flat| {
            let (i, j) = ((flat / shape[1]) as f64, (flat % shape[1]) as f64);
            1.25 + 0.75 * (0.3 * i).sin() * (0.2 * j).cos()
        })
        .collect()
}

/// Point source in a homogeneous medium: u(x) = |x - xs|.
/// The physical domain is fixed; first-order error should roughly halve with h.
#[test]
fn point_source_homogeneous_2d_convergence() {
    let domain_size = 128.0;

    let run = |n: usize| -> f64 {
        let h = domain_size / (n - 1) as f64;
        let opts = SolverOptions {
            spacing: h,
            threads: Some(4),
            ..Default::default()
        };
        let center = ((n - 1) / 2) as f64;
        let (values, report) = solve([n, n], &opts, &ProblemInputs::default().with_seed([center, center]));
        assert!(report.converged);

        let mut max_err = 0.0_f64;
        for i in 0..n {
            for j in 0..n {
                let dist = h * ((i as f64 - center).powi(2) + (j as f64 - center).powi(2)).sqrt();
                // Skip near-source nodes (within 3h)
                if dist > 3.0 * h {
                    max_err = max_err.max((values[i * n + j] - dist).abs());
                }
            }
        }
        max_err
    };

    let err_129 = run(129);
    let err_257 = run(257);
    let ratio = err_129 / err_257;
    assert!(
        ratio > 1.4 && ratio < 2.6,
        "convergence ratio = {} (errors: 129={}, 257={})",
        ratio,
        err_129,
        err_257
    );
}

#[test]
fn full_sweep_and_agsi_agree_on_heterogeneous_cost() {
    let shape = [40, 40];
    let inputs = ProblemInputs::default()
        .with_seed([5.0, 7.0])
        .with_cost(CostField::Values(wavy_cost(shape)));

    let agsi = blocked(vec![8, 8]);
    let global = SolverOptions {
        solver: SolverKind::GlobalIteration,
        ..blocked(vec![8, 8])
    };
    let (a, ra) = solve(shape, &agsi, &inputs);
    let (g, rg) = solve(shape, &global, &inputs);
    assert!(ra.converged && rg.converged);
    assert!(max_diff(&a, &g) < 1e-8, "diff = {}", max_diff(&a, &g));
    assert!(a.iter().all(|v| v.is_finite()));
}

#[test]
fn second_order_agrees_across_schedulers() {
    let shape = [64, 64];
    let inputs = ProblemInputs::default()
        .with_seed([5.0, 40.0])
        .with_seed([50.0, 10.0])
        .with_cost(CostField::Values(wavy_cost(shape)));
    let second = SolverOptions {
        order: 2,
        ..blocked(vec![8, 8])
    };
    let global = SolverOptions {
        solver: SolverKind::GlobalIteration,
        ..second.clone()
    };
    let bounded = SolverOptions {
        bound_active_blocks: ActiveBlockBound::Limit(2),
        ..second.clone()
    };
    let (a, ra) = solve(shape, &second, &inputs);
    let (g, rg) = solve(shape, &global, &inputs);
    let (b, rb) = solve(shape, &bounded, &inputs);
    assert!(ra.converged && rg.converged && rb.converged);
    assert!(max_diff(&a, &g) < 1e-6, "agsi: {}", max_diff(&a, &g));
    assert!(max_diff(&b, &g) < 1e-6, "bounded: {}", max_diff(&b, &g));

    // A second-order field is a fixed point of every schedule
    let model = ModelDescriptor::isotropic(2).unwrap();
    let mut solver = EikonalSolver::new(model, shape, &global).unwrap();
    solver.solve(&inputs).unwrap();
    assert_eq!(solver.resume().unwrap().niter_o, 0);

    let (first, _) = solve(shape, &blocked(vec![8, 8]), &inputs);
    assert!(max_diff(&first, &g) > 1e-3);
}

#[test]
fn periodic_axis_wraps_around() {
    let shape = [32, 8];
    let periodic = SolverOptions {
        periodic: Some(vec![true, false]),
        ..blocked(vec![8, 8])
    };
    let inputs = ProblemInputs::default().with_seed([1.0, 0.0]);
    let (a, report) = solve(shape, &periodic, &inputs);
    let (g, _) = solve(
        shape,
        &SolverOptions {
            solver: SolverKind::GlobalIteration,
            ..periodic.clone()
        },
        &inputs,
    );
    assert!(report.converged);
    assert!(max_diff(&a, &g) < 1e-12);
    for i in 0..32 {
        let expected = (i as f64 - 1.0).abs().min(32.0 - (i as f64 - 1.0).abs());
        assert!((a[i * 8] - expected).abs() < 1e-12, "row {}: {}", i, a[i * 8]);
    }

    let (open, _) = solve(shape, &blocked(vec![8, 8]), &inputs);
    assert_eq!(open[31 * 8], 30.0);
    assert_eq!(a[31 * 8], 2.0);
}

#[test]
fn small_grid_with_half_blocks() {
    // 2x2 blocks cannot pack the tag bitset
    let model = ModelDescriptor::isotropic(2).unwrap();
    let err = EikonalSolver::new(model, [4, 4], &blocked(vec![2, 2])).err().unwrap();
    assert!(matches!(err, EikonalError::BlockAlignment { .. }));

    let inputs = ProblemInputs::default().with_seed([0.0, 0.0]);
    let global = SolverOptions {
        solver: SolverKind::GlobalIteration,
        ..blocked(vec![2, 4])
    };
    let (a, _) = solve([4, 4], &blocked(vec![2, 4]), &inputs);
    let (g, _) = solve([4, 4], &global, &inputs);
    assert!(max_diff(&a, &g) < 1e-12);
    assert_eq!(a[0], 0.0);
    assert_eq!(a[3], 3.0);
    assert_eq!(a[12], 3.0);
    assert!((a[5] - (1.0 + 0.5f64.sqrt())).abs() < 1e-12);
}

#[test]
fn resolving_a_converged_field_is_idle() {
    let model = ModelDescriptor::isotropic(2).unwrap();
    for kind in [SolverKind::Agsi, SolverKind::GlobalIteration] {
        let opts = SolverOptions {
            solver: kind,
            ..blocked(vec![8, 8])
        };
        let mut solver = EikonalSolver::new(model, [32, 32], &opts).unwrap();
        let first = solver
            .solve(&ProblemInputs::default().with_seed([16.0, 3.0]))
            .unwrap();
        assert!(first.niter_o > 0);
        let before = solver.values().unwrap();
        let again = solver.resume().unwrap();
        assert_eq!(again.niter_o, 0, "{:?}", kind);
        assert_eq!(solver.values().unwrap(), before);
    }
}

#[test]
fn pruning_never_increases_block_updates() {
    let shape = [48, 48];
    let inputs = ProblemInputs::default()
        .with_seed([2.0, 40.0])
        .with_cost(CostField::Values(wavy_cost(shape)));
    let base = SolverOptions {
        count_updates: true,
        threads: Some(1),
        ..blocked(vec![8, 8])
    };
    let (plain, rp) = solve(shape, &SolverOptions { pruning: Some(false), ..base.clone() }, &inputs);
    let (pruned, rq) = solve(shape, &SolverOptions { pruning: Some(true), ..base }, &inputs);

    let total = |r: &SolveReport| r.block_updates.as_ref().unwrap().iter().map(|&c| c as u64).sum::<u64>();
    assert!(total(&rq) <= total(&rp), "{} > {}", total(&rq), total(&rp));
    assert!(rq.rounds.iter().any(|r| r.frozen_total > 0));
    assert!(max_diff(&plain, &pruned) < 1e-9);
}

#[test]
fn bounded_active_blocks_cap_considered_blocks() {
    let shape = [64, 64];
    let inputs = ProblemInputs::default()
        .with_seed([1.0, 1.0])
        .with_cost(CostField::Values(wavy_cost(shape)));
    let bounded = SolverOptions {
        bound_active_blocks: ActiveBlockBound::Limit(2),
        ..blocked(vec![8, 8])
    };
    let (b, report) = solve(shape, &bounded, &inputs);
    let (reference, _) = solve(shape, &blocked(vec![8, 8]), &inputs);

    assert!(report.converged);
    for round in report.rounds.iter().skip(1) {
        assert!(round.considered <= 4, "considered {}", round.considered);
    }
    assert!(report.rounds.iter().any(|r| r.deferred > 0));
    assert!(max_diff(&b, &reference) < 1e-8);
}

#[test]
fn auto_bound_runs_to_the_same_field() {
    let shape = [48, 48];
    let inputs = ProblemInputs::default().with_seed([40.0, 8.0]);
    let auto = SolverOptions {
        bound_active_blocks: ActiveBlockBound::Auto,
        ..blocked(vec![8, 8])
    };
    let (a, report) = solve(shape, &auto, &inputs);
    let (reference, _) = solve(shape, &blocked(vec![8, 8]), &inputs);
    assert!(report.converged);
    assert!(max_diff(&a, &reference) < 1e-8);
}

#[test]
fn multiprecision_improves_single_precision() {
    let shape = [64, 64];
    let inputs = ProblemInputs::default().with_seed([0.0, 0.0]);
    let (reference, _) = solve(shape, &blocked(vec![8, 8]), &inputs);

    let single = SolverOptions {
        precision: Precision::Single,
        tolerance: 0.0,
        ..blocked(vec![8, 8])
    };
    let multi = SolverOptions {
        multiprecision: true,
        ..single.clone()
    };
    let (s, _) = solve(shape, &single, &inputs);
    let (m, _) = solve(shape, &multi, &inputs);
    let err_single = max_diff(&s, &reference);
    let err_multi = max_diff(&m, &reference);
    assert!(err_single > 0.0);
    assert!(err_multi < err_single, "multi {} vs single {}", err_multi, err_single);
}

#[test]
fn factoring_recovers_euclidean_distance() {
    let shape = [24, 24];
    let seed = [10.0, 12.0];
    let opts = SolverOptions {
        factoring_radius: 100.0,
        ..blocked(vec![8, 8])
    };
    let (values, _) = solve(shape, &opts, &ProblemInputs::default().with_seed(seed));
    for i in 0..24 {
        for j in 0..24 {
            let exact = ((i as f64 - seed[0]).powi(2) + (j as f64 - seed[1]).powi(2)).sqrt();
            let got = values[i * 24 + j];
            assert!((got - exact).abs() < 1e-6, "({}, {}): {} vs {}", i, j, got, exact);
        }
    }

    // Without factoring the diagonal is overestimated
    let (plain, _) = solve(shape, &blocked(vec![8, 8]), &ProblemInputs::default().with_seed(seed));
    assert!(plain[20 * 24 + 22] > values[20 * 24 + 22] + 0.1);
}

#[test]
fn multiple_sources_take_the_minimum() {
    let inputs = ProblemInputs::default()
        .with_seed([0.0, 0.0])
        .with_seed([0.0, 20.0]);
    let (values, _) = solve([8, 32], &blocked(vec![8, 8]), &inputs);
    for j in 0..32 {
        let expected = (j as f64).min((20.0 - j as f64).abs());
        assert!((values[j] - expected).abs() < 1e-12, "column {}", j);
    }
}

#[test]
fn walls_force_a_detour() {
    let n = 32;
    let mut walls = vec![false; n * n];
    for j in 0..28 {
        walls[16 * n + j] = true;
    }
    let inputs = ProblemInputs::default()
        .with_seed([8.0, 4.0])
        .with_walls(walls);
    let (values, report) = solve([n, n], &blocked(vec![8, 8]), &inputs);
    assert!(report.converged);
    assert!(values[16 * n + 4].is_infinite());
    let behind = values[24 * n + 4];
    assert!(behind.is_finite());
    // Straight line is 16; the way around the wall is about 50
    assert!(behind > 45.0, "behind the wall: {}", behind);
}

#[test]
fn point_source_3d() {
    let n = 16;
    let opts = blocked(vec![4, 4, 4]);
    let inputs = ProblemInputs::default().with_seed([8.0, 8.0, 8.0]);
    let (a, report) = solve([n, n, n], &opts, &inputs);
    let (g, _) = solve(
        [n, n, n],
        &SolverOptions {
            solver: SolverKind::GlobalIteration,
            ..opts
        },
        &inputs,
    );
    assert!(report.converged);
    assert!(max_diff(&a, &g) < 1e-8);
    assert!(a.iter().all(|v| v.is_finite()));
    assert!((a[8 * n * n + 8 * n + 15] - 7.0).abs() < 1e-12);
    assert!((a[8 * n + 8] - 8.0).abs() < 1e-12);
}

#[test]
fn global_iteration_without_seeds_is_idle() {
    let opts = SolverOptions {
        solver: SolverKind::GlobalIteration,
        ..blocked(vec![8, 8])
    };
    let (values, report) = solve([16, 16], &opts, &ProblemInputs::default());
    assert_eq!(report.niter_o, 0);
    assert!(values.iter().all(|v| v.is_infinite()));

    let model = ModelDescriptor::isotropic(2).unwrap();
    let mut solver = EikonalSolver::new(model, [16, 16], &blocked(vec![8, 8])).unwrap();
    let err = solver.solve(&ProblemInputs::default()).err().unwrap();
    assert!(matches!(err, EikonalError::MissingSeeds));
}

#[test]
fn non_convergence_keeps_best_effort_field() {
    let model = ModelDescriptor::isotropic(2).unwrap();
    let opts = SolverOptions {
        nitermax_o: 1,
        raise_on_non_convergence: false,
        ..blocked(vec![8, 8])
    };
    let mut solver = EikonalSolver::new(model, [64, 64], &opts).unwrap();
    let report = solver
        .solve(&ProblemInputs::default().with_seed([0.0, 0.0]))
        .unwrap();
    assert!(!report.converged);
    assert_eq!(report.warnings.len(), 1);
    let values = solver.values().unwrap();
    assert_eq!(values[0], 0.0);
    assert!(values[63 * 64 + 63].is_infinite());
}
