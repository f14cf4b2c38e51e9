// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::time::{Duration, Instant};

use crate::backend::Kernels;
use crate::config::{SolverConfig, SolverKind};
use crate::error::{EikonalError, Result, SolverWarning};
use crate::field::ValueField;
use crate::kernel::{Activation, BlockOutcome, UpdateArgs};
use crate::problem::Problem;

/// Scheduling state of a block between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Nothing pending.
    Inactive,
    /// In the worklist of the next round.
    Active,
    /// Provably final; never reconsidered.
    Frozen,
}

/// Statistics of one outer round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundStats {
    /// Blocks processed this round.
    pub considered: usize,
    /// Active blocks held back by the active-block bound.
    pub deferred: usize,
    /// Processed blocks that changed.
    pub changed: usize,
    /// Frozen blocks after this round.
    pub frozen_total: usize,
    /// Causality window `(prev, next)` used for selection, if any.
    pub thresholds: Option<(f64, f64)>,
}

/// Result of a scheduler run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleReport {
    /// Index of the round after which nothing remained to do.
    pub niter_o: usize,
    /// False when the outer iteration cap was reached.
    pub converged: bool,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Per-round statistics.
    pub rounds: Vec<RoundStats>,
    /// Number of visits per block, when counting is enabled.
    pub block_updates: Option<Vec<u32>>,
    /// Recoverable conditions.
    pub warnings: Vec<SolverWarning>,
}

/// Window of causality keys considered under the active-block bound.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CausalityWindow {
    prev: f64,
    next: f64,
    delta: f64,
}

/// Outer iteration loop over kernel launches.
pub(crate) struct UpdateScheduler<'a, const N: usize> {
    config: &'a SolverConfig<N>,
    kernels: &'a Kernels<N>,
}

impl<'a, const N: usize> UpdateScheduler<'a, N> {
    pub(crate) fn new(config: &'a SolverConfig<N>, kernels: &'a Kernels<N>) -> Self {
        UpdateScheduler { config, kernels }
    }

    /// Iterate until no block has work left, updating `problem`'s value field in place.
    ///
    /// # Errors
    /// Returns [`EikonalError::NonConvergence`] when the outer iteration cap is
    /// reached and the configuration asks to raise.
    pub(crate) fn run(&self, problem: &mut Problem<N>) -> Result<ScheduleReport> {
        match self.config.solver {
            SolverKind::GlobalIteration => self.run_full_sweep(problem),
            SolverKind::Agsi => self.run_adaptive(problem),
        }
    }

    fn launch(
        &self,
        problem: &Problem<N>,
        back: Option<&ValueField>,
        worklist: &[usize],
        activation: Option<&Activation>,
    ) -> Vec<BlockOutcome> {
        let args = UpdateArgs {
            geometry: &problem.geometry,
            rule: self.kernels.rule(),
            read: &problem.values,
            write: back.unwrap_or(&problem.values),
            cost: &problem.cost,
            tags: &problem.tags,
            factoring: problem.factoring.as_ref(),
            depth: self.config.face_depth(),
            monotone: self.config.monotone(),
            track_min_change: self.config.track_min_change,
            niter_i: self.config.niter_i,
            tolerance: self.config.tolerance,
            strict: back.is_some(),
        };
        self.kernels.launch_update(worklist, &args, activation)
    }

    /// Swap the buffers and bring the processed blocks of the new back buffer up to date.
    fn swap_buffers(problem: &mut Problem<N>, back: &mut ValueField, processed: &[usize]) {
        std::mem::swap(&mut problem.values, back);
        let size_i = problem.geometry.size_i();
        for &b in processed {
            back.copy_range_from(&problem.values, b * size_i..(b + 1) * size_i);
        }
    }

    fn run_full_sweep(&self, problem: &mut Problem<N>) -> Result<ScheduleReport> {
        let start = Instant::now();
        let size_o = problem.geometry.size_o();
        let all: Vec<usize> = (0..size_o).collect();
        let mut back = problem.values.clone();
        let mut counts = self.config.count_updates.then(|| vec![0u32; size_o]);
        let mut rounds = Vec::new();

        for niter in 0..self.config.nitermax_o {
            let outcomes = self.launch(problem, Some(&back), &all, None);
            Self::swap_buffers(problem, &mut back, &all);

            let changed = outcomes.iter().filter(|o| o.changed).count();
            if let Some(c) = counts.as_mut() {
                c.iter_mut().for_each(|n| *n += 1);
            }
            rounds.push(RoundStats {
                considered: size_o,
                deferred: 0,
                changed,
                frozen_total: 0,
                thresholds: None,
            });
            tracing::debug!(round = niter, changed, "full sweep");

            if changed == 0 {
                return Ok(self.finish(niter, true, start, rounds, counts));
            }
        }
        self.not_converged(start, rounds, counts)
    }

    fn run_adaptive(&self, problem: &mut Problem<N>) -> Result<ScheduleReport> {
        let start = Instant::now();
        let size_o = problem.geometry.size_o();
        let mut back = self.config.strict.then(|| problem.values.clone());
        let mut counts = self.config.count_updates.then(|| vec![0u32; size_o]);
        let mut rounds = Vec::new();

        let mut state = vec![BlockState::Inactive; size_o];
        let mut keys = vec![f64::INFINITY; size_o];
        let mut last_max = vec![f64::INFINITY; size_o];
        let mut frozen_total = 0;
        let mut worklist = problem.initial_blocks.clone();
        for &b in &worklist {
            state[b] = BlockState::Active;
            keys[b] = f64::NEG_INFINITY;
        }

        let activation = Activation::new(size_o);
        let h = problem.geometry.spacing();
        let margin = if problem.factoring.is_some() {
            4.0 * problem.max_cost * h
        } else {
            0.0
        };
        let min_delta = self
            .config
            .bound_adjustment
            .min_delta
            .unwrap_or(h * problem.min_cost);
        let mut window: Option<CausalityWindow> = None;

        if worklist.is_empty() {
            return Ok(self.finish(0, true, start, rounds, counts));
        }

        for niter in 0..self.config.nitermax_o {
            let (considered, deferred) = self.select(&worklist, &keys, window);
            let outcomes = self.launch(problem, back.as_ref(), &considered, Some(&activation));
            if let Some(back) = back.as_mut() {
                Self::swap_buffers(problem, back, &considered);
            }

            let mut changed = 0;
            for o in &outcomes {
                state[o.block] = BlockState::Inactive;
                keys[o.block] = f64::INFINITY;
                last_max[o.block] = o.max_value;
                changed += usize::from(o.changed);
                if let Some(c) = counts.as_mut() {
                    c[o.block] += 1;
                }
            }

            let mut next = deferred.clone();
            for (b, key) in activation.drain() {
                match state[b] {
                    BlockState::Frozen => {}
                    BlockState::Active => keys[b] = keys[b].min(key),
                    BlockState::Inactive => {
                        state[b] = BlockState::Active;
                        keys[b] = key;
                        next.push(b);
                    }
                }
            }
            next.sort_unstable();
            next.dedup();

            if self.config.pruning && !next.is_empty() {
                let thres = next.iter().map(|&b| keys[b]).fold(f64::INFINITY, f64::min) - margin;
                for b in 0..size_o {
                    if state[b] != BlockState::Frozen && last_max[b] < thres {
                        state[b] = BlockState::Frozen;
                        frozen_total += 1;
                    }
                }
                next.retain(|&b| state[b] == BlockState::Active);
            }

            rounds.push(RoundStats {
                considered: considered.len(),
                deferred: deferred.len(),
                changed,
                frozen_total,
                thresholds: window.map(|w| (w.prev, w.next)),
            });
            tracing::debug!(
                round = niter,
                considered = considered.len(),
                deferred = deferred.len(),
                changed,
                frozen = frozen_total,
                "adaptive round"
            );

            if next.is_empty() {
                return Ok(self.finish(niter, true, start, rounds, counts));
            }
            if let Some(bound) = self.config.bound {
                window = self.adjust_window(window, &next, &keys, bound, considered.len(), min_delta);
            }
            worklist = next;
        }
        self.not_converged(start, rounds, counts)
    }

    /// Split the worklist into blocks processed this round and blocks deferred.
    fn select(
        &self,
        worklist: &[usize],
        keys: &[f64],
        window: Option<CausalityWindow>,
    ) -> (Vec<usize>, Vec<usize>) {
        let (Some(bound), Some(window)) = (self.config.bound, window) else {
            return (worklist.to_vec(), Vec::new());
        };
        let cap = (bound as f64 * self.config.bound_adjustment.max_factor).ceil() as usize;

        let mut by_key = worklist.to_vec();
        by_key.sort_by(|&a, &b| keys[a].total_cmp(&keys[b]).then(a.cmp(&b)));
        let eligible = by_key.iter().take_while(|&&b| keys[b] <= window.next).count();
        let take = if eligible == 0 { bound } else { eligible.min(cap) };

        let mut considered: Vec<usize> = by_key.iter().take(take).copied().collect();
        let mut deferred: Vec<usize> = by_key.iter().skip(take).copied().collect();
        considered.sort_unstable();
        deferred.sort_unstable();
        (considered, deferred)
    }

    /// Move the causality window after a round that processed `considered` blocks.
    fn adjust_window(
        &self,
        window: Option<CausalityWindow>,
        next: &[usize],
        keys: &[f64],
        bound: usize,
        considered: usize,
        min_delta: f64,
    ) -> Option<CausalityWindow> {
        let min_key = next.iter().map(|&b| keys[b]).fold(f64::INFINITY, f64::min);
        if !min_key.is_finite() {
            return window;
        }
        let adj = &self.config.bound_adjustment;
        let delta = match window {
            None => {
                let max_key = next
                    .iter()
                    .map(|&b| keys[b])
                    .filter(|k| k.is_finite())
                    .fold(min_key, f64::max);
                let share = (bound as f64 / next.len() as f64).min(1.0);
                ((max_key - min_key) * share).max(min_delta)
            }
            Some(w) => {
                let factor = (bound as f64 / considered.max(1) as f64).clamp(adj.min_factor, adj.max_factor);
                (w.delta * factor).max(min_delta)
            }
        };
        Some(CausalityWindow {
            prev: min_key,
            next: min_key + delta,
            delta,
        })
    }

    fn finish(
        &self,
        niter_o: usize,
        converged: bool,
        start: Instant,
        rounds: Vec<RoundStats>,
        block_updates: Option<Vec<u32>>,
    ) -> ScheduleReport {
        let elapsed = start.elapsed();
        if converged {
            tracing::info!(niter_o, elapsed_ms = elapsed.as_millis() as u64, "solver converged");
        }
        ScheduleReport {
            niter_o,
            converged,
            elapsed,
            rounds,
            block_updates,
            warnings: Vec::new(),
        }
    }

    fn not_converged(
        &self,
        start: Instant,
        rounds: Vec<RoundStats>,
        counts: Option<Vec<u32>>,
    ) -> Result<ScheduleReport> {
        let nitermax_o = self.config.nitermax_o;
        if self.config.raise_on_non_convergence {
            return Err(EikonalError::NonConvergence { nitermax_o });
        }
        let warning = SolverWarning::NonConvergence { nitermax_o };
        tracing::warn!("{}", warning);
        let mut report = self.finish(nitermax_o, false, start, rounds, counts);
        report.warnings.push(warning);
        Ok(report)
    }
}
