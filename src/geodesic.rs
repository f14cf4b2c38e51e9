// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::VecDeque;

use rayon::prelude::*;

use crate::backend::Kernels;
use crate::config::{GeodesicConfig, SolverConfig};
use crate::core::{for_each_in_box, BlockGeometry};
use crate::error::{EikonalError, Result, SolverWarning};
use crate::kernel::gather_stencil;
use crate::problem::Problem;

/// Flow magnitudes below this are treated as zero.
const VANISHING_FLOW: f64 = 1e-12;

/// Termination state of a traced geodesic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeodesicStop {
    /// Still being integrated (or ran out of length budget).
    Continue,
    /// Reached the neighborhood of a seed.
    AtSeed,
    /// Hit a wall, an unreached region, or the domain boundary.
    InWall,
    /// The flow kept cancelling out.
    Stationary,
    /// Moved away from a seed it was approaching.
    PastSeed,
    /// The flow vanished or was undefined.
    VanishingFlow,
}

/// Traced paths and how each of them ended.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodesicReport<const N: usize> {
    /// One path per tip, from the tip towards the seeds, in grid coordinates.
    pub paths: Vec<Vec<[f64; N]>>,
    /// Termination state per tip.
    pub stops: Vec<GeodesicStop>,
    /// Integration rounds performed.
    pub rounds: usize,
    /// Recoverable conditions.
    pub warnings: Vec<SolverWarning>,
}

/// The `2^N` corners of the grid cell containing `x`, with multilinear
/// weights. `None` when `x` is outside the domain.
fn cell_corners<const N: usize>(g: &BlockGeometry<N>, x: [f64; N]) -> Option<Vec<([usize; N], f64)>> {
    if !g.contains(x) {
        return None;
    }
    let x = g.wrap(x);
    let shape = g.shape();
    let periodic = g.periodic();
    let mut base = [0usize; N];
    let mut t = [0.0; N];
    for d in 0..N {
        let mut i = x[d].floor();
        if !periodic[d] && i >= (shape[d] - 1) as f64 {
            i = (shape[d] - 2) as f64;
        }
        base[d] = i as usize;
        t[d] = x[d] - i;
    }

    let mut corners = Vec::with_capacity(1 << N);
    for mask in 0..(1usize << N) {
        let mut p = base;
        let mut w = 1.0;
        for d in 0..N {
            if (mask >> d) & 1 == 1 {
                p[d] = (base[d] + 1) % shape[d];
                w *= t[d];
            } else {
                w *= 1.0 - t[d];
            }
        }
        corners.push((p, w));
    }
    Some(corners)
}

/// Move `p` by `offset`, wrapping periodic axes.
fn shift<const N: usize>(g: &BlockGeometry<N>, p: [usize; N], offset: [isize; N]) -> Option<[usize; N]> {
    let mut q = p;
    for (axis, &o) in offset.iter().enumerate() {
        if o != 0 {
            q = g.offset_point(q, axis, o)?;
        }
    }
    Some(q)
}

/// Chamfer distance to the nearest seed point, saturated at a cap.
#[derive(Debug, Clone)]
pub struct ProximityMap<const N: usize> {
    geometry: BlockGeometry<N>,
    values: Vec<f64>,
    cap: f64,
}

impl<const N: usize> ProximityMap<N> {
    /// Dilate the seed points of `problem` by `ceil(cap)` parallel sweeps.
    pub fn new(problem: &Problem<N>, cap: f64, kernels: &Kernels<N>) -> Self {
        let g = problem.geometry();
        let n = g.num_points();

        let mut offsets = Vec::new();
        for_each_in_box([-1; N], [1; N], |o| {
            if o.iter().any(|&v| v != 0) {
                let len = o.iter().map(|&v| (v * v) as f64).sum::<f64>().sqrt();
                offsets.push((o, len));
            }
        });

        let mut dist: Vec<f64> = (0..n)
            .map(|flat| {
                let p = g.point_from_row_major(flat);
                if problem.is_tagged(p) && !problem.is_wall(p) {
                    0.0
                } else {
                    f64::INFINITY
                }
            })
            .collect();

        for _ in 0..cap.ceil() as usize {
            dist = kernels.install(|| {
                (0..n)
                    .into_par_iter()
                    .map(|flat| {
                        let p = g.point_from_row_major(flat);
                        offsets.iter().fold(dist[flat], |best, (o, len)| match shift(g, p, *o) {
                            Some(q) => best.min(dist[g.row_major_index(q)] + len),
                            None => best,
                        })
                    })
                    .collect()
            });
        }
        for v in dist.iter_mut() {
            *v = v.min(cap);
        }

        ProximityMap {
            geometry: g.clone(),
            values: dist,
            cap,
        }
    }

    /// Proximity at a grid point.
    pub fn at(&self, point: [usize; N]) -> f64 {
        self.values[self.geometry.row_major_index(point)]
    }

    /// Multilinear interpolation at a continuous coordinate; the cap outside the domain.
    pub fn sample(&self, x: [f64; N]) -> f64 {
        match cell_corners(&self.geometry, x) {
            Some(corners) => corners.iter().map(|(p, w)| w * self.at(*p)).sum(),
            None => self.cap,
        }
    }

    /// Saturation value.
    pub fn cap(&self) -> f64 {
        self.cap
    }
}

struct TipState<const N: usize> {
    path: Vec<[f64; N]>,
    stop: GeodesicStop,
    history: VecDeque<f64>,
    slow_steps: usize,
}

/// Backtracks minimal paths through a converged value field.
pub(crate) struct GeodesicTracer<'a, const N: usize> {
    settings: &'a GeodesicConfig,
    kernels: &'a Kernels<N>,
    problem: &'a Problem<N>,
    proximity: ProximityMap<N>,
    values: Vec<f64>,
    flow: Vec<[f64; N]>,
    orientation_axis: Option<usize>,
}

impl<'a, const N: usize> GeodesicTracer<'a, N> {
    pub(crate) fn new(config: &'a SolverConfig<N>, kernels: &'a Kernels<N>, problem: &'a Problem<N>) -> Self {
        let settings = &config.geodesic;
        let g = problem.geometry();
        let values = problem.values_row_major();
        let rule = kernels.rule();

        let flow: Vec<[f64; N]> = kernels.install(|| {
            (0..g.num_points())
                .into_par_iter()
                .map(|flat| {
                    let p = g.point_from_row_major(flat);
                    if problem.is_tagged(p) {
                        return [0.0; N];
                    }
                    let stencil = gather_stencil(g, p, values[flat], problem.cost_at(p), config.face_depth(), |q| {
                        values[g.row_major_index(q)]
                    });
                    let f = rule.flow(&stencil);
                    let norm = f.iter().map(|v| v * v).sum::<f64>().sqrt();
                    if norm > 0.0 && norm.is_finite() {
                        f.map(|v| v / norm)
                    } else {
                        [0.0; N]
                    }
                })
                .collect()
        });

        GeodesicTracer {
            settings,
            kernels,
            problem,
            proximity: ProximityMap::new(problem, settings.proximity_cap, kernels),
            values,
            flow,
            orientation_axis: config.model.orientation_axis(),
        }
    }

    /// Interpolated value at `x`; `+inf` if a weighted corner is unreached.
    fn value_at(&self, x: [f64; N]) -> f64 {
        let g = self.problem.geometry();
        let Some(corners) = cell_corners(g, x) else {
            return f64::INFINITY;
        };
        corners
            .iter()
            .filter(|(_, w)| *w > 0.0)
            .map(|(p, w)| w * self.values[g.row_major_index(*p)])
            .sum()
    }

    /// Interpolated flow at `x`, or the stop it runs into.
    fn flow_at(&self, x: [f64; N]) -> std::result::Result<[f64; N], GeodesicStop> {
        let g = self.problem.geometry();
        let corners = cell_corners(g, x).ok_or(GeodesicStop::InWall)?;
        let mut flow = [0.0; N];
        for (p, w) in corners {
            if w <= 0.0 {
                continue;
            }
            let flat = g.row_major_index(p);
            if self.problem.is_wall(p) || !self.values[flat].is_finite() {
                return Err(GeodesicStop::InWall);
            }
            for (f, c) in flow.iter_mut().zip(self.flow[flat].iter()) {
                *f += w * c;
            }
        }
        if flow.iter().any(|f| !f.is_finite()) {
            return Err(GeodesicStop::VanishingFlow);
        }
        Ok(flow)
    }

    /// Termination checks before a step; returns the flow to follow.
    fn check(&self, tip: &mut TipState<N>, x: [f64; N]) -> std::result::Result<[f64; N], GeodesicStop> {
        if !self.problem.geometry().contains(x) {
            return Err(GeodesicStop::InWall);
        }
        let proximity = self.proximity.sample(x);
        if proximity <= self.settings.target_tolerance {
            return Err(GeodesicStop::AtSeed);
        }
        let flow = self.flow_at(x)?;
        let norm = flow.iter().map(|f| f * f).sum::<f64>().sqrt();
        if norm < VANISHING_FLOW {
            return Err(GeodesicStop::VanishingFlow);
        }

        if norm < self.settings.stationary_threshold {
            tip.slow_steps += 1;
            if tip.slow_steps >= self.settings.stationary_delay {
                return Err(GeodesicStop::Stationary);
            }
        } else {
            tip.slow_steps = 0;
        }

        let delay = self.settings.past_seed_delay;
        if tip.history.len() == delay {
            let earlier = tip.history.front().copied().unwrap_or(f64::INFINITY);
            if proximity < self.proximity.cap() && proximity > earlier {
                return Err(GeodesicStop::PastSeed);
            }
            tip.history.pop_front();
        }
        tip.history.push_back(proximity);
        Ok(flow)
    }

    /// Advance one tip by at most `typical_length` midpoint steps.
    fn advance(&self, tip: &mut TipState<N>) {
        let g = self.problem.geometry();
        let step = self.settings.step;
        for _ in 0..self.settings.typical_length {
            if tip.path.len() >= self.settings.max_length {
                return;
            }
            let Some(&x) = tip.path.last() else {
                return;
            };
            let k1 = match self.check(tip, x) {
                Ok(f) => normalized(f),
                Err(stop) => {
                    tip.stop = stop;
                    return;
                }
            };
            let mut mid = x;
            for d in 0..N {
                mid[d] += 0.5 * step * k1[d];
            }
            let k2 = match self.flow_at(mid) {
                Ok(f) if f.iter().map(|v| v * v).sum::<f64>() > VANISHING_FLOW * VANISHING_FLOW => normalized(f),
                _ => k1,
            };
            let mut next = x;
            for d in 0..N {
                next[d] += step * k2[d];
            }
            tip.path.push(g.wrap(next));
        }
    }

    /// Trace geodesics from oriented tips.
    pub(crate) fn trace(&self, tips: &[[f64; N]]) -> Result<GeodesicReport<N>> {
        let g = self.problem.geometry();
        for tip in tips {
            if !g.contains(*tip) {
                return Err(EikonalError::InvalidTip {
                    coord: tip.to_vec(),
                    reason: "outside the domain".to_string(),
                });
            }
        }

        let mut states: Vec<TipState<N>> = tips
            .iter()
            .map(|&x| TipState {
                path: vec![g.wrap(x)],
                stop: GeodesicStop::Continue,
                history: VecDeque::with_capacity(self.settings.past_seed_delay + 1),
                slow_steps: 0,
            })
            .collect();

        let mut rounds = 0;
        while rounds < self.settings.max_rounds()
            && states.iter().any(|s| s.stop == GeodesicStop::Continue)
        {
            self.kernels.install(|| {
                states
                    .par_iter_mut()
                    .filter(|s| s.stop == GeodesicStop::Continue)
                    .for_each(|s| self.advance(s));
            });
            rounds += 1;
            tracing::debug!(
                round = rounds,
                running = states.iter().filter(|s| s.stop == GeodesicStop::Continue).count(),
                "geodesic round"
            );
        }

        let mut warnings = Vec::new();
        let unfinished: Vec<usize> = states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.stop == GeodesicStop::Continue)
            .map(|(i, _)| i)
            .collect();
        if !unfinished.is_empty() {
            let warning = SolverWarning::GeodesicLengthExceeded {
                tips: unfinished,
                max_length: self.settings.max_length,
            };
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }

        Ok(GeodesicReport {
            stops: states.iter().map(|s| s.stop).collect(),
            paths: states.into_iter().map(|s| s.path).collect(),
            rounds,
            warnings,
        })
    }

    /// Trace geodesics from position-only tips of curvature models, starting
    /// each at the orientation of smallest value.
    pub(crate) fn trace_unoriented(&self, tips: &[Vec<f64>]) -> Result<GeodesicReport<N>> {
        let Some(axis) = self.orientation_axis else {
            return Err(EikonalError::InvalidTip {
                coord: tips.first().cloned().unwrap_or_default(),
                reason: "unoriented tips need a curvature model".to_string(),
            });
        };
        let angles = self.problem.geometry().shape()[axis];
        let mut oriented = Vec::with_capacity(tips.len());
        for position in tips {
            if position.len() + 1 != N {
                return Err(EikonalError::InvalidTip {
                    coord: position.clone(),
                    reason: format!("expected {} coordinates", N - 1),
                });
            }
            let mut best = ([0.0; N], f64::INFINITY);
            for j in 0..angles {
                let mut x = [0.0; N];
                let mut coords = position.iter();
                for (d, v) in x.iter_mut().enumerate() {
                    *v = if d == axis { j as f64 } else { coords.next().copied().unwrap_or(0.0) };
                }
                let value = self.value_at(x);
                if j == 0 || value < best.1 {
                    best = (x, value);
                }
            }
            oriented.push(best.0);
        }
        self.trace(&oriented)
    }
}

fn normalized<const N: usize>(v: [f64; N]) -> [f64; N] {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.map(|x| x / norm)
    } else {
        v
    }
}
