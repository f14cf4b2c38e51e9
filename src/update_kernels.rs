// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

/// Offsets of the stencil entries along each axis, in grid units.
pub const STENCIL_OFFSETS: [isize; 4] = [-2, -1, 1, 2];

/// Neighborhood of one grid point, as seen by an update rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stencil<const N: usize> {
    /// The point being updated.
    pub point: [usize; N],
    /// Its current value.
    pub value: f64,
    /// Cost (right-hand side per unit length) at the point.
    pub cost: f64,
    /// Grid spacing.
    pub h: f64,
    /// Neighbor values per axis at offsets [`STENCIL_OFFSETS`]; `+inf` when
    /// missing (outside the domain, wall, or not reached yet).
    pub axes: [[f64; 4]; N],
}

/// Per-model local update. Implementations must be monotone in the neighbor
/// values and never produce NaN from finite or infinite inputs.
pub trait UpdateRule<const N: usize>: Send + Sync {
    /// Model name, for logging.
    fn name(&self) -> &str;

    /// New candidate value at the stencil point.
    fn update(&self, stencil: &Stencil<N>) -> f64;

    /// Descent direction of the value at the stencil point (towards the seeds),
    /// in grid units. Not normalized; zero when no neighbor is upwind.
    fn flow(&self, stencil: &Stencil<N>) -> [f64; N];

    /// Linearized distance of `offset` (grid units) under `cost`, and its
    /// gradient with respect to the offset.
    fn local_distance(&self, cost: f64, h: f64, offset: [f64; N]) -> (f64, [f64; N]);
}

/// Solve the Godunov upwind equation `sum_k w_k (u - v_k)_+^2 = rhs^2`.
///
/// `terms` holds `(v_k, w_k)` pairs and is sorted in place. Terms are added in
/// increasing order of value while they stay below the current solution.
pub fn godunov_update(terms: &mut [(f64, f64)], rhs: f64) -> f64 {
    terms.sort_by(|x, y| x.0.total_cmp(&y.0));

    let mut u = f64::INFINITY;
    let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
    for &(v, w) in terms.iter() {
        if !v.is_finite() || v >= u {
            break;
        }
        a += w;
        b += w * v;
        c += w * v * v;
        let disc = (b * b - a * (c - rhs * rhs)).max(0.0);
        u = (b + disc.sqrt()) / a;
    }
    u
}

/// Isotropic eikonal model `|grad u| = c`, first or second order upwind scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsotropicRule {
    order: usize,
}

impl IsotropicRule {
    /// A rule of the given scheme order (1 or 2).
    pub fn new(order: usize) -> Self {
        IsotropicRule { order }
    }

    /// Upwind term of one side: `(value, weight)`.
    #[inline]
    fn side_term(&self, near: f64, far: f64) -> (f64, f64) {
        if self.order == 2 && far.is_finite() && far <= near {
            ((4.0 * near - far) / 3.0, 2.25)
        } else {
            (near, 1.0)
        }
    }

    /// Upwind term of one axis and its side (-1 low, +1 high).
    #[inline]
    fn axis_term(&self, row: &[f64; 4]) -> (f64, f64, f64) {
        if row[1] <= row[2] {
            let (v, w) = self.side_term(row[1], row[0]);
            (v, w, -1.0)
        } else {
            let (v, w) = self.side_term(row[2], row[3]);
            (v, w, 1.0)
        }
    }
}

impl<const N: usize> UpdateRule<N> for IsotropicRule {
    fn name(&self) -> &str {
        "Isotropic"
    }

    fn update(&self, stencil: &Stencil<N>) -> f64 {
        let mut terms = [(f64::INFINITY, 1.0); N];
        for (term, row) in terms.iter_mut().zip(stencil.axes.iter()) {
            let (v, w, _) = self.axis_term(row);
            *term = (v, w);
        }
        godunov_update(&mut terms, stencil.cost * stencil.h)
    }

    fn flow(&self, stencil: &Stencil<N>) -> [f64; N] {
        let u = stencil.value;
        let mut flow = [0.0; N];
        if !u.is_finite() {
            return flow;
        }
        for (f, row) in flow.iter_mut().zip(stencil.axes.iter()) {
            let (v, w, dir) = self.axis_term(row);
            if v < u {
                *f = dir * w.sqrt() * (u - v) / stencil.h;
            }
        }
        flow
    }

    fn local_distance(&self, cost: f64, h: f64, offset: [f64; N]) -> (f64, [f64; N]) {
        let norm = offset.iter().map(|o| o * o).sum::<f64>().sqrt();
        let mut grad = [0.0; N];
        if norm > 0.0 {
            for (g, o) in grad.iter_mut().zip(offset.iter()) {
                *g = cost * h * o / norm;
            }
        }
        (cost * h * norm, grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_1_SQRT_2;

    const INF: f64 = f64::INFINITY;

    fn stencil<const N: usize>(axes: [[f64; 4]; N]) -> Stencil<N> {
        Stencil {
            point: [0; N],
            value: INF,
            cost: 1.0,
            h: 1.0,
            axes,
        }
    }

    #[test]
    fn godunov_2d_known_case() {
        // Both neighbors at 0, rhs = 1: u = sqrt(2)/2
        let u = godunov_update(&mut [(0.0, 1.0), (0.0, 1.0)], 1.0);
        assert!((u - FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn godunov_drops_far_terms() {
        // a=0, b=100: only the first term is active, u = 1
        let u = godunov_update(&mut [(100.0, 1.0), (0.0, 1.0)], 1.0);
        assert!((u - 1.0).abs() < 1e-12);
    }

    #[test]
    fn godunov_3d_known_case() {
        let u = godunov_update(&mut [(0.0, 1.0); 3], 1.0);
        assert!((u - 1.0 / 3.0_f64.sqrt()).abs() < 1e-12);

        // Third neighbor too high, falls back to the 2D solution
        let u = godunov_update(&mut [(0.0, 1.0), (0.0, 1.0), (100.0, 1.0)], 1.0);
        assert!((u - FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn godunov_all_infinite() {
        assert!(godunov_update(&mut [(INF, 1.0); 3], 1.0).is_infinite());
        assert!(godunov_update(&mut [], 1.0).is_infinite());
    }

    #[test]
    fn isotropic_picks_upwind_side() {
        let rule = IsotropicRule::new(1);
        // Axis 0: low=5, high=inf. Axis 1: nothing
        let s = stencil([[INF, 5.0, INF, INF], [INF, INF, INF, INF]]);
        assert!((UpdateRule::<2>::update(&rule, &s) - 6.0).abs() < 1e-12);

        let s = Stencil { cost: 2.0, h: 0.5, ..s };
        assert!((UpdateRule::<2>::update(&rule, &s) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn second_order_is_exact_on_linear_data() {
        // u(x) = x along axis 0, point at x = 2
        let rule = IsotropicRule::new(2);
        let s = stencil([[0.0, 1.0, 3.0, 4.0]]);
        assert!((UpdateRule::<1>::update(&rule, &s) - 2.0).abs() < 1e-12);

        // Far neighbor above the near one: falls back to first order
        let s = stencil([[1.5, 1.0, INF, INF]]);
        assert!((UpdateRule::<1>::update(&rule, &s) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn flow_points_downhill() {
        let rule = IsotropicRule::new(1);
        let s = Stencil {
            value: 2.0,
            ..stencil([[INF, 1.0, 3.0, INF], [INF, 3.0, 1.5, INF]])
        };
        let f = UpdateRule::<2>::flow(&rule, &s);
        assert!(f[0] < 0.0 && f[1] > 0.0);
        assert!((f[0] + 1.0).abs() < 1e-12);
        assert!((f[1] - 0.5).abs() < 1e-12);

        let flat = Stencil { value: 1.0, ..stencil([[INF, 1.0, 1.0, INF]]) };
        assert_eq!(UpdateRule::<1>::flow(&rule, &flat), [0.0]);
    }

    #[test]
    fn local_distance_is_euclidean() {
        let rule = IsotropicRule::new(1);
        let (d, g) = UpdateRule::<2>::local_distance(&rule, 2.0, 0.5, [3.0, 4.0]);
        assert!((d - 5.0).abs() < 1e-12);
        assert!((g[0] - 0.6).abs() < 1e-12 && (g[1] - 0.8).abs() < 1e-12);

        let (d, g) = UpdateRule::<2>::local_distance(&rule, 1.0, 1.0, [0.0, 0.0]);
        assert_eq!((d, g), (0.0, [0.0, 0.0]));
    }

    #[test]
    fn no_nan_produced() {
        let cases = [
            ([0.0, 0.0], 1.0),
            ([1.0, 1.0], 1.0),
            ([INF, 0.0], 1.0),
            ([INF, INF], 1.0),
            ([0.0, 0.0], 0.001),
            ([0.0, 0.0], 1000.0),
            ([0.0, 1e300], 1.0),
        ];
        for (vals, rhs) in cases {
            let mut terms = [(vals[0], 1.0), (vals[1], 1.0)];
            let u = godunov_update(&mut terms, rhs);
            assert!(!u.is_nan(), "NaN for godunov_update({:?}, {})", vals, rhs);
        }

        let rule = IsotropicRule::new(2);
        for row in [[INF; 4], [0.0, INF, 0.0, INF], [5.0, 1.0, 1.0, 5.0]] {
            let s = stencil([row; 3]);
            assert!(!UpdateRule::<3>::update(&rule, &s).is_nan());
            assert!(UpdateRule::<3>::flow(&rule, &s).iter().all(|f| !f.is_nan()));
        }
    }
}
