// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::bitset::BlockBitset;
use crate::config::{SolverConfig, SolverKind};
use crate::core::{for_each_in_box, BlockGeometry};
use crate::error::{EikonalError, Result};
use crate::field::{Encoding, ValueField};
use crate::update_kernels::UpdateRule;

/// A point source. Coordinates are continuous grid coordinates (index units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed<const N: usize> {
    /// Location of the seed.
    pub point: [f64; N],
    /// Value at the seed.
    pub value: f64,
    /// Optional gradient of the value at the seed, per grid unit.
    pub gradient: Option<[f64; N]>,
}

impl<const N: usize> Seed<N> {
    /// A seed of value 0 at `point`.
    pub fn new(point: [f64; N]) -> Self {
        Seed {
            point,
            value: 0.0,
            gradient: None,
        }
    }

    /// Set the seed value (builder method).
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    /// Set the seed gradient (builder method).
    pub fn with_gradient(mut self, gradient: [f64; N]) -> Self {
        self.gradient = Some(gradient);
        self
    }
}

/// Cost per unit length. Infinite values mark walls.
#[derive(Debug, Clone, PartialEq)]
pub enum CostField {
    /// The same cost everywhere.
    Uniform(f64),
    /// One value per grid point, row-major.
    Values(Vec<f64>),
}

/// Everything that defines a problem on a given grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemInputs<const N: usize> {
    /// Oriented seeds.
    pub seeds: Vec<Seed<N>>,
    /// Position-only seeds of curvature models (`N - 1` coordinates each),
    /// expanded to every angular position.
    pub unoriented_seeds: Vec<Vec<f64>>,
    /// Radius (grid units) over which seed values are spread; 0 hard-assigns
    /// each seed to its nearest grid point.
    pub seed_radius: f64,
    /// Cost field.
    pub cost: CostField,
    /// Forbidden points, row-major.
    pub walls: Option<Vec<bool>>,
    /// Extra points whose blocks start active without being seeded.
    pub trigger: Vec<[usize; N]>,
    /// Warm-start values, row-major.
    pub initial_values: Option<Vec<f64>>,
}

impl<const N: usize> Default for ProblemInputs<N> {
    fn default() -> Self {
        ProblemInputs {
            seeds: Vec::new(),
            unoriented_seeds: Vec::new(),
            seed_radius: 0.0,
            cost: CostField::Uniform(1.0),
            walls: None,
            trigger: Vec::new(),
            initial_values: None,
        }
    }
}

impl<const N: usize> ProblemInputs<N> {
    /// Add a zero-valued seed (builder method).
    pub fn with_seed(mut self, point: [f64; N]) -> Self {
        self.seeds.push(Seed::new(point));
        self
    }

    /// Add a position-only seed (builder method).
    pub fn with_unoriented_seed(mut self, position: Vec<f64>) -> Self {
        self.unoriented_seeds.push(position);
        self
    }

    /// Set the cost field (builder method).
    pub fn with_cost(mut self, cost: CostField) -> Self {
        self.cost = cost;
        self
    }

    /// Set the seed spreading radius (builder method).
    pub fn with_seed_radius(mut self, radius: f64) -> Self {
        self.seed_radius = radius;
        self
    }

    /// Set the wall mask (builder method).
    pub fn with_walls(mut self, walls: Vec<bool>) -> Self {
        self.walls = Some(walls);
        self
    }

    /// Add a trigger point (builder method).
    pub fn with_trigger(mut self, point: [usize; N]) -> Self {
        self.trigger.push(point);
        self
    }

    /// Set warm-start values (builder method).
    pub fn with_initial_values(mut self, values: Vec<f64>) -> Self {
        self.initial_values = Some(values);
        self
    }
}

/// Origin of the additive factoring around one seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorOrigin<const N: usize> {
    /// Seed location.
    pub x: [f64; N],
    /// Cost at the seed.
    pub cost: f64,
}

impl<const N: usize> FactorOrigin<N> {
    /// Offset from the origin to `point`, taking the shortest way around periodic axes.
    pub(crate) fn offset(&self, geometry: &BlockGeometry<N>, point: [usize; N]) -> [f64; N] {
        let shape = geometry.shape();
        let periodic = geometry.periodic();
        let mut o = [0.0; N];
        for d in 0..N {
            o[d] = point[d] as f64 - self.x[d];
            if periodic[d] {
                let n = shape[d] as f64;
                o[d] -= n * (o[d] / n).round();
            }
        }
        o
    }
}

/// Per-point assignment of the nearest factoring origin within the radius.
#[derive(Debug, Clone, PartialEq)]
pub struct Factoring<const N: usize> {
    origins: Vec<FactorOrigin<N>>,
    assignment: Vec<u32>,
}

const UNASSIGNED: u32 = u32::MAX;

impl<const N: usize> Factoring<N> {
    /// Factoring around the given points, over a block-expanded cost field.
    pub(crate) fn around(geometry: &BlockGeometry<N>, points: &[[f64; N]], cost: &[f64], radius: f64) -> Self {
        let mut origins = Vec::with_capacity(points.len());
        let mut assignment = vec![UNASSIGNED; geometry.expanded_len()];
        let mut best = vec![f64::INFINITY; geometry.expanded_len()];
        let reach = radius.ceil() as isize;

        for &x in points {
            let c = cost[geometry.expanded_index(geometry.nearest_point(x))];
            if !c.is_finite() {
                continue;
            }
            let origin = FactorOrigin { x, cost: c };
            let id = origins.len() as u32;
            let center = geometry.nearest_point(x);
            let mut lo = [0isize; N];
            let mut hi = [0isize; N];
            for d in 0..N {
                lo[d] = center[d] as isize - reach;
                hi[d] = center[d] as isize + reach;
            }
            for_each_in_box(lo, hi, |q| {
                let Some(p) = wrap_point(geometry, q) else {
                    return;
                };
                let e = geometry.expanded_index(p);
                let o = origin.offset(geometry, p);
                let dist = o.iter().map(|v| v * v).sum::<f64>().sqrt();
                if dist <= radius && dist < best[e] {
                    best[e] = dist;
                    assignment[e] = id;
                }
            });
            origins.push(origin);
        }

        Factoring { origins, assignment }
    }

    /// The origin factoring a block-expanded slot, if any.
    #[inline]
    pub(crate) fn origin_of(&self, slot: usize) -> Option<&FactorOrigin<N>> {
        match self.assignment[slot] {
            UNASSIGNED => None,
            id => self.origins.get(id as usize),
        }
    }

    /// Factoring origins.
    pub fn origins(&self) -> &[FactorOrigin<N>] {
        &self.origins
    }
}

/// Map a signed point onto the grid, wrapping periodic axes.
fn wrap_point<const N: usize>(geometry: &BlockGeometry<N>, q: [isize; N]) -> Option<[usize; N]> {
    let shape = geometry.shape();
    let periodic = geometry.periodic();
    let mut p = [0usize; N];
    for d in 0..N {
        let n = shape[d] as isize;
        let v = if periodic[d] { q[d].rem_euclid(n) } else { q[d] };
        if v < 0 || v >= n {
            return None;
        }
        p[d] = v as usize;
    }
    Some(p)
}

/// Assembled solver state: fields in block-expanded layout plus the initial worklist.
#[derive(Debug, Clone)]
pub struct Problem<const N: usize> {
    pub(crate) geometry: BlockGeometry<N>,
    pub(crate) values: ValueField,
    pub(crate) cost: Vec<f64>,
    pub(crate) tags: BlockBitset,
    pub(crate) walls: BlockBitset,
    pub(crate) factoring: Option<Factoring<N>>,
    pub(crate) initial_blocks: Vec<usize>,
    pub(crate) min_cost: f64,
    pub(crate) max_cost: f64,
}

impl<const N: usize> Problem<N> {
    /// Current values, row-major.
    pub fn values_row_major(&self) -> Vec<f64> {
        self.geometry.from_expanded(&self.values.to_vec())
    }

    /// Value at a grid point.
    pub fn value_at(&self, point: [usize; N]) -> f64 {
        self.values.get(self.geometry.expanded_index(point))
    }

    /// Cost at a grid point (`+inf` on walls).
    pub fn cost_at(&self, point: [usize; N]) -> f64 {
        self.cost[self.geometry.expanded_index(point)]
    }

    /// True for seeded points and walls.
    pub fn is_tagged(&self, point: [usize; N]) -> bool {
        self.tags.get(self.geometry.expanded_index(point))
    }

    /// True for walls.
    pub fn is_wall(&self, point: [usize; N]) -> bool {
        self.walls.get(self.geometry.expanded_index(point))
    }

    /// Blocks active at the first round, ascending.
    pub fn initial_blocks(&self) -> &[usize] {
        &self.initial_blocks
    }

    /// Encoding of the value field.
    pub fn encoding(&self) -> Encoding {
        self.values.encoding()
    }

    /// Factoring data, when enabled.
    pub fn factoring(&self) -> Option<&Factoring<N>> {
        self.factoring.as_ref()
    }

    /// The grid partition.
    pub fn geometry(&self) -> &BlockGeometry<N> {
        &self.geometry
    }
}

/// Builds a [`Problem`] from user inputs.
pub struct ProblemAssembler<'a, const N: usize> {
    config: &'a SolverConfig<N>,
    rule: &'a dyn UpdateRule<N>,
}

impl<'a, const N: usize> ProblemAssembler<'a, N> {
    /// An assembler for `config`, spreading seeds with the rule's local distance.
    pub fn new(config: &'a SolverConfig<N>, rule: &'a dyn UpdateRule<N>) -> Self {
        ProblemAssembler { config, rule }
    }

    /// Validate the inputs and build the initial state.
    ///
    /// # Errors
    /// Returns an error for invalid costs, mismatched array shapes, seeds
    /// outside the domain or on walls, or (adaptive solver only) when there
    /// are neither seeds nor trigger points.
    pub fn assemble(&self, inputs: &ProblemInputs<N>) -> Result<Problem<N>> {
        let g = &self.config.geometry;
        let shape = g.shape();
        let num_points = g.num_points();
        let h = g.spacing();

        let mut cost = match &inputs.cost {
            CostField::Uniform(c) => {
                if c.is_nan() || *c <= 0.0 || c.is_infinite() {
                    return Err(EikonalError::InvalidCost { index: 0, value: *c });
                }
                vec![*c; num_points]
            }
            CostField::Values(v) => {
                check_len(v.len(), shape)?;
                if let Some((index, &value)) = v.iter().enumerate().find(|(_, c)| c.is_nan() || **c <= 0.0) {
                    return Err(EikonalError::InvalidCost { index, value });
                }
                v.clone()
            }
        };
        if let Some(mask) = &inputs.walls {
            check_len(mask.len(), shape)?;
            for (c, &wall) in cost.iter_mut().zip(mask.iter()) {
                if wall {
                    *c = f64::INFINITY;
                }
            }
        }

        let finite = cost.iter().copied().filter(|c| c.is_finite());
        let max_cost = finite.clone().fold(f64::NEG_INFINITY, f64::max);
        let min_cost = finite.fold(f64::INFINITY, f64::min);
        let (min_cost, max_cost) = if max_cost.is_finite() { (min_cost, max_cost) } else { (1.0, 1.0) };

        let encoding = Encoding {
            precision: self.config.precision,
            multip_step: self
                .config
                .multiprecision
                .then(|| self.config.multip_step.unwrap_or(h * max_cost)),
        };

        let cost = g.to_expanded(&cost, f64::INFINITY);
        let mut tags = BlockBitset::for_geometry(g);
        let mut walls = BlockBitset::for_geometry(g);
        for (e, c) in cost.iter().enumerate() {
            if c.is_infinite() && g.point_at(e).is_some() {
                walls.set(e);
            }
        }
        // Walls are never updated
        tags.union_with(&walls);

        let values = ValueField::new(g.expanded_len(), encoding);
        if let Some(init) = &inputs.initial_values {
            check_len(init.len(), shape)?;
            for (flat, &v) in init.iter().enumerate() {
                let e = g.expanded_index(g.point_from_row_major(flat));
                if !walls.get(e) && !v.is_nan() {
                    values.set(e, v);
                }
            }
        }

        let seeds = self.collect_seeds(inputs)?;
        if seeds.is_empty() && inputs.trigger.is_empty() && self.config.solver == SolverKind::Agsi {
            return Err(EikonalError::MissingSeeds);
        }

        let mut active = Vec::new();
        for seed in &seeds {
            self.spread_seed(seed, inputs.seed_radius, &cost, &walls, &values, &mut tags, &mut active)?;
        }
        for &p in &inputs.trigger {
            if (0..N).any(|d| p[d] >= shape[d]) {
                return Err(EikonalError::InvalidSeed {
                    coord: p.iter().map(|&v| v as f64).collect(),
                    reason: "trigger point is outside the domain".to_string(),
                });
            }
            active.push(g.block_of_point(p));
        }

        let mut initial_blocks = Vec::with_capacity(active.len() * (2 * N + 1));
        for &b in &active {
            initial_blocks.push(b);
            for axis in 0..N {
                for high in [false, true] {
                    initial_blocks.extend(g.neighbor_block(b, axis, high));
                }
            }
        }
        initial_blocks.sort_unstable();
        initial_blocks.dedup();

        let factoring = (self.config.factoring_radius > 0.0 && !seeds.is_empty()).then(|| {
            let points: Vec<[f64; N]> = seeds.iter().map(|s| s.point).collect();
            Factoring::around(g, &points, &cost, self.config.factoring_radius)
        });

        Ok(Problem {
            geometry: g.clone(),
            values,
            cost,
            tags,
            walls,
            factoring,
            initial_blocks,
            min_cost,
            max_cost,
        })
    }

    /// Oriented seeds plus the angular expansion of unoriented ones.
    fn collect_seeds(&self, inputs: &ProblemInputs<N>) -> Result<Vec<Seed<N>>> {
        let mut seeds = inputs.seeds.clone();
        if inputs.unoriented_seeds.is_empty() {
            return Ok(seeds);
        }
        let Some(axis) = self.config.model.orientation_axis() else {
            return Err(EikonalError::InvalidSeed {
                coord: inputs.unoriented_seeds[0].clone(),
                reason: format!("unoriented seeds need a curvature model, not {}", self.config.model),
            });
        };
        let angles = self.config.geometry.shape()[axis];
        for position in &inputs.unoriented_seeds {
            if position.len() + 1 != N {
                return Err(EikonalError::InvalidSeed {
                    coord: position.clone(),
                    reason: format!("expected {} coordinates", N - 1),
                });
            }
            for j in 0..angles {
                let mut point = [0.0; N];
                let mut it = position.iter();
                for (d, x) in point.iter_mut().enumerate() {
                    *x = if d == axis { j as f64 } else { it.next().copied().unwrap_or(0.0) };
                }
                seeds.push(Seed::new(point));
            }
        }
        Ok(seeds)
    }

    #[allow(clippy::too_many_arguments)]
    fn spread_seed(
        &self,
        seed: &Seed<N>,
        radius: f64,
        cost: &[f64],
        walls: &BlockBitset,
        values: &ValueField,
        tags: &mut BlockBitset,
        active: &mut Vec<usize>,
    ) -> Result<()> {
        let g = &self.config.geometry;
        let h = g.spacing();
        let invalid = |reason: &str| EikonalError::InvalidSeed {
            coord: seed.point.to_vec(),
            reason: reason.to_string(),
        };

        if !seed.value.is_finite() {
            return Err(invalid("seed value must be finite"));
        }
        if !radius.is_finite() || radius < 0.0 {
            return Err(EikonalError::config(
                "seed_radius",
                format!("got {}, must be non-negative and finite", radius),
            ));
        }
        if !g.contains(seed.point) {
            return Err(invalid("outside the domain"));
        }
        let nearest = g.nearest_point(seed.point);
        let nearest_slot = g.expanded_index(nearest);
        if walls.get(nearest_slot) {
            return Err(invalid("on a wall"));
        }
        let seed_cost = cost[nearest_slot];
        let x = seed.point;

        let mut lo = [0isize; N];
        let mut hi = [0isize; N];
        for d in 0..N {
            lo[d] = (x[d] - radius).floor() as isize;
            hi[d] = (x[d] + radius).ceil() as isize;
        }

        let mut assigned = false;
        for_each_in_box(lo, hi, |q| {
            let mut diff = [0.0; N];
            for d in 0..N {
                diff[d] = q[d] as f64 - x[d];
            }
            let dist = diff.iter().map(|v| v * v).sum::<f64>().sqrt();
            if dist > radius {
                return;
            }
            let Some(p) = wrap_point(g, q) else {
                return;
            };
            let e = g.expanded_index(p);
            if walls.get(e) {
                return;
            }
            let linear: f64 = seed
                .gradient
                .map_or(0.0, |grad| grad.iter().zip(diff.iter()).map(|(a, b)| a * b).sum());
            let (d_seed, _) = self.rule.local_distance(seed_cost, h, diff);
            let (d_here, _) = self.rule.local_distance(cost[e], h, diff);
            values.lower(e, seed.value + linear + 0.5 * (d_seed + d_here));
            tags.set(e);
            active.push(g.block_of_point(p));
            assigned = true;
        });

        if !assigned {
            values.lower(nearest_slot, seed.value);
            tags.set(nearest_slot);
            active.push(g.block_of_point(nearest));
        }
        Ok(())
    }
}

fn check_len<const N: usize>(len: usize, shape: [usize; N]) -> Result<()> {
    let expected: usize = shape.iter().product();
    if len != expected {
        return Err(EikonalError::ShapeMismatch {
            expected: shape.to_vec(),
            got: vec![len],
        });
    }
    Ok(())
}
