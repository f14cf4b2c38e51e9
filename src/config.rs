// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Model descriptors, user options, and the validated solver configuration.

use std::fmt;
use std::str::FromStr;

use crate::core::BlockGeometry;
use crate::error::{EikonalError, Result};
use crate::field::Precision;

/// Families of eikonal models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    /// Scalar cost, `|grad u| = c`.
    Isotropic,
    /// Axis-aligned anisotropy.
    Diagonal,
    /// General Riemannian metric.
    Riemann,
    /// Riemannian metric plus a drift term.
    Rander,
    /// Reeds-Shepp car (forward and reverse motion).
    ReedsShepp,
    /// Reeds-Shepp car restricted to forward motion.
    ReedsSheppForward,
    /// Euler elastica curvature penalization.
    Elastica,
    /// Dubins car.
    Dubins,
}

impl ModelFamily {
    /// All families, in declaration order.
    pub const ALL: [ModelFamily; 8] = [
        ModelFamily::Isotropic,
        ModelFamily::Diagonal,
        ModelFamily::Riemann,
        ModelFamily::Rander,
        ModelFamily::ReedsShepp,
        ModelFamily::ReedsSheppForward,
        ModelFamily::Elastica,
        ModelFamily::Dubins,
    ];

    /// Model name without the dimension suffix.
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::Isotropic => "Isotropic",
            ModelFamily::Diagonal => "Diagonal",
            ModelFamily::Riemann => "Riemann",
            ModelFamily::Rander => "Rander",
            ModelFamily::ReedsShepp => "ReedsShepp",
            ModelFamily::ReedsSheppForward => "ReedsSheppForward",
            ModelFamily::Elastica => "Elastica",
            ModelFamily::Dubins => "Dubins",
        }
    }

    /// Curvature-penalized models live on position x angle.
    pub fn is_curvature(&self) -> bool {
        matches!(
            self,
            ModelFamily::ReedsShepp
                | ModelFamily::ReedsSheppForward
                | ModelFamily::Elastica
                | ModelFamily::Dubins
        )
    }

    /// True if the family is defined in dimension `dim`.
    pub fn admits_dim(&self, dim: usize) -> bool {
        match self {
            ModelFamily::Isotropic | ModelFamily::Diagonal => (1..=5).contains(&dim),
            ModelFamily::Riemann => (2..=3).contains(&dim),
            ModelFamily::Rander => dim == 2,
            _ => dim == 3,
        }
    }

    /// Default block shape and inner iteration count in dimension `dim`.
    fn default_blocking(&self, dim: usize) -> (Vec<usize>, usize) {
        if self.is_curvature() {
            return (vec![4, 4, 4], 2);
        }
        match (self, dim) {
            (ModelFamily::Riemann | ModelFamily::Rander, 2) => (vec![8, 8], 16),
            (_, 1) => (vec![64], 64),
            (_, 2) => (vec![24, 24], 48),
            (_, 3) => (vec![4, 4, 4], 12),
            (_, d) => (vec![2; d], 8),
        }
    }
}

impl FromStr for ModelFamily {
    type Err = EikonalError;

    fn from_str(s: &str) -> Result<Self> {
        ModelFamily::ALL
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EikonalError::UnsupportedModel {
                model: s.to_string(),
                reason: "unknown model family".to_string(),
            })
    }
}

/// A model family together with its dimension, e.g. `Isotropic2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelDescriptor {
    /// The model family.
    pub family: ModelFamily,
    /// Number of grid axes.
    pub dim: usize,
}

impl ModelDescriptor {
    /// Describe a model, checking that the family admits the dimension.
    pub fn new(family: ModelFamily, dim: usize) -> Result<Self> {
        let model = ModelDescriptor { family, dim };
        if !family.admits_dim(dim) {
            return Err(EikonalError::UnsupportedModel {
                model: model.to_string(),
                reason: format!("{} is not defined in dimension {}", family.name(), dim),
            });
        }
        Ok(model)
    }

    /// Isotropic model of dimension `dim`.
    pub fn isotropic(dim: usize) -> Result<Self> {
        ModelDescriptor::new(ModelFamily::Isotropic, dim)
    }

    /// The angular axis of curvature models.
    pub fn orientation_axis(&self) -> Option<usize> {
        self.family.is_curvature().then(|| self.dim - 1)
    }
}

impl fmt::Display for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.family.name(), self.dim)
    }
}

impl FromStr for ModelDescriptor {
    type Err = EikonalError;

    /// Parse names such as `Isotropic2` or `ReedsShepp3`.
    fn from_str(s: &str) -> Result<Self> {
        let split = s.find(|c: char| c.is_ascii_digit()).unwrap_or(s.len());
        let (name, digits) = s.split_at(split);
        let family: ModelFamily = name.parse()?;
        let dim = digits.parse::<usize>().map_err(|_| EikonalError::UnsupportedModel {
            model: s.to_string(),
            reason: "expected a dimension suffix, e.g. Isotropic2".to_string(),
        })?;
        ModelDescriptor::new(family, dim)
    }
}

/// Outer iteration strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    /// Adaptive Gauss-Siedel iteration over a worklist of active blocks.
    #[default]
    Agsi,
    /// Full sweep over every block each round.
    GlobalIteration,
}

impl FromStr for SolverKind {
    type Err = EikonalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "agsi" => Ok(SolverKind::Agsi),
            "global_iteration" | "global" => Ok(SolverKind::GlobalIteration),
            _ => Err(EikonalError::config(
                "solver",
                format!("unknown solver '{}' (expected agsi or global_iteration)", s),
            )),
        }
    }
}

/// Cap on the number of blocks considered per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveBlockBound {
    /// No cap.
    #[default]
    Off,
    /// Cap derived from the block grid, `max(1, 12 * size_o / max(shape_o))`.
    Auto,
    /// Explicit cap, must be positive.
    Limit(usize),
}

impl FromStr for ActiveBlockBound {
    type Err = EikonalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "false" | "none" => Ok(ActiveBlockBound::Off),
            "auto" | "true" => Ok(ActiveBlockBound::Auto),
            other => other
                .parse::<usize>()
                .map(ActiveBlockBound::Limit)
                .map_err(|_| {
                    EikonalError::config(
                        "bound_active_blocks",
                        format!("expected off, auto or a positive integer, got '{}'", s),
                    )
                }),
        }
    }
}

/// Adaptation of the causality threshold window under bound-active-blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundAdjustment {
    /// Lower clamp of the per-round window multiplier.
    pub min_factor: f64,
    /// Upper clamp of the per-round window multiplier. Also scales the cap on
    /// considered blocks, `ceil(bound * max_factor)`.
    pub max_factor: f64,
    /// Floor of the window width; defaults to `h * min positive cost`.
    pub min_delta: Option<f64>,
}

impl Default for BoundAdjustment {
    fn default() -> Self {
        BoundAdjustment {
            min_factor: 0.7,
            max_factor: 2.0,
            min_delta: None,
        }
    }
}

/// Geodesic backtracking options.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodesicOptions {
    /// ODE step length, in grid units.
    pub step: f64,
    /// Maximum number of points per path. Defaults to `ceil(2 * sum(shape) / step)`.
    pub max_length: Option<usize>,
    /// Steps per tip per integration round.
    pub typical_length: usize,
    /// Proximity (grid units) below which a tip has reached a seed.
    pub target_tolerance: f64,
    /// Saturation value of the proximity map.
    pub proximity_cap: f64,
    /// History length of the past-seed test.
    pub past_seed_delay: usize,
    /// Consecutive slow steps before a tip is declared stationary.
    pub stationary_delay: usize,
    /// Flow magnitude under which a step counts as slow.
    pub stationary_threshold: f64,
}

impl Default for GeodesicOptions {
    fn default() -> Self {
        GeodesicOptions {
            step: 0.25,
            max_length: None,
            typical_length: 256,
            target_tolerance: 1.0,
            proximity_cap: 6.0,
            past_seed_delay: 10,
            stationary_delay: 20,
            stationary_threshold: 1e-2,
        }
    }
}

/// Resolved geodesic options.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodesicConfig {
    /// ODE step length.
    pub step: f64,
    /// Maximum number of points per path.
    pub max_length: usize,
    /// Steps per tip per round.
    pub typical_length: usize,
    /// Proximity threshold of `AtSeed`.
    pub target_tolerance: f64,
    /// Proximity map saturation.
    pub proximity_cap: f64,
    /// History length of `PastSeed`.
    pub past_seed_delay: usize,
    /// Slow steps before `Stationary`.
    pub stationary_delay: usize,
    /// Slow-step flow magnitude.
    pub stationary_threshold: f64,
}

impl GeodesicConfig {
    /// Upper bound on integration rounds, `ceil(max_length / typical_length)`.
    pub fn max_rounds(&self) -> usize {
        self.max_length.div_ceil(self.typical_length)
    }
}

/// User-facing solver options. Every field has a default; validation happens
/// in [`SolverConfig::from_options`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// Storage width of the value field.
    pub precision: Precision,
    /// Attach an integer correction field to the value field.
    pub multiprecision: bool,
    /// Correction quantum; defaults to `h * max finite cost`.
    pub multip_step: Option<f64>,
    /// Scheme order, 1 or 2.
    pub order: usize,
    /// Radius (grid units) around seeds where additive factoring applies; 0 disables it.
    pub factoring_radius: f64,
    /// Per-axis periodicity; curvature models default to a periodic last axis.
    pub periodic: Option<Vec<bool>>,
    /// Outer iteration strategy.
    pub solver: SolverKind,
    /// Freeze blocks that can no longer change. Defaults to on iff a bound is set.
    pub pruning: Option<bool>,
    /// Cap on blocks considered per round.
    pub bound_active_blocks: ActiveBlockBound,
    /// Threshold window adaptation of the bound.
    pub bound_adjustment: BoundAdjustment,
    /// Block shape override.
    pub block_shape: Option<Vec<usize>>,
    /// Inner Gauss-Seidel sweeps per block visit.
    pub niter_i: Option<usize>,
    /// Outer iteration cap.
    pub nitermax_o: usize,
    /// Double-buffer the field even when not required.
    pub strict_iter_o: bool,
    /// Decrease above which a point counts as changed.
    pub tolerance: f64,
    /// Fail on non-convergence instead of returning a warning.
    pub raise_on_non_convergence: bool,
    /// Record per-block update counts.
    pub count_updates: bool,
    /// Worker threads; `None` uses all cores.
    pub threads: Option<usize>,
    /// Uniform grid spacing.
    pub spacing: f64,
    /// Geodesic backtracking options.
    pub geodesic: GeodesicOptions,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            precision: Precision::Double,
            multiprecision: false,
            multip_step: None,
            order: 1,
            factoring_radius: 0.0,
            periodic: None,
            solver: SolverKind::Agsi,
            pruning: None,
            bound_active_blocks: ActiveBlockBound::Off,
            bound_adjustment: BoundAdjustment::default(),
            block_shape: None,
            niter_i: None,
            nitermax_o: 2000,
            strict_iter_o: false,
            tolerance: 1e-10,
            raise_on_non_convergence: true,
            count_updates: false,
            threads: None,
            spacing: 1.0,
            geodesic: GeodesicOptions::default(),
        }
    }
}

/// Validated configuration consumed by the backend, the assembler and the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig<const N: usize> {
    /// The model being solved.
    pub model: ModelDescriptor,
    /// Grid partition.
    pub geometry: BlockGeometry<N>,
    /// Storage width of primary values.
    pub precision: Precision,
    /// Integer correction field enabled.
    pub multiprecision: bool,
    /// Explicit correction quantum, if given.
    pub multip_step: Option<f64>,
    /// Scheme order.
    pub order: usize,
    /// Factoring radius, 0 when disabled.
    pub factoring_radius: f64,
    /// Outer iteration strategy.
    pub solver: SolverKind,
    /// Block freezing enabled.
    pub pruning: bool,
    /// Resolved cap on considered blocks.
    pub bound: Option<usize>,
    /// Threshold window adaptation.
    pub bound_adjustment: BoundAdjustment,
    /// Blocks report their smallest changed value.
    pub track_min_change: bool,
    /// Double-buffered field.
    pub strict: bool,
    /// Inner sweeps per block visit.
    pub niter_i: usize,
    /// Outer iteration cap.
    pub nitermax_o: usize,
    /// Change tolerance.
    pub tolerance: f64,
    /// Fail on non-convergence.
    pub raise_on_non_convergence: bool,
    /// Record per-block update counts.
    pub count_updates: bool,
    /// Worker threads.
    pub threads: Option<usize>,
    /// Geodesic settings.
    pub geodesic: GeodesicConfig,
}

fn require_finite(option: &str, value: f64, positive: bool) -> Result<()> {
    if !value.is_finite() || value < 0.0 || (positive && value == 0.0) {
        let expected = if positive { "positive and finite" } else { "non-negative and finite" };
        return Err(EikonalError::config(option, format!("got {}, must be {}", value, expected)));
    }
    Ok(())
}

fn per_axis<T: Copy, const N: usize>(option: &str, values: &[T]) -> Result<[T; N]> {
    <[T; N]>::try_from(values).map_err(|_| {
        EikonalError::config(
            option,
            format!("expected {} entries, got {}", N, values.len()),
        )
    })
}

impl<const N: usize> SolverConfig<N> {
    /// Derive the configuration for `model` on a grid of `shape` points.
    ///
    /// # Errors
    /// Returns a configuration error (see [`EikonalError::is_configuration`])
    /// for incompatible option combinations, out-of-range values, or a grid
    /// that cannot be partitioned.
    pub fn from_options(model: ModelDescriptor, shape: [usize; N], options: &SolverOptions) -> Result<Self> {
        if model.dim != N {
            return Err(EikonalError::UnsupportedModel {
                model: model.to_string(),
                reason: format!("model dimension {} does not match a {}-D grid", model.dim, N),
            });
        }
        if !model.family.admits_dim(N) {
            return Err(EikonalError::UnsupportedModel {
                model: model.to_string(),
                reason: format!("{} is not defined in dimension {}", model.family.name(), N),
            });
        }
        if options.order != 1 && options.order != 2 {
            return Err(EikonalError::config(
                "order",
                format!("got {}, must be 1 or 2", options.order),
            ));
        }
        require_finite("tolerance", options.tolerance, false)?;
        require_finite("factoring_radius", options.factoring_radius, false)?;
        if let Some(step) = options.multip_step {
            require_finite("multip_step", step, true)?;
        }
        if options.nitermax_o == 0 {
            return Err(EikonalError::config("nitermax_o", "must be at least 1"));
        }
        if options.threads == Some(0) {
            return Err(EikonalError::config("threads", "must be at least 1"));
        }

        let (default_shape, default_niter) = model.family.default_blocking(N);
        let shape_i: [usize; N] = match &options.block_shape {
            Some(b) => per_axis("block_shape", b)?,
            None => per_axis("block_shape", &default_shape)?,
        };
        let niter_i = options.niter_i.unwrap_or(default_niter);
        if niter_i == 0 {
            return Err(EikonalError::config("niter_i", "must be at least 1"));
        }

        let periodic: [bool; N] = match &options.periodic {
            Some(p) => per_axis("periodic", p)?,
            None => {
                let mut p = [false; N];
                if let Some(axis) = model.orientation_axis() {
                    p[axis] = true;
                }
                p
            }
        };

        let geometry = BlockGeometry::new(shape, shape_i, periodic, options.spacing)?;

        let bound = match options.bound_active_blocks {
            ActiveBlockBound::Off => None,
            ActiveBlockBound::Limit(0) => {
                return Err(EikonalError::config("bound_active_blocks", "limit must be positive"));
            }
            ActiveBlockBound::Limit(k) => Some(k),
            ActiveBlockBound::Auto => {
                let longest = geometry.shape_o().iter().copied().max().unwrap_or(1);
                Some((12 * geometry.size_o() / longest).max(1))
            }
        };

        let adj = options.bound_adjustment;
        require_finite("bound_adjustment.min_factor", adj.min_factor, true)?;
        require_finite("bound_adjustment.max_factor", adj.max_factor, true)?;
        if adj.min_factor > adj.max_factor {
            return Err(EikonalError::config(
                "bound_adjustment",
                "min_factor exceeds max_factor",
            ));
        }
        if let Some(d) = adj.min_delta {
            require_finite("bound_adjustment.min_delta", d, true)?;
        }

        let pruning = match (options.pruning, bound) {
            (Some(false), Some(_)) => {
                return Err(EikonalError::config(
                    "pruning",
                    "bound_active_blocks requires pruning",
                ));
            }
            (Some(p), _) => p,
            (None, b) => b.is_some(),
        };

        if options.solver == SolverKind::GlobalIteration {
            if bound.is_some() {
                return Err(EikonalError::config(
                    "bound_active_blocks",
                    "not available with the global_iteration solver",
                ));
            }
            if pruning {
                return Err(EikonalError::config(
                    "pruning",
                    "not available with the global_iteration solver",
                ));
            }
        }

        let strict = options.strict_iter_o
            || options.multiprecision
            || options.order == 2
            || options.solver == SolverKind::GlobalIteration;

        let geodesic = resolve_geodesic(&options.geodesic, shape)?;

        Ok(SolverConfig {
            model,
            geometry,
            precision: options.precision,
            multiprecision: options.multiprecision,
            multip_step: options.multip_step,
            order: options.order,
            factoring_radius: options.factoring_radius,
            solver: options.solver,
            pruning,
            bound,
            bound_adjustment: adj,
            track_min_change: pruning,
            strict,
            niter_i,
            nitermax_o: options.nitermax_o,
            tolerance: options.tolerance,
            raise_on_non_convergence: options.raise_on_non_convergence,
            count_updates: options.count_updates,
            threads: options.threads,
            geodesic,
        })
    }

    /// Depth of the face band whose changes must be propagated to neighbors.
    pub fn face_depth(&self) -> usize {
        self.order
    }

    /// True if the scheme is monotone in its neighbor values, so that values
    /// only ever decrease. The second-order scheme is not.
    pub fn monotone(&self) -> bool {
        self.order == 1
    }
}

fn resolve_geodesic<const N: usize>(opts: &GeodesicOptions, shape: [usize; N]) -> Result<GeodesicConfig> {
    require_finite("geodesic.step", opts.step, true)?;
    require_finite("geodesic.target_tolerance", opts.target_tolerance, false)?;
    require_finite("geodesic.proximity_cap", opts.proximity_cap, true)?;
    require_finite("geodesic.stationary_threshold", opts.stationary_threshold, false)?;
    if opts.typical_length == 0 {
        return Err(EikonalError::config("geodesic.typical_length", "must be at least 1"));
    }
    if opts.past_seed_delay == 0 || opts.stationary_delay == 0 {
        return Err(EikonalError::config("geodesic", "delays must be at least 1"));
    }
    let max_length = match opts.max_length {
        Some(0) => {
            return Err(EikonalError::config("geodesic.max_length", "must be at least 1"));
        }
        Some(m) => m,
        None => {
            let extent: usize = shape.iter().sum();
            ((2 * extent) as f64 / opts.step).ceil() as usize
        }
    };
    Ok(GeodesicConfig {
        step: opts.step,
        max_length,
        typical_length: opts.typical_length,
        target_tolerance: opts.target_tolerance,
        proximity_cap: opts.proximity_cap,
        past_seed_delay: opts.past_seed_delay,
        stationary_delay: opts.stationary_delay,
        stationary_threshold: opts.stationary_threshold,
    })
}
