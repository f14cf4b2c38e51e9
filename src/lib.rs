// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! A block-tiled parallel solver for eikonal equations with geodesic backtracking.
//!
//! The grid is split into fixed-size blocks that are updated in parallel, one
//! task per block, over a sequence of outer iterations. Two schedulers are
//! available: a full sweep over every block, and an adaptive Gauss-Siedel
//! iteration (AGSI) that only revisits blocks whose inputs changed, optionally
//! freezing blocks that are causally settled and bounding the number of
//! simultaneously active blocks. Once the value field has converged, minimal
//! paths are backtracked from arbitrary tips by integrating the discrete flow.

#![warn(missing_docs)]

/// Kernel backends: compiled update rules and the parallel launch machinery.
pub mod backend;
/// Packed per-point bitsets in block-expanded layout.
pub mod bitset;
/// Solver configuration derived from a model descriptor and user options.
pub mod config;
/// Grid geometry and block partitioning.
pub mod core;
/// Error and warning types for the library.
pub mod error;
/// Value field storage with optional fixed-point correction.
pub mod field;
/// Geodesic backtracking from converged value fields.
pub mod geodesic;
/// File I/O for cost fields, value fields and geodesics.
pub mod io;
/// Per-block update kernel executed for each active block.
mod kernel;
/// Problem assembly from seeds, costs and walls.
pub mod problem;
/// Outer iteration scheduling (full sweep and AGSI).
pub mod scheduler;
/// Solver facade composing all components.
pub mod solver;
/// Local update rules (stencils) for the supported model families.
pub mod update_kernels;

pub use crate::backend::{CpuBackend, KernelBackend, Kernels};
pub use crate::config::{
    ActiveBlockBound, GeodesicOptions, ModelDescriptor, ModelFamily, SolverConfig, SolverKind,
    SolverOptions,
};
pub use crate::core::BlockGeometry;
pub use crate::error::{EikonalError, Result, SolverWarning};
pub use crate::field::Precision;
pub use crate::geodesic::{GeodesicReport, GeodesicStop};
pub use crate::problem::{CostField, ProblemInputs, Seed};
pub use crate::solver::{EikonalSolver, SolveReport};
