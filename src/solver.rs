// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::backend::{CpuBackend, KernelBackend, Kernels};
use crate::config::{ModelDescriptor, SolverConfig, SolverOptions};
use crate::error::{EikonalError, Result};
use crate::geodesic::{GeodesicReport, GeodesicTracer};
use crate::problem::{Problem, ProblemAssembler, ProblemInputs};
use crate::scheduler::{ScheduleReport, UpdateScheduler};

/// Outcome of [`EikonalSolver::solve`].
pub type SolveReport = ScheduleReport;

/// Solves an eikonal problem on a block-tiled grid and backtracks geodesics
/// from the result.
///
/// ```no_run
/// use eikonal_agsi::{EikonalSolver, ModelDescriptor, ProblemInputs, SolverOptions};
///
/// let model = ModelDescriptor::isotropic(2)?;
/// let mut solver = EikonalSolver::new(model, [64, 64], &SolverOptions::default())?;
/// let report = solver.solve(&ProblemInputs::default().with_seed([32.0, 32.0]))?;
/// assert!(report.converged);
/// let paths = solver.trace(&[[0.0, 0.0]])?;
/// # Ok::<(), eikonal_agsi::EikonalError>(())
/// ```
pub struct EikonalSolver<const N: usize> {
    config: SolverConfig<N>,
    kernels: Kernels<N>,
    problem: Option<Problem<N>>,
}

impl<const N: usize> EikonalSolver<N> {
    /// Configure a solver running on the CPU backend.
    ///
    /// # Errors
    /// Returns a configuration error when the options are invalid for the
    /// model and grid shape, or when the model has no CPU kernels.
    pub fn new(model: ModelDescriptor, shape: [usize; N], options: &SolverOptions) -> Result<Self> {
        Self::with_backend(model, shape, options, &CpuBackend)
    }

    /// Configure a solver whose kernels come from `backend`.
    pub fn with_backend(
        model: ModelDescriptor,
        shape: [usize; N],
        options: &SolverOptions,
        backend: &dyn KernelBackend<N>,
    ) -> Result<Self> {
        let config = SolverConfig::from_options(model, shape, options)?;
        let kernels = backend.compile(&config)?;
        tracing::debug!(
            model = %config.model,
            shape = ?config.geometry.shape(),
            block_shape = ?config.geometry.shape_i(),
            strict = config.strict,
            "solver configured"
        );
        Ok(EikonalSolver {
            config,
            kernels,
            problem: None,
        })
    }

    /// Assemble `inputs` and iterate to convergence.
    ///
    /// On `NonConvergence` the best-effort field is kept and remains
    /// available through [`values`](Self::values).
    pub fn solve(&mut self, inputs: &ProblemInputs<N>) -> Result<SolveReport> {
        let mut problem = ProblemAssembler::new(&self.config, self.kernels.rule()).assemble(inputs)?;
        tracing::debug!(initial_blocks = problem.initial_blocks().len(), "problem assembled");
        let result = UpdateScheduler::new(&self.config, &self.kernels).run(&mut problem);
        self.problem = Some(problem);
        result
    }

    /// Run the scheduler again on the current field, from the same initial
    /// worklist. A converged field reports `niter_o == 0`.
    pub fn resume(&mut self) -> Result<SolveReport> {
        let problem = self
            .problem
            .as_mut()
            .ok_or_else(|| EikonalError::Other("no problem has been solved yet".to_string()))?;
        UpdateScheduler::new(&self.config, &self.kernels).run(problem)
    }

    /// Current values in row-major order.
    pub fn values(&self) -> Option<Vec<f64>> {
        self.problem.as_ref().map(Problem::values_row_major)
    }

    /// The assembled problem of the last solve.
    pub fn problem(&self) -> Option<&Problem<N>> {
        self.problem.as_ref()
    }

    /// The validated configuration.
    pub fn config(&self) -> &SolverConfig<N> {
        &self.config
    }

    /// The compiled kernels.
    pub fn kernels(&self) -> &Kernels<N> {
        &self.kernels
    }

    /// Backtrack minimal paths from oriented tips (grid coordinates).
    ///
    /// # Errors
    /// Returns [`EikonalError::InvalidTip`] for tips outside the domain, or an
    /// error when nothing has been solved yet.
    pub fn trace(&self, tips: &[[f64; N]]) -> Result<GeodesicReport<N>> {
        GeodesicTracer::new(&self.config, &self.kernels, self.solved()?).trace(tips)
    }

    /// Backtrack minimal paths from position-only tips of a curvature model.
    /// Each tip starts at the orientation of smallest value.
    pub fn trace_unoriented(&self, tips: &[Vec<f64>]) -> Result<GeodesicReport<N>> {
        GeodesicTracer::new(&self.config, &self.kernels, self.solved()?).trace_unoriented(tips)
    }

    fn solved(&self) -> Result<&Problem<N>> {
        self.problem
            .as_ref()
            .ok_or_else(|| EikonalError::Other("no problem has been solved yet".to_string()))
    }
}
