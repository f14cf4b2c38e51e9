// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use rayon::prelude::*;

use crate::config::{ModelFamily, SolverConfig};
use crate::error::{EikonalError, Result};
use crate::kernel::{update_block, Activation, BlockOutcome, UpdateArgs};
use crate::update_kernels::{IsotropicRule, UpdateRule};

/// Compiled per-model kernels: the update rule plus the worker pool that runs it.
pub struct Kernels<const N: usize> {
    rule: Box<dyn UpdateRule<N>>,
    pool: rayon::ThreadPool,
}

impl<const N: usize> Kernels<N> {
    /// Bundle a rule with a pool of `threads` workers (0 uses all cores).
    pub fn new(rule: Box<dyn UpdateRule<N>>, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| EikonalError::Other(e.to_string()))?;
        Ok(Kernels { rule, pool })
    }

    /// The update rule.
    pub fn rule(&self) -> &dyn UpdateRule<N> {
        self.rule.as_ref()
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` inside the worker pool.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Update every block of the worklist in parallel. Outcomes come back in
    /// worklist order.
    pub(crate) fn launch_update(
        &self,
        worklist: &[usize],
        args: &UpdateArgs<'_, N>,
        activation: Option<&Activation>,
    ) -> Vec<BlockOutcome> {
        self.pool.install(|| {
            worklist
                .par_iter()
                .map(|&block| update_block(args, block, activation))
                .collect()
        })
    }
}

/// Produces kernels for a configuration.
pub trait KernelBackend<const N: usize> {
    /// Build the kernels for `config`.
    ///
    /// # Errors
    /// Returns [`EikonalError::UnsupportedModel`] when the backend has no rule
    /// for the configured model.
    fn compile(&self, config: &SolverConfig<N>) -> Result<Kernels<N>>;
}

/// Multi-threaded CPU backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl<const N: usize> KernelBackend<N> for CpuBackend {
    fn compile(&self, config: &SolverConfig<N>) -> Result<Kernels<N>> {
        let rule: Box<dyn UpdateRule<N>> = match config.model.family {
            ModelFamily::Isotropic => Box::new(IsotropicRule::new(config.order)),
            _ => {
                return Err(EikonalError::UnsupportedModel {
                    model: config.model.to_string(),
                    reason: "the CPU backend only provides the isotropic stencil".to_string(),
                });
            }
        };
        tracing::debug!(
            model = %config.model,
            order = config.order,
            threads = config.threads.unwrap_or(0),
            "compiled CPU kernels"
        );
        Kernels::new(rule, config.threads.unwrap_or(0))
    }
}
