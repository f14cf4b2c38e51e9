// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

use eikonal_agsi::io;
use eikonal_agsi::{
    ActiveBlockBound, CostField, EikonalSolver, ModelDescriptor, Precision, ProblemInputs, Seed,
    SolverKind, SolverOptions,
};

#[derive(Parser)]
#[command(
    name = "eikonal-agsi",
    about = "Block-tiled eikonal solver with adaptive scheduling and geodesic backtracking"
)]
struct Cli {
    /// Model name with dimension suffix (e.g., Isotropic2, Isotropic3)
    #[arg(short = 'm', long, default_value = "Isotropic2")]
    model: ModelDescriptor,

    /// Grid size, comma-separated (e.g., 256,256 or 128,128,128)
    #[arg(short = 's', long)]
    size: String,

    /// Seed coordinates in grid units, comma-separated (repeatable)
    #[arg(long, num_args = 1)]
    seed: Vec<String>,

    /// Geodesic tip coordinates in grid units, comma-separated (repeatable)
    #[arg(long, num_args = 1)]
    tip: Vec<String>,

    /// Cost field: "uniform:<val>", "gradient:<v0>,<g>" (speed growing along
    /// the last axis), "cost-file:<path>", or "velocity-file:<path>"
    #[arg(long, default_value = "uniform:1.0")]
    cost: String,

    /// Grid spacing
    #[arg(long, default_value = "1.0")]
    spacing: f64,

    /// Outer scheduler: agsi or global
    #[arg(long, default_value = "agsi")]
    solver: SolverKind,

    /// Cap on simultaneously active blocks: off, auto, or a count
    #[arg(long, default_value = "off")]
    bound_active_blocks: ActiveBlockBound,

    /// Freeze causally settled blocks (implied by --bound-active-blocks)
    #[arg(long)]
    pruning: Option<bool>,

    /// Attach a fixed-point correction to stored values
    #[arg(long)]
    multiprecision: bool,

    /// Store values as f32
    #[arg(long)]
    single_precision: bool,

    /// Scheme order (1 or 2)
    #[arg(long, default_value = "1")]
    order: usize,

    /// Radius of additive source factoring, in grid units (0 disables)
    #[arg(long, default_value = "0.0")]
    factoring_radius: f64,

    /// Radius over which seeds are spread, in grid units
    #[arg(long, default_value = "0.0")]
    seed_radius: f64,

    /// Block shape, comma-separated
    #[arg(long)]
    block_shape: Option<String>,

    /// Gauss-Seidel sweeps per block visit
    #[arg(long)]
    niter_i: Option<usize>,

    /// Maximum number of outer rounds
    #[arg(long, default_value = "2000")]
    nitermax_o: usize,

    /// Convergence tolerance
    #[arg(short = 't', long, default_value = "1e-10")]
    tolerance: f64,

    /// Keep the best-effort field instead of failing on non-convergence
    #[arg(long)]
    allow_non_convergence: bool,

    /// Number of Rayon worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Geodesic step length
    #[arg(long, default_value = "0.25")]
    geodesic_step: f64,

    /// Maximum number of points per geodesic
    #[arg(long)]
    geodesic_max_length: Option<usize>,

    /// Output file for the value field (.npy)
    #[arg(short = 'o', long, default_value = "values.npy")]
    output: PathBuf,

    /// Output file for the geodesics (.npy)
    #[arg(long, default_value = "geodesics.npy")]
    geodesics_out: PathBuf,
}

fn parse_list<T: std::str::FromStr>(s: &str, flag: &str) -> Result<Vec<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    s.split(',')
        .map(|p| p.trim().parse::<T>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid --{}: expected a comma-separated list", flag))
}

fn parse_point<const N: usize>(s: &str, flag: &str) -> Result<[f64; N]> {
    let parts: Vec<f64> = parse_list(s, flag)?;
    match <[f64; N]>::try_from(parts.as_slice()) {
        Ok(p) => Ok(p),
        Err(_) => bail!("--{} has {} components but the model has {}", flag, parts.len(), N),
    }
}

fn build_cost(mode: &str, shape: &[usize], h: f64) -> Result<CostField> {
    if let Some(val_str) = mode.strip_prefix("uniform:") {
        let val: f64 = val_str.parse().context("invalid uniform cost value")?;
        if !val.is_finite() || val <= 0.0 {
            bail!("uniform cost must be positive and finite, got {}", val);
        }
        return Ok(CostField::Uniform(val));
    }

    if let Some(params) = mode.strip_prefix("gradient:") {
        let parts: Vec<f64> = parse_list(params, "cost")?;
        let [v0, g] = parts[..] else {
            bail!("gradient mode expects 'gradient:<v0>,<g>', got '{}'", mode);
        };
        let depth = shape[shape.len() - 1];
        let v_max = v0 + g * (depth - 1) as f64 * h;
        if !v0.is_finite() || v0 <= 0.0 || !v_max.is_finite() || v_max <= 0.0 {
            bail!("gradient: speed must stay positive and finite (v0={}, g={})", v0, g);
        }
        let num: usize = shape.iter().product();
        let cost = (0..num)
            .map(|flat| 1.0 / (v0 + g * (flat % depth) as f64 * h))
            .collect();
        return Ok(CostField::Values(cost));
    }

    if let Some(path_str) = mode.strip_prefix("cost-file:") {
        let cost = io::load_cost(Path::new(path_str), shape)
            .with_context(|| format!("loading cost from {}", path_str))?;
        return Ok(CostField::Values(cost));
    }

    if let Some(path_str) = mode.strip_prefix("velocity-file:") {
        let cost = io::load_velocity_as_cost(Path::new(path_str), shape)
            .with_context(|| format!("loading velocity from {}", path_str))?;
        return Ok(CostField::Values(cost));
    }

    bail!(
        "unknown --cost mode: '{}'. Expected 'uniform:<val>', 'gradient:<v0>,<g>', \
         'cost-file:<path>', or 'velocity-file:<path>'",
        mode
    );
}

fn options(cli: &Cli) -> Result<SolverOptions> {
    let mut opts = SolverOptions {
        precision: if cli.single_precision { Precision::Single } else { Precision::Double },
        multiprecision: cli.multiprecision,
        order: cli.order,
        factoring_radius: cli.factoring_radius,
        solver: cli.solver,
        pruning: cli.pruning,
        bound_active_blocks: cli.bound_active_blocks,
        niter_i: cli.niter_i,
        nitermax_o: cli.nitermax_o,
        tolerance: cli.tolerance,
        raise_on_non_convergence: !cli.allow_non_convergence,
        threads: cli.threads,
        spacing: cli.spacing,
        ..Default::default()
    };
    if let Some(block) = &cli.block_shape {
        opts.block_shape = Some(parse_list(block, "block-shape")?);
    }
    opts.geodesic.step = cli.geodesic_step;
    opts.geodesic.max_length = cli.geodesic_max_length;
    Ok(opts)
}

fn run<const N: usize>(cli: &Cli, size: &[usize], cost: CostField) -> Result<()> {
    let shape = <[usize; N]>::try_from(size)
        .map_err(|_| anyhow::anyhow!("--size has {} components but the model has {}", size.len(), N))?;
    let mut solver = EikonalSolver::new(cli.model, shape, &options(cli)?)?;

    let mut inputs = ProblemInputs::default()
        .with_cost(cost)
        .with_seed_radius(cli.seed_radius);
    for s in &cli.seed {
        inputs.seeds.push(Seed::new(parse_point::<N>(s, "seed")?));
    }

    let report = solver.solve(&inputs)?;
    eprintln!(
        "niter_o={} converged={} elapsed={:.3}s",
        report.niter_o,
        report.converged,
        report.elapsed.as_secs_f64()
    );

    let values = solver
        .values()
        .context("solver produced no value field")?;
    io::save_values(&values, size, &cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;

    if !cli.tip.is_empty() {
        let tips = cli
            .tip
            .iter()
            .map(|t| parse_point::<N>(t, "tip"))
            .collect::<Result<Vec<_>>>()?;
        let geodesics = solver.trace(&tips)?;
        for (i, (path, stop)) in geodesics.paths.iter().zip(&geodesics.stops).enumerate() {
            eprintln!("tip {}: {} points, {:?}", i, path.len(), stop);
        }
        io::save_geodesics(&geodesics, &cli.geodesics_out)
            .with_context(|| format!("writing {}", cli.geodesics_out.display()))?;
    }

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    if cli.seed.is_empty() {
        bail!("at least one --seed must be specified");
    }

    let size: Vec<usize> = parse_list(&cli.size, "size")?;
    let cost = build_cost(&cli.cost, &size, cli.spacing)?;

    match cli.model.dim {
        1 => run::<1>(&cli, &size, cost),
        2 => run::<2>(&cli, &size, cost),
        3 => run::<3>(&cli, &size, cost),
        d => bail!("models of dimension {} are not supported by the command line", d),
    }
}
