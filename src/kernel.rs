// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::bitset::{AtomicBitset, BlockBitset};
use crate::core::BlockGeometry;
use crate::field::ValueField;
use crate::problem::Factoring;
use crate::update_kernels::{Stencil, UpdateRule, STENCIL_OFFSETS};

/// Everything a block update reads, shared by all blocks of a launch.
pub(crate) struct UpdateArgs<'a, const N: usize> {
    pub geometry: &'a BlockGeometry<N>,
    pub rule: &'a dyn UpdateRule<N>,
    /// Field read for out-of-block neighbors and the initial block copy.
    pub read: &'a ValueField,
    /// Field the block is written back to; same as `read` in place.
    pub write: &'a ValueField,
    /// Block-expanded cost, `+inf` at walls and padding.
    pub cost: &'a [f64],
    pub tags: &'a BlockBitset,
    pub factoring: Option<&'a Factoring<N>>,
    /// Stencil reach, also the width of the face band that activates neighbors.
    pub depth: usize,
    /// Only accept decreasing candidates. Off for non-monotone schemes, whose
    /// points are recomputed until `u = F(u)` holds.
    pub monotone: bool,
    /// Report the smallest affected value of each block as its activation key.
    pub track_min_change: bool,
    pub niter_i: usize,
    pub tolerance: f64,
    pub strict: bool,
}

/// Summary of one block visit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BlockOutcome {
    pub block: usize,
    /// Some point decreased by more than the tolerance.
    pub changed: bool,
    /// The last inner sweep still changed something.
    pub unsettled: bool,
    /// Bit `2 * axis + high` set when a point within the face band changed.
    pub faces: u32,
    /// Smallest old or new value among changed points, `+inf` if none.
    /// Always `-inf` when change tracking is off.
    pub min_changed: f64,
    /// Largest free value of the block, `+inf` if some free point is unreached.
    pub max_value: f64,
}

/// Blocks activated during a launch, with the smallest key each received.
pub(crate) struct Activation {
    flags: AtomicBitset,
    keys: Box<[AtomicU64]>,
}

fn atomic_min_f64(atom: &AtomicU64, val: f64) {
    let mut current = atom.load(Ordering::Relaxed);
    while val < f64::from_bits(current) {
        match atom.compare_exchange_weak(current, val.to_bits(), Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

impl Activation {
    pub(crate) fn new(num_blocks: usize) -> Self {
        Activation {
            flags: AtomicBitset::new(num_blocks),
            keys: (0..num_blocks)
                .map(|_| AtomicU64::new(f64::INFINITY.to_bits()))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    pub(crate) fn activate(&self, block: usize, key: f64) {
        self.flags.try_set(block);
        atomic_min_f64(&self.keys[block], key);
    }

    /// Activated blocks in ascending order with their keys; resets the set.
    pub(crate) fn drain(&self) -> Vec<(usize, f64)> {
        self.flags
            .drain()
            .into_iter()
            .map(|b| {
                let key = self.keys[b].swap(f64::INFINITY.to_bits(), Ordering::AcqRel);
                (b, f64::from_bits(key))
            })
            .collect()
    }
}

/// Gather the stencil of `point`, reading neighbors through `value_at`.
/// Only offsets up to `depth` are read; the others stay infinite.
pub(crate) fn gather_stencil<const N: usize>(
    geometry: &BlockGeometry<N>,
    point: [usize; N],
    value: f64,
    cost: f64,
    depth: usize,
    mut value_at: impl FnMut([usize; N]) -> f64,
) -> Stencil<N> {
    let mut axes = [[f64::INFINITY; 4]; N];
    for (axis, row) in axes.iter_mut().enumerate() {
        for (slot, &k) in row.iter_mut().zip(STENCIL_OFFSETS.iter()) {
            if k.unsigned_abs() > depth {
                continue;
            }
            if let Some(q) = geometry.offset_point(point, axis, k) {
                *slot = value_at(q);
            }
        }
    }
    Stencil {
        point,
        value,
        cost,
        h: geometry.spacing(),
        axes,
    }
}

/// Rewrite neighbor values so that the rule works on the smooth part of the
/// solution, `u - U`, where `U` is the local distance to the factoring origin.
fn apply_factoring<const N: usize>(
    stencil: &mut Stencil<N>,
    rule: &dyn UpdateRule<N>,
    origin_cost: f64,
    offset: [f64; N],
) {
    let h = stencil.h;
    let (u_p, grad) = rule.local_distance(origin_cost, h, offset);
    if u_p <= 0.0 {
        return;
    }
    for (axis, row) in stencil.axes.iter_mut().enumerate() {
        for (slot, &k) in row.iter_mut().zip(STENCIL_OFFSETS.iter()) {
            if !slot.is_finite() {
                continue;
            }
            let mut q = offset;
            q[axis] += k as f64;
            let (u_q, _) = rule.local_distance(origin_cost, h, q);
            *slot += u_p - u_q + k as f64 * grad[axis];
        }
    }
}

/// Inner index visited at position `n` of sweep `k`. The sweep direction
/// along axis `d` is reversed when bit `d` of `k` is set.
#[inline]
fn sweep_index<const N: usize>(nd: [usize; N], shape_i: &[usize; N], k: usize) -> usize {
    let mut inner = 0;
    for d in 0..N {
        let i = if (k >> d) & 1 == 1 { shape_i[d] - 1 - nd[d] } else { nd[d] };
        inner = inner * shape_i[d] + i;
    }
    inner
}

#[inline]
fn face_bits<const N: usize>(nd: [usize; N], shape_i: &[usize; N], depth: usize) -> u32 {
    let mut faces = 0;
    for d in 0..N {
        if nd[d] < depth {
            faces |= 1 << (2 * d);
        }
        if nd[d] + depth >= shape_i[d] {
            faces |= 1 << (2 * d + 1);
        }
    }
    faces
}

/// True if a point went from `old` to `new` by more than `tolerance`.
#[inline]
fn moved(old: f64, new: f64, tolerance: f64) -> bool {
    if old.is_finite() && new.is_finite() {
        (old - new).abs() > tolerance
    } else {
        old != new
    }
}

/// Run `niter_i` Gauss-Seidel sweeps over one block, write it back, and record
/// the blocks that must be revisited.
pub(crate) fn update_block<const N: usize>(
    args: &UpdateArgs<'_, N>,
    block: usize,
    activation: Option<&Activation>,
) -> BlockOutcome {
    let g = args.geometry;
    let shape_i = g.shape_i();
    let size_i = g.size_i();
    let base = block * size_i;
    let encoding = args.write.encoding();

    let inner_nd: Vec<[usize; N]> = (0..size_i).map(|i| g.inner_to_nd(i)).collect();
    let points: Vec<Option<[usize; N]>> = (0..size_i).map(|i| g.point_in_block(block, i)).collect();
    let initial: Vec<f64> = (0..size_i).map(|i| args.read.get(base + i)).collect();
    let mut local = initial.clone();

    let mut sweep_changed = false;
    for k in 0..args.niter_i {
        sweep_changed = false;
        for nd in &inner_nd {
            let inner = sweep_index(*nd, &shape_i, k);
            let Some(point) = points[inner] else {
                continue;
            };
            let slot = base + inner;
            let cost = args.cost[slot];
            if args.tags.get(slot) || !cost.is_finite() {
                continue;
            }

            let current = local[inner];
            let mut stencil = gather_stencil(g, point, current, cost, args.depth, |q| {
                let e = g.expanded_index(q);
                if (base..base + size_i).contains(&e) {
                    local[e - base]
                } else {
                    args.read.get(e)
                }
            });
            if let Some(origin) = args.factoring.and_then(|f| f.origin_of(slot)) {
                let offset = origin.offset(g, point);
                apply_factoring(&mut stencil, args.rule, origin.cost, offset);
            }

            let candidate = encoding.quantize(args.rule.update(&stencil));
            let accept = if args.monotone { candidate < current } else { candidate != current };
            if accept {
                local[inner] = candidate;
                if moved(current, candidate, args.tolerance) {
                    sweep_changed = true;
                }
            }
        }
        if !sweep_changed {
            break;
        }
    }

    let mut outcome = BlockOutcome {
        block,
        changed: false,
        unsettled: sweep_changed,
        faces: 0,
        min_changed: f64::INFINITY,
        max_value: f64::NEG_INFINITY,
    };

    for inner in 0..size_i {
        let slot = base + inner;
        let v = local[inner];
        if v != initial[inner] {
            args.write.set(slot, v);
        } else if args.strict {
            args.write.store(slot, args.read.load(slot));
        }
        if points[inner].is_none() || args.tags.get(slot) {
            continue;
        }
        outcome.max_value = if v.is_finite() { outcome.max_value.max(v) } else { f64::INFINITY };
        if moved(initial[inner], v, args.tolerance) {
            outcome.changed = true;
            // Points that depended on the old value sit above it
            outcome.min_changed = outcome.min_changed.min(v.min(initial[inner]));
            outcome.faces |= face_bits(inner_nd[inner], &shape_i, args.depth);
        }
    }
    if !args.track_min_change {
        outcome.min_changed = f64::NEG_INFINITY;
    }

    if let Some(act) = activation {
        if outcome.unsettled {
            act.activate(block, outcome.min_changed);
        }
        for axis in 0..N {
            for high in [false, true] {
                let bit = 1 << (2 * axis + usize::from(high));
                if outcome.faces & bit == 0 {
                    continue;
                }
                if let Some(nb) = g.neighbor_block(block, axis, high) {
                    act.activate(nb, outcome.min_changed);
                }
            }
        }
    }

    outcome
}
