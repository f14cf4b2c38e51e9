// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{EikonalError, Result};

/// Number of points packed into one seed-tag word. Blocks must hold a whole
/// number of words.
pub const BITSET_WIDTH: usize = 8;

/// Geometry of a structured grid partitioned into equally shaped blocks.
///
/// Field arrays are stored in *block-expanded* layout: all `size_i` points of
/// block 0 (in row-major inner order), then block 1, and so on. When the grid
/// extent is not a multiple of the block extent, the last blocks along that
/// axis are padded; padding slots lie outside the domain.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGeometry<const N: usize> {
    shape: [usize; N],
    strides: [usize; N],
    shape_i: [usize; N],
    inner_strides: [usize; N],
    shape_o: [usize; N],
    outer_strides: [usize; N],
    periodic: [bool; N],
    h: f64,
}

fn row_major_strides<const N: usize>(shape: [usize; N]) -> [usize; N] {
    let mut strides = [1usize; N];
    for d in (0..N.saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

fn unflatten<const N: usize>(mut flat: usize, strides: &[usize; N]) -> [usize; N] {
    let mut idx = [0usize; N];
    for d in 0..N {
        idx[d] = flat / strides[d];
        flat %= strides[d];
    }
    idx
}

fn flatten<const N: usize>(idx: [usize; N], strides: &[usize; N]) -> usize {
    idx.iter().zip(strides.iter()).map(|(i, s)| i * s).sum()
}

impl<const N: usize> BlockGeometry<N> {
    /// Partition a grid of `shape` points into blocks of `shape_i` points.
    ///
    /// # Errors
    /// Returns an error if an axis has fewer than 2 points, a block extent is
    /// zero, the spacing is not positive, a periodic axis is not a multiple of
    /// the block extent, or `prod(shape_i)` is not a multiple of [`BITSET_WIDTH`].
    pub fn new(shape: [usize; N], shape_i: [usize; N], periodic: [bool; N], h: f64) -> Result<Self> {
        assert!(N >= 1, "BlockGeometry needs at least one axis");

        if !h.is_finite() || h <= 0.0 {
            return Err(EikonalError::InvalidGridSpacing(h));
        }

        for (axis, &size) in shape.iter().enumerate() {
            if size < 2 {
                return Err(EikonalError::InvalidGridShape { axis, size });
            }
        }

        for axis in 0..N {
            let (block, grid) = (shape_i[axis], shape[axis]);
            if block == 0 || (periodic[axis] && grid % block != 0) {
                return Err(EikonalError::InvalidBlockShape { axis, block, grid });
            }
        }

        let size_i: usize = shape_i.iter().product();
        if size_i % BITSET_WIDTH != 0 {
            return Err(EikonalError::BlockAlignment {
                size_i,
                width: BITSET_WIDTH,
            });
        }

        let mut shape_o = [0usize; N];
        for d in 0..N {
            shape_o[d] = shape[d].div_ceil(shape_i[d]);
        }

        Ok(BlockGeometry {
            shape,
            strides: row_major_strides(shape),
            shape_i,
            inner_strides: row_major_strides(shape_i),
            shape_o,
            outer_strides: row_major_strides(shape_o),
            periodic,
            h,
        })
    }

    /// Grid extent along each axis.
    pub fn shape(&self) -> [usize; N] {
        self.shape
    }

    /// Block extent along each axis.
    pub fn shape_i(&self) -> [usize; N] {
        self.shape_i
    }

    /// Number of blocks along each axis.
    pub fn shape_o(&self) -> [usize; N] {
        self.shape_o
    }

    /// Points per block.
    pub fn size_i(&self) -> usize {
        self.shape_i.iter().product()
    }

    /// Total number of blocks.
    pub fn size_o(&self) -> usize {
        self.shape_o.iter().product()
    }

    /// Per-axis periodicity.
    pub fn periodic(&self) -> [bool; N] {
        self.periodic
    }

    /// Uniform grid spacing.
    pub fn spacing(&self) -> f64 {
        self.h
    }

    /// Number of grid points (padding excluded).
    pub fn num_points(&self) -> usize {
        self.shape.iter().product()
    }

    /// Length of a block-expanded array (padding included).
    pub fn expanded_len(&self) -> usize {
        self.size_o() * self.size_i()
    }

    /// Row-major index of a grid point.
    pub fn row_major_index(&self, point: [usize; N]) -> usize {
        flatten(point, &self.strides)
    }

    /// Grid point at a row-major index.
    pub fn point_from_row_major(&self, flat: usize) -> [usize; N] {
        unflatten(flat, &self.strides)
    }

    /// N-dimensional block indices of a flat block ID.
    pub fn block_id_to_nd(&self, block_id: usize) -> [usize; N] {
        unflatten(block_id, &self.outer_strides)
    }

    /// Flat block ID of N-dimensional block indices.
    pub fn nd_to_block_id(&self, block_idx: [usize; N]) -> usize {
        flatten(block_idx, &self.outer_strides)
    }

    /// Inner (within-block) N-dimensional index of an inner linear index.
    pub fn inner_to_nd(&self, inner: usize) -> [usize; N] {
        unflatten(inner, &self.inner_strides)
    }

    /// Block ID containing a grid point.
    pub fn block_of_point(&self, point: [usize; N]) -> usize {
        let mut block_idx = [0usize; N];
        for d in 0..N {
            block_idx[d] = point[d] / self.shape_i[d];
        }
        self.nd_to_block_id(block_idx)
    }

    /// Position of a grid point in block-expanded arrays.
    pub fn expanded_index(&self, point: [usize; N]) -> usize {
        let mut block_idx = [0usize; N];
        let mut inner_idx = [0usize; N];
        for d in 0..N {
            block_idx[d] = point[d] / self.shape_i[d];
            inner_idx[d] = point[d] % self.shape_i[d];
        }
        self.nd_to_block_id(block_idx) * self.size_i() + flatten(inner_idx, &self.inner_strides)
    }

    /// Grid point stored at a block-expanded position, or `None` for padding.
    pub fn point_at(&self, expanded: usize) -> Option<[usize; N]> {
        let size_i = self.size_i();
        self.point_in_block(expanded / size_i, expanded % size_i)
    }

    /// Grid point at an inner index of a block, or `None` for padding.
    pub fn point_in_block(&self, block: usize, inner: usize) -> Option<[usize; N]> {
        let block_idx = self.block_id_to_nd(block);
        let inner_idx = self.inner_to_nd(inner);
        let mut point = [0usize; N];
        for d in 0..N {
            point[d] = block_idx[d] * self.shape_i[d] + inner_idx[d];
            if point[d] >= self.shape[d] {
                return None;
            }
        }
        Some(point)
    }

    /// The point `offset` steps away from `point` along `axis`, wrapping on
    /// periodic axes. `None` when it falls outside a non-periodic axis.
    pub fn offset_point(&self, point: [usize; N], axis: usize, offset: isize) -> Option<[usize; N]> {
        let n = self.shape[axis] as isize;
        let mut target = point[axis] as isize + offset;
        if self.periodic[axis] {
            target = target.rem_euclid(n);
        } else if target < 0 || target >= n {
            return None;
        }
        let mut out = point;
        out[axis] = target as usize;
        Some(out)
    }

    /// Face-adjacent block across the low (`high == false`) or high face along `axis`.
    pub fn neighbor_block(&self, block: usize, axis: usize, high: bool) -> Option<usize> {
        let mut block_idx = self.block_id_to_nd(block);
        let n = self.shape_o[axis];
        let b = block_idx[axis];
        block_idx[axis] = match (high, self.periodic[axis]) {
            (false, _) if b > 0 => b - 1,
            (false, true) => n - 1,
            (true, _) if b + 1 < n => b + 1,
            (true, true) => 0,
            _ => return None,
        };
        let id = self.nd_to_block_id(block_idx);
        if id == block {
            None
        } else {
            Some(id)
        }
    }

    /// True if the continuous coordinate lies in the domain (periodic axes always do).
    pub fn contains(&self, x: [f64; N]) -> bool {
        (0..N).all(|d| {
            x[d].is_finite()
                && (self.periodic[d] || (x[d] >= 0.0 && x[d] <= (self.shape[d] - 1) as f64))
        })
    }

    /// Wrap periodic coordinates into `[0, shape)`.
    pub fn wrap(&self, mut x: [f64; N]) -> [f64; N] {
        for d in 0..N {
            if self.periodic[d] {
                let n = self.shape[d] as f64;
                let r = x[d].rem_euclid(n);
                // rem_euclid rounds tiny negative inputs up to exactly n
                x[d] = if r >= n { 0.0 } else { r };
            }
        }
        x
    }

    /// Nearest grid point of a continuous coordinate (which must be in the domain).
    pub fn nearest_point(&self, x: [f64; N]) -> [usize; N] {
        let x = self.wrap(x);
        let mut p = [0usize; N];
        for d in 0..N {
            let r = x[d].round() as usize;
            p[d] = if self.periodic[d] {
                r % self.shape[d]
            } else {
                r.min(self.shape[d] - 1)
            };
        }
        p
    }

    /// Reorder a row-major array into block-expanded layout, filling padding with `fill`.
    pub fn to_expanded<T: Copy>(&self, data: &[T], fill: T) -> Vec<T> {
        let mut out = vec![fill; self.expanded_len()];
        for (flat, &v) in data.iter().enumerate().take(self.num_points()) {
            out[self.expanded_index(self.point_from_row_major(flat))] = v;
        }
        out
    }

    /// Reorder a block-expanded array into row-major layout, dropping padding.
    pub fn from_expanded<T: Copy>(&self, data: &[T]) -> Vec<T> {
        (0..self.num_points())
            .map(|flat| data[self.expanded_index(self.point_from_row_major(flat))])
            .collect()
    }
}

/// Call `f` for every integer point of the box `lo..=hi` (inclusive, signed).
pub(crate) fn for_each_in_box<const N: usize>(lo: [isize; N], hi: [isize; N], mut f: impl FnMut([isize; N])) {
    if (0..N).any(|d| lo[d] > hi[d]) {
        return;
    }
    let mut cur = lo;
    loop {
        f(cur);
        let mut d = N;
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            if cur[d] < hi[d] {
                cur[d] += 1;
                break;
            }
            cur[d] = lo[d];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry_2d(shape: [usize; 2], shape_i: [usize; 2]) -> BlockGeometry<2> {
        BlockGeometry::new(shape, shape_i, [false; 2], 1.0).unwrap()
    }

    #[test]
    fn expanded_roundtrip_2d() {
        let g = geometry_2d([12, 8], [4, 4]);
        for flat in 0..g.num_points() {
            let p = g.point_from_row_major(flat);
            let e = g.expanded_index(p);
            assert_eq!(g.point_at(e), Some(p), "flat={} point={:?}", flat, p);
        }
    }

    #[test]
    fn expanded_roundtrip_3d_with_padding() {
        let g = BlockGeometry::<3>::new([5, 6, 3], [2, 2, 2], [false; 3], 1.0).unwrap();
        assert_eq!(g.shape_o(), [3, 3, 2]);
        assert_eq!(g.expanded_len(), 18 * 8);
        let mut seen = vec![false; g.expanded_len()];
        for flat in 0..g.num_points() {
            let e = g.expanded_index(g.point_from_row_major(flat));
            assert!(!seen[e]);
            seen[e] = true;
        }
        let padding = (0..g.expanded_len()).filter(|&e| g.point_at(e).is_none()).count();
        assert_eq!(padding, g.expanded_len() - g.num_points());
    }

    #[test]
    fn block_id_nd_roundtrip() {
        let g = geometry_2d([20, 20], [8, 8]);
        for id in 0..g.size_o() {
            assert_eq!(g.nd_to_block_id(g.block_id_to_nd(id)), id);
        }
    }

    #[test]
    fn partial_blocks_are_padded() {
        // 20x20 grid with block size 8: the last block row holds points 16..20
        let g = geometry_2d([20, 20], [8, 8]);
        let last = g.nd_to_block_id([2, 2]);
        assert_eq!(g.point_in_block(last, 0), Some([16, 16]));
        assert_eq!(g.point_in_block(last, 3), Some([16, 19]));
        assert_eq!(g.point_in_block(last, 4), None);
        assert_eq!(g.point_in_block(last, 4 * 8), None);
    }

    #[test]
    fn wrap_stays_below_the_period() {
        let g = BlockGeometry::<2>::new([16, 16], [8, 8], [true, false], 1.0).unwrap();
        assert_eq!(g.wrap([-1e-17, 3.0]), [0.0, 3.0]);
        assert_eq!(g.wrap([-0.5, -0.5]), [15.5, -0.5]);
        assert_eq!(g.wrap([16.0, 2.0]), [0.0, 2.0]);
    }

    #[test]
    fn rejects_misaligned_blocks() {
        let result = BlockGeometry::<2>::new([4, 4], [2, 2], [false; 2], 1.0);
        assert!(matches!(
            result,
            Err(EikonalError::BlockAlignment { size_i: 4, width: 8 })
        ));
    }

    #[test]
    fn rejects_invalid_shapes() {
        assert!(matches!(
            BlockGeometry::<2>::new([1, 10], [4, 2], [false; 2], 1.0),
            Err(EikonalError::InvalidGridShape { axis: 0, size: 1 })
        ));
        assert!(matches!(
            BlockGeometry::<2>::new([10, 10], [0, 8], [false; 2], 1.0),
            Err(EikonalError::InvalidBlockShape { axis: 0, .. })
        ));
        assert!(matches!(
            BlockGeometry::<2>::new([10, 10], [4, 4], [false, true], 1.0),
            Err(EikonalError::InvalidBlockShape { axis: 1, .. })
        ));
        assert!(matches!(
            BlockGeometry::<2>::new([10, 10], [4, 4], [false; 2], 0.0),
            Err(EikonalError::InvalidGridSpacing(_))
        ));
    }

    #[test]
    fn offset_point_wraps_periodic_axes() {
        let g = BlockGeometry::<2>::new([8, 8], [4, 2], [false, true], 1.0).unwrap();
        assert_eq!(g.offset_point([0, 0], 0, -1), None);
        assert_eq!(g.offset_point([0, 0], 1, -1), Some([0, 7]));
        assert_eq!(g.offset_point([7, 7], 1, 2), Some([7, 1]));
        assert_eq!(g.offset_point([6, 3], 0, 1), Some([7, 3]));
    }

    #[test]
    fn neighbor_blocks() {
        let g = BlockGeometry::<2>::new([8, 8], [4, 2], [false, true], 1.0).unwrap();
        // shape_o = [2, 4]
        let b = g.nd_to_block_id([0, 0]);
        assert_eq!(g.neighbor_block(b, 0, false), None);
        assert_eq!(g.neighbor_block(b, 0, true), Some(g.nd_to_block_id([1, 0])));
        assert_eq!(g.neighbor_block(b, 1, false), Some(g.nd_to_block_id([0, 3])));
        assert_eq!(g.neighbor_block(b, 1, true), Some(g.nd_to_block_id([0, 1])));
    }

    #[test]
    fn expanded_layout_conversion() {
        let g = geometry_2d([3, 4], [2, 4]);
        let data: Vec<usize> = (0..12).collect();
        let expanded = g.to_expanded(&data, usize::MAX);
        assert_eq!(expanded.len(), 16);
        assert_eq!(expanded[..8], [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(expanded[8..12], [8, 9, 10, 11]);
        assert!(expanded[12..].iter().all(|&v| v == usize::MAX));
        assert_eq!(g.from_expanded(&expanded), data);
    }

    #[test]
    fn nearest_point_and_contains() {
        let g = BlockGeometry::<2>::new([8, 8], [4, 2], [false, true], 1.0).unwrap();
        assert!(g.contains([0.0, -3.0]));
        assert!(!g.contains([-0.1, 3.0]));
        assert!(!g.contains([7.5, 3.0]));
        assert_eq!(g.nearest_point([2.4, 7.6]), [2, 0]);
        assert_eq!(g.nearest_point([6.6, -0.2]), [7, 0]);
    }

    #[test]
    fn box_iteration_visits_all_points() {
        let mut visited = Vec::new();
        for_each_in_box([-1, 2], [0, 4], |p| visited.push(p));
        assert_eq!(visited, vec![[-1, 2], [-1, 3], [-1, 4], [0, 2], [0, 3], [0, 4]]);

        let mut count = 0;
        for_each_in_box([1, 1], [0, 3], |_| count += 1);
        assert_eq!(count, 0);
    }
}
