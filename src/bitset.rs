// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::{BlockGeometry, BITSET_WIDTH};

/// One bit per block-expanded slot, packed into bytes.
///
/// Each block owns exactly `size_i / 8` words, so a block's bits never share a
/// word with another block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBitset {
    words: Vec<u8>,
}

impl BlockBitset {
    /// An all-clear bitset for the given geometry.
    pub fn for_geometry<const N: usize>(geometry: &BlockGeometry<N>) -> Self {
        let words_per_block = geometry.size_i() / BITSET_WIDTH;
        BlockBitset {
            words: vec![0; words_per_block * geometry.size_o()],
        }
    }

    /// Test the bit of a block-expanded slot.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        self.words[index / BITSET_WIDTH] & (1u8 << (index % BITSET_WIDTH)) != 0
    }

    /// Set the bit of a block-expanded slot.
    #[inline]
    pub fn set(&mut self, index: usize) {
        self.words[index / BITSET_WIDTH] |= 1u8 << (index % BITSET_WIDTH);
    }

    /// Bitwise OR another bitset of the same geometry into this one.
    pub fn union_with(&mut self, other: &BlockBitset) {
        debug_assert_eq!(self.words.len(), other.words.len());
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= *o;
        }
    }
}

/// Lock-free bitset used to record block activations during a launch.
pub(crate) struct AtomicBitset {
    bits: Box<[AtomicU64]>,
}

impl AtomicBitset {
    pub(crate) fn new(num_bits: usize) -> Self {
        let num_words = num_bits.div_ceil(64);
        let bits: Box<[AtomicU64]> = (0..num_words)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        AtomicBitset { bits }
    }

    /// Set the bit; returns true if it was previously clear.
    pub(crate) fn try_set(&self, id: usize) -> bool {
        let word = id / 64;
        let bit = 1u64 << (id % 64);
        let prev = self.bits[word].fetch_or(bit, Ordering::AcqRel);
        (prev & bit) == 0
    }

    /// Collect the set bits in ascending order and clear them.
    pub(crate) fn drain(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for (w, word) in self.bits.iter().enumerate() {
            let mut bits = word.swap(0, Ordering::AcqRel);
            while bits != 0 {
                let b = bits.trailing_zeros() as usize;
                out.push(w * 64 + b);
                bits &= bits - 1;
            }
        }
        out
    }
}
