// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::ops::Range;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

/// Storage width of the primary value field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// Values are rounded to `f32` when stored.
    Single,
    /// Values are stored as `f64`.
    #[default]
    Double,
}

/// A stored value: primary part plus the integer multiprecision correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Encoded {
    /// Primary value, already rounded to the storage precision.
    pub primary: f64,
    /// Number of `multip_step` quanta (zero without multiprecision).
    pub correction: i32,
}

/// How effective values map to stored (primary, correction) pairs.
///
/// With multiprecision the effective value is `primary + correction * step`,
/// where `primary` only carries the sub-step remainder, so single precision
/// storage keeps its relative accuracy far from the seeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Encoding {
    /// Storage width of the primary part.
    pub precision: Precision,
    /// Quantum of the correction field, `None` without multiprecision.
    pub multip_step: Option<f64>,
}

impl Encoding {
    /// Plain encoding without correction.
    pub fn plain(precision: Precision) -> Self {
        Encoding {
            precision,
            multip_step: None,
        }
    }

    /// Round a value to the primary storage width.
    #[inline]
    pub fn round(&self, v: f64) -> f64 {
        match self.precision {
            Precision::Single => v as f32 as f64,
            Precision::Double => v,
        }
    }

    /// Split a value into its stored representation.
    #[inline]
    pub fn encode(&self, v: f64) -> Encoded {
        match self.multip_step {
            Some(step) if v.is_finite() => {
                let q = (v / step)
                    .floor()
                    .clamp(i32::MIN as f64, i32::MAX as f64);
                Encoded {
                    primary: self.round(v - q * step),
                    correction: q as i32,
                }
            }
            _ => Encoded {
                primary: self.round(v),
                correction: 0,
            },
        }
    }

    /// Effective value of a stored representation.
    #[inline]
    pub fn decode(&self, e: Encoded) -> f64 {
        match self.multip_step {
            Some(step) if e.correction != 0 => e.primary + e.correction as f64 * step,
            _ => e.primary,
        }
    }

    /// The value that storing `v` would produce.
    #[inline]
    pub fn quantize(&self, v: f64) -> f64 {
        self.decode(self.encode(v))
    }
}

/// Value field in block-expanded layout.
///
/// Values are stored atomically so that blocks can read their neighbors while
/// those are being written during an in-place launch. Each slot is only ever
/// written by the task owning its block.
pub struct ValueField {
    primary: Box<[AtomicU64]>,
    correction: Option<Box<[AtomicI32]>>,
    encoding: Encoding,
}

impl ValueField {
    /// A field of `len` slots, all at +infinity.
    pub fn new(len: usize, encoding: Encoding) -> Self {
        let primary: Box<[AtomicU64]> = (0..len)
            .map(|_| AtomicU64::new(f64::INFINITY.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let correction = encoding.multip_step.map(|_| {
            (0..len)
                .map(|_| AtomicI32::new(0))
                .collect::<Vec<_>>()
                .into_boxed_slice()
        });
        ValueField {
            primary,
            correction,
            encoding,
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    /// True if the field has no slots.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// The encoding used for stored values.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Stored representation of a slot.
    #[inline]
    pub fn load(&self, i: usize) -> Encoded {
        Encoded {
            primary: f64::from_bits(self.primary[i].load(Ordering::Relaxed)),
            correction: self
                .correction
                .as_ref()
                .map_or(0, |c| c[i].load(Ordering::Relaxed)),
        }
    }

    /// Effective value of a slot.
    #[inline]
    pub fn get(&self, i: usize) -> f64 {
        self.encoding.decode(self.load(i))
    }

    /// Store a representation produced by this field's encoding.
    #[inline]
    pub fn store(&self, i: usize, e: Encoded) {
        self.primary[i].store(e.primary.to_bits(), Ordering::Relaxed);
        if let Some(c) = &self.correction {
            c[i].store(e.correction, Ordering::Relaxed);
        }
    }

    /// Encode and store a value.
    pub fn set(&self, i: usize, v: f64) {
        self.store(i, self.encoding.encode(v));
    }

    /// Lower a slot to `val` if that is smaller than the current value.
    /// Returns true if the slot was updated.
    pub fn lower(&self, i: usize, val: f64) -> bool {
        let encoded = self.encoding.encode(val);
        let val = self.encoding.decode(encoded);
        if self.correction.is_some() {
            // The (primary, correction) pair is not updated atomically: only the
            // owner of the slot may lower it.
            if self.get(i) <= val {
                return false;
            }
            self.store(i, encoded);
            return true;
        }
        let atom = &self.primary[i];
        let mut current = atom.load(Ordering::Relaxed);
        loop {
            if f64::from_bits(current) <= val {
                return false;
            }
            match atom.compare_exchange_weak(
                current,
                val.to_bits(),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Copy a range of slots (typically one block) from another field.
    pub fn copy_range_from(&self, other: &ValueField, range: Range<usize>) {
        for i in range {
            self.store(i, other.load(i));
        }
    }

    /// Copy every slot from another field of the same length.
    pub fn copy_from(&self, other: &ValueField) {
        self.copy_range_from(other, 0..self.len());
    }

    /// Effective values of all slots.
    pub fn to_vec(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}

impl Clone for ValueField {
    fn clone(&self) -> Self {
        let copy = ValueField::new(self.len(), self.encoding);
        copy.copy_from(self);
        copy
    }
}

impl std::fmt::Debug for ValueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueField")
            .field("len", &self.len())
            .field("encoding", &self.encoding)
            .finish()
    }
}
