// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors that can occur during solver configuration, assembly, I/O, or execution.
#[derive(Debug)]
pub enum EikonalError {
    /// Grid shape is invalid (an axis is too small).
    InvalidGridShape {
        /// The axis index.
        axis: usize,
        /// The size provided.
        size: usize,
    },
    /// Block shape is invalid (zero extent, wrong rank, or incompatible with periodicity).
    InvalidBlockShape {
        /// The axis index.
        axis: usize,
        /// The block extent provided.
        block: usize,
        /// The grid extent on that axis.
        grid: usize,
    },
    /// Points per block are not a multiple of the bitset packing width.
    BlockAlignment {
        /// Number of points per block.
        size_i: usize,
        /// Required packing width.
        width: usize,
    },
    /// Grid spacing is not positive and finite.
    InvalidGridSpacing(f64),
    /// An option value or a combination of options is invalid.
    InvalidConfiguration {
        /// The offending option.
        option: String,
        /// Explanation of why it's invalid.
        reason: String,
    },
    /// The model family/dimension is not available.
    UnsupportedModel {
        /// The model name, e.g. `Riemann2`.
        model: String,
        /// Explanation (unknown dimension, no stencil in this backend, ...).
        reason: String,
    },
    /// The adaptive scheduler has neither seeds nor trigger points to start from.
    MissingSeeds,
    /// The outer iteration cap was reached before convergence.
    NonConvergence {
        /// The outer iteration cap.
        nitermax_o: usize,
    },
    /// Cost value is not positive (or is NaN).
    InvalidCost {
        /// The flat index of the invalid value.
        index: usize,
        /// The invalid value.
        value: f64,
    },
    /// Velocity value is not positive and finite.
    InvalidVelocity {
        /// The flat index of the invalid value.
        index: usize,
        /// The invalid value.
        value: f64,
    },
    /// Seed location or value is invalid.
    InvalidSeed {
        /// The seed coordinates.
        coord: Vec<f64>,
        /// Explanation of why it's invalid.
        reason: String,
    },
    /// Geodesic tip location is invalid.
    InvalidTip {
        /// The tip coordinates.
        coord: Vec<f64>,
        /// Explanation of why it's invalid.
        reason: String,
    },
    /// Array shape does not match expected shape.
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// Unsupported data type in file.
    UnsupportedDtype(String),
    /// Unsupported file format (unrecognized extension).
    UnsupportedFileFormat(String),
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl EikonalError {
    /// True for errors raised while validating the configuration, before any launch.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EikonalError::InvalidGridShape { .. }
                | EikonalError::InvalidBlockShape { .. }
                | EikonalError::BlockAlignment { .. }
                | EikonalError::InvalidGridSpacing(_)
                | EikonalError::InvalidConfiguration { .. }
                | EikonalError::UnsupportedModel { .. }
        )
    }

    pub(crate) fn config(option: &str, reason: impl Into<String>) -> Self {
        EikonalError::InvalidConfiguration {
            option: option.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for EikonalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EikonalError::InvalidGridShape { axis, size } => {
                write!(
                    f,
                    "invalid grid shape: axis {} has size {} (must be >= 2)",
                    axis, size
                )
            }
            EikonalError::InvalidBlockShape { axis, block, grid } => {
                write!(
                    f,
                    "invalid block shape: axis {} block extent {} for grid extent {}",
                    axis, block, grid
                )
            }
            EikonalError::BlockAlignment { size_i, width } => {
                write!(
                    f,
                    "block size {} is not a multiple of the bitset width {}",
                    size_i, width
                )
            }
            EikonalError::InvalidGridSpacing(h) => {
                write!(
                    f,
                    "invalid grid spacing: {} (must be positive and finite)",
                    h
                )
            }
            EikonalError::InvalidConfiguration { option, reason } => {
                write!(f, "invalid configuration for '{}': {}", option, reason)
            }
            EikonalError::UnsupportedModel { model, reason } => {
                write!(f, "unsupported model {}: {}", model, reason)
            }
            EikonalError::MissingSeeds => {
                write!(f, "adaptive solver requires at least one seed or trigger point")
            }
            EikonalError::NonConvergence { nitermax_o } => {
                write!(
                    f,
                    "solver did not converge within {} outer iterations",
                    nitermax_o
                )
            }
            EikonalError::InvalidCost { index, value } => {
                write!(
                    f,
                    "invalid cost at index {}: {} (must be positive)",
                    index, value
                )
            }
            EikonalError::InvalidVelocity { index, value } => {
                write!(
                    f,
                    "invalid velocity at index {}: {} (must be positive and finite)",
                    index, value
                )
            }
            EikonalError::InvalidSeed { coord, reason } => {
                write!(f, "invalid seed at {:?}: {}", coord, reason)
            }
            EikonalError::InvalidTip { coord, reason } => {
                write!(f, "invalid tip at {:?}: {}", coord, reason)
            }
            EikonalError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            EikonalError::UnsupportedDtype(dtype) => {
                write!(f, "unsupported dtype: {}", dtype)
            }
            EikonalError::UnsupportedFileFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            EikonalError::IoError(e) => write!(f, "I/O error: {}", e),
            EikonalError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for EikonalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EikonalError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EikonalError {
    fn from(e: std::io::Error) -> Self {
        EikonalError::IoError(e)
    }
}

/// Convenience type alias for Results with EikonalError.
pub type Result<T> = std::result::Result<T, EikonalError>;

/// Recoverable conditions reported alongside a result instead of aborting it.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverWarning {
    /// The outer iteration cap was reached; the field holds the best-effort state.
    NonConvergence {
        /// The outer iteration cap.
        nitermax_o: usize,
    },
    /// Some tips were still being traced when the length budget ran out.
    GeodesicLengthExceeded {
        /// Indices of the affected tips.
        tips: Vec<usize>,
        /// The maximum number of points per path.
        max_length: usize,
    },
}

impl fmt::Display for SolverWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverWarning::NonConvergence { nitermax_o } => {
                write!(
                    f,
                    "no convergence after {} outer iterations, keeping current field",
                    nitermax_o
                )
            }
            SolverWarning::GeodesicLengthExceeded { tips, max_length } => {
                write!(
                    f,
                    "{} geodesic(s) reached the length limit of {} points",
                    tips.len(),
                    max_length
                )
            }
        }
    }
}
