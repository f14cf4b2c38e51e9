// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::Path;

use ndarray::{Array2, ArrayD, IxDyn};

use crate::error::{EikonalError, Result};
use crate::geodesic::GeodesicReport;

/// Load a row-major field from a .npy file, promoting `f32` to `f64`.
pub fn load_npy_field(path: &Path, expected_shape: &[usize]) -> Result<Vec<f64>> {
    let arr: ArrayD<f64> = match ndarray_npy::read_npy(path) {
        Ok(a) => a,
        Err(_) => {
            let arr32: ArrayD<f32> = ndarray_npy::read_npy(path)
                .map_err(|e| EikonalError::UnsupportedDtype(format!("{}", e)))?;
            arr32.mapv(|v| v as f64)
        }
    };

    let got_shape: Vec<usize> = arr.shape().to_vec();
    if got_shape != expected_shape {
        return Err(EikonalError::ShapeMismatch {
            expected: expected_shape.to_vec(),
            got: got_shape,
        });
    }

    // Fortran-order files would otherwise come out column-major.
    Ok(arr.as_standard_layout().to_owned().into_raw_vec())
}

/// Save a row-major field of the given shape to a .npy file.
pub fn save_npy_field(values: &[f64], shape: &[usize], path: &Path) -> Result<()> {
    let arr = ArrayD::from_shape_vec(IxDyn(shape), values.to_vec())
        .map_err(|e| EikonalError::Other(format!("shape error: {}", e)))?;
    ndarray_npy::write_npy(path, &arr)
        .map_err(|e| EikonalError::Other(format!("npy write error: {}", e)))?;
    Ok(())
}

/// Save traced paths as an `(points, 1 + N)` array of rows `[tip, x_0 .. x_{N-1}]`.
pub fn save_geodesics<const N: usize>(report: &GeodesicReport<N>, path: &Path) -> Result<()> {
    let rows: usize = report.paths.iter().map(Vec::len).sum();
    let mut data = Vec::with_capacity(rows * (N + 1));
    for (tip, path) in report.paths.iter().enumerate() {
        for x in path {
            data.push(tip as f64);
            data.extend_from_slice(x);
        }
    }
    let arr = Array2::from_shape_vec((rows, N + 1), data)
        .map_err(|e| EikonalError::Other(format!("shape error: {}", e)))?;
    ndarray_npy::write_npy(path, &arr)
        .map_err(|e| EikonalError::Other(format!("npy write error: {}", e)))?;
    Ok(())
}

/// Convert a speed field to a cost field (element-wise `1/v`).
pub fn velocity_to_cost(velocity: &[f64]) -> Result<Vec<f64>> {
    let mut cost = Vec::with_capacity(velocity.len());
    for (index, &v) in velocity.iter().enumerate() {
        if !v.is_finite() || v <= 0.0 {
            return Err(EikonalError::InvalidVelocity { index, value: v });
        }
        cost.push(1.0 / v);
    }
    Ok(cost)
}

fn require_npy(path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(()),
        Some(ext) => Err(EikonalError::UnsupportedFileFormat(ext.to_string())),
        None => Err(EikonalError::UnsupportedFileFormat("(no extension)".to_string())),
    }
}

/// Load a cost field, checking the file format first.
pub fn load_cost(path: &Path, expected_shape: &[usize]) -> Result<Vec<f64>> {
    require_npy(path)?;
    load_npy_field(path, expected_shape)
}

/// Load a speed field and convert it to cost.
pub fn load_velocity_as_cost(path: &Path, expected_shape: &[usize]) -> Result<Vec<f64>> {
    require_npy(path)?;
    velocity_to_cost(&load_npy_field(path, expected_shape)?)
}

/// Save values, checking the file format first.
pub fn save_values(values: &[f64], shape: &[usize], path: &Path) -> Result<()> {
    require_npy(path)?;
    save_npy_field(values, shape, path)
}
