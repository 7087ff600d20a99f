use ndarray::{arr1, Array1};
use ndarray_stats::errors::MinMaxError;
use ndarray_stats::QuantileExt;

use crate::config::StopCriterion;
use crate::error::{ImdpError, Result};

/// Distance between the value of a state before (`a`) and after (`b`) a
/// sweep. The relative distance is taken against the old value; a value
/// leaving zero counts as not converged.
pub fn diff(a: f64, b: f64, criterion: StopCriterion) -> f64 {
    match criterion {
        StopCriterion::Absolute => (a - b).abs(),
        StopCriterion::Relative => {
            if a == b {
                0.0
            } else if a == 0.0 {
                f64::INFINITY
            } else {
                (a - b).abs() / a.abs()
            }
        }
    }
}

pub fn opt_absolute_diff_vect(a: &[f64], b: &[f64]) -> Array1<f64> {
    let c: Array1<f64> = arr1(b) - &arr1(a);
    c.mapv(f64::abs)
}

/// Distance of a single state, failing when a value has turned into NaN.
pub fn checked_diff(a: f64, b: f64, criterion: StopCriterion, state: usize) -> Result<f64> {
    let d = diff(a, b, criterion);
    if d.is_nan() {
        return Err(ImdpError::numeric(format!("value of state {} is not a number", state)));
    }
    Ok(d)
}

/// Largest per-state distance between two value vectors. A NaN anywhere
/// is an error, never a converged sweep.
pub fn max_diff_vect(a: &[f64], b: &[f64], criterion: StopCriterion) -> Result<f64> {
    let c: Array1<f64> = match criterion {
        StopCriterion::Absolute => opt_absolute_diff_vect(a, b),
        StopCriterion::Relative => a.iter().zip(b.iter()).map(|(x, y)| diff(*x, *y, criterion)).collect(),
    };
    match c.max() {
        Ok(m) if !m.is_nan() => Ok(*m),
        Err(MinMaxError::EmptyInput) => Ok(0.0),
        _ => Err(ImdpError::numeric("value vector contains NaN")),
    }
}
