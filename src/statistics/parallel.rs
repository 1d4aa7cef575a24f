//! Parallel reductions over the spatial axes of `[time, y, x]` arrays
//!
//! Timesteps are independent, so each one is handed to a Rayon worker.
//! Non-finite cells are skipped; a timestep without a single finite cell
//! yields `NaN`.

use super::operations::AggregationMode;
use ndarray::{Array1, ArrayD, ArrayViewD, Axis};
use rayon::prelude::*;
use tracing::trace;

/// Reduce all axes but the first in parallel over the first axis
pub fn parallel_spatial_reduce(data: &ArrayD<f32>, mode: AggregationMode) -> Array1<f32> {
    trace!(
        "Reducing {} timesteps with {mode} across {} threads",
        data.len_of(Axis(0)),
        rayon::current_num_threads()
    );

    let values: Vec<f32> = data
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|step| match mode {
            AggregationMode::Mean => nan_mean(step),
            AggregationMode::Min => nan_fold(step, f32::min),
            AggregationMode::Max => nan_fold(step, f32::max),
        })
        .collect();

    Array1::from(values)
}

/// Mean of the finite values, accumulated in f64
pub fn nan_mean(values: ArrayViewD<'_, f32>) -> f32 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0_f64, 0_u64), |(sum, count), &v| (sum + f64::from(v), count + 1));

    if count > 0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        {
            (sum / count as f64) as f32
        }
    } else {
        f32::NAN
    }
}

fn nan_fold(values: ArrayViewD<'_, f32>, pick: fn(f32, f32) -> f32) -> f32 {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .reduce(pick)
        .unwrap_or(f32::NAN)
}
