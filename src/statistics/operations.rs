//! Aggregation modes and the reduction trait

use crate::errors::{DaymetError, Result};
use ndarray::{Array1, ArrayD};
use std::fmt;
use std::str::FromStr;

/// Spatial aggregation applied per timestep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationMode {
    Mean,
    Min,
    Max,
}

impl AggregationMode {
    pub const ALL: [AggregationMode; 3] = [Self::Mean, Self::Min, Self::Max];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    /// CF `cell_methods` method name
    #[must_use]
    pub const fn cell_method(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Min => "minimum",
            Self::Max => "maximum",
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMode {
    type Err = DaymetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => Err(DaymetError::config(format!(
                "unsupported aggregation mode '{other}'. Supported modes: 'mean', 'min', 'max'"
            ))),
        }
    }
}

/// Arrays that can be collapsed over their trailing spatial axes
pub trait SpatialReduction {
    /// Reduce every axis but the first, one value per index of axis 0
    ///
    /// # Errors
    ///
    /// Returns an error if the array has fewer than two dimensions.
    fn reduce_spatial(&self, mode: AggregationMode) -> Result<Array1<f32>>;
}

impl SpatialReduction for ArrayD<f32> {
    fn reduce_spatial(&self, mode: AggregationMode) -> Result<Array1<f32>> {
        if self.ndim() < 2 {
            return Err(DaymetError::StatisticsError(format!(
                "cannot reduce spatial axes of an array with {} dimension(s)",
                self.ndim()
            )));
        }
        Ok(super::parallel::parallel_spatial_reduce(self, mode))
    }
}
