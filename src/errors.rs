//! Centralized error handling for daymet_proc
//!
//! Errors fall into two groups. [`DaymetError::Configuration`] is raised during
//! pre-flight validation and aborts the whole run. Every other variant is
//! scoped to a single region: the dispatcher records it in the region's
//! outcome and carries on with the remaining regions.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for daymet_proc operations
#[derive(Debug, Error)]
pub enum DaymetError {
    /// Invalid or incomplete configuration, detected before any data I/O
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A requested region produced no matching files during discovery
    #[error("No Daymet files found for region '{region}' in {dir}")]
    NoFiles { region: String, dir: PathBuf },

    /// Inputs of one region do not share the same y/x coordinates
    #[error("Grid mismatch for region '{region}': {detail}")]
    GridMismatch { region: String, detail: String },

    /// A spatial operation was asked of a dataset without y/x coordinates
    #[error("Dataset for region '{region}' has no spatial grid")]
    NoGrid { region: String },

    /// Geometry and dataset CRS differ and no transform is available
    #[error("Cannot transform geometry CRS '{from}' into dataset CRS '{to}'")]
    CrsTransform { from: String, to: String },

    /// Writing an output file or store failed
    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },

    /// An input file could be opened but not interpreted as a Daymet dataset
    #[error("Cannot read dataset {path}: {message}")]
    Read { path: PathBuf, message: String },

    /// A reduction could not be applied to the data at hand
    #[error("Statistics error: {0}")]
    StatisticsError(String),

    /// NetCDF library errors
    #[error("NetCDF error: {0}")]
    NetCDFError(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),
}

impl DaymetError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        DaymetError::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole run rather than a single region
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            DaymetError::Configuration { .. } | DaymetError::ThreadPoolError(_)
        )
    }
}

/// Result type alias for daymet_proc operations
pub type Result<T> = std::result::Result<T, DaymetError>;
