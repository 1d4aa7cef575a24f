//! Data source abstraction for unified NetCDF and Zarr interfaces
//!
//! The pipeline only talks to storage through these two traits, so the
//! combiner and dispatcher can be driven by in-memory readers in tests.

use crate::dataset::Dataset;
use crate::errors::{DaymetError, Result};
use crate::locator::NamingConvention;
use crate::netcdf_io::NetcdfWriter;
use crate::region::RegionId;
use crate::zarr_io::ZarrWriter;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Loads a file into a [`Dataset`]
pub trait DatasetReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Dataset>;
}

/// Serializes a [`Dataset`]; writing the same dataset twice gives identical output
pub trait DatasetWriter: Send + Sync {
    fn format(&self) -> OutputFormat;

    fn write(&self, dataset: &Dataset, path: &Path) -> Result<()>;
}

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Netcdf,
    Zarr,
}

impl OutputFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Netcdf => "netcdf",
            Self::Zarr => "zarr",
        }
    }

    /// Writer for this format
    pub fn writer(self, zarr_time_chunk: usize) -> Box<dyn DatasetWriter> {
        match self {
            Self::Netcdf => Box::new(NetcdfWriter::new()),
            Self::Zarr => Box::new(ZarrWriter::new(zarr_time_chunk)),
        }
    }

    /// Output file (or store) name of a region's dataset
    pub fn file_name(self, convention: &dyn NamingConvention, region: &RegionId) -> String {
        match self {
            Self::Netcdf => convention.combined_file_name(region),
            Self::Zarr => convention.zarr_store_name(region),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = DaymetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "netcdf" => Ok(Self::Netcdf),
            "zarr" => Ok(Self::Zarr),
            other => Err(DaymetError::config(format!(
                "unsupported output format '{other}'. Supported formats: 'netcdf', 'zarr'"
            ))),
        }
    }
}
