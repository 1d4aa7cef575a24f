//! daymet_proc: per-region processing of Daymet climate rasters
//!
//! Maps a directory tree of yearly, per-variable Daymet NetCDF files back to
//! one dataset per region, and reshapes those datasets for hydrological use:
//! clipping to basin polygons and reducing them to per-timestep series.
//! Results are written as NetCDF files or Zarr stores.
//!
//! ## Key Features
//!
//! - **File Discovery**: Daymet v3 and v4 naming conventions, two directory layouts
//! - **Combining**: time concatenation with duplicate removal, variable outer join
//! - **Clipping**: bounding-box crop plus point-in-polygon masking
//! - **Aggregation**: NaN-aware spatial mean, min and max, parallel over timesteps
//! - **NetCDF & Zarr Output**: deterministic writers for both formats
//! - **Region Isolation**: one failing region never stops the others
//!
//! ## Module Organization
//!
//! - [`locator`]: file discovery and naming conventions
//! - [`combine`]: merging a region's files into one [`dataset::Dataset`]
//! - [`clip`]: clipping datasets to region geometries
//! - [`statistics`]: spatial aggregation
//! - [`netcdf_io`] and [`zarr_io`]: readers and writers
//! - [`dispatch`]: per-region orchestration and the run report
//! - [`config`]: configuration files and validation
//! - [`parallel`]: thread pool and concurrency settings
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use daymet_proc::prelude::*;
//!
//! # async fn example() -> daymet_proc::Result<()> {
//! let config = ProcessingConfig::from_path("combine.toml")?;
//! let plan = config.validate(Operation::Combine)?;
//! let report = Dispatcher::new(plan).run().await?;
//! report.print();
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod clip;
pub mod combine;
pub mod config;
pub mod data_source;
pub mod dataset;
pub mod dispatch;
pub mod errors;
pub mod geometry;
pub mod locator;
pub mod logging;
pub mod metadata;
pub mod netcdf_io;
pub mod parallel;
pub mod region;
pub mod statistics;
pub mod zarr_io;

pub use errors::{DaymetError, Result};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::clip::{ClipOutcome, Clipper};
    pub use crate::combine::{combine_datasets, combine_region};
    pub use crate::config::{OperationPlan, OperationTask, ProcessingConfig};
    pub use crate::data_source::{DatasetReader, DatasetWriter, OutputFormat};
    pub use crate::dataset::{Coordinate, DataVariable, Dataset, Grid};
    pub use crate::dispatch::{Dispatcher, Operation, RegionOutcome, RegionState, RunReport, SkipReason, Stage};
    pub use crate::errors::{DaymetError, Result};
    pub use crate::geometry::{Crs, GeoJsonSource, GeometrySource, LccReprojector, RegionGeometry, Reprojector};
    pub use crate::locator::{DaymetVersion, FileLocator, NamingConvention, RegionFilter};
    pub use crate::netcdf_io::{NetcdfReader, NetcdfWriter};
    pub use crate::parallel::ParallelConfig;
    pub use crate::region::RegionId;
    pub use crate::statistics::{aggregate, AggregationMode};
    pub use crate::zarr_io::ZarrWriter;
}
