//! Processing configuration
//!
//! A run is described by one TOML, YAML or JSON file:
//!
//! ```toml
//! dataDir = "/data/daymet"
//! outputDir = "/data/daymet/combined"
//! ids = ["01013500", 1022500]
//! version = "v4"
//! outputFormat = "netcdf"
//!
//! [operationParameters]
//! variables = ["prcp", "tmax"]
//! ```
//!
//! Deserialization only checks the shape of the file. Enum values, required
//! operation parameters and paths are checked by
//! [`ProcessingConfig::validate`], which turns the file into an
//! [`OperationPlan`] before any data is touched.

use crate::data_source::OutputFormat;
use crate::dispatch::Operation;
use crate::errors::{DaymetError, Result};
use crate::locator::DaymetVersion;
use crate::parallel::ParallelConfig;
use crate::region::RegionId;
use crate::statistics::AggregationMode;
use crate::zarr_io::ZarrWriter;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Raw configuration file contents
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ProcessingConfig {
    #[serde(alias = "rootDir")]
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub ids: Option<Vec<RegionId>>,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub operation_parameters: OperationParameters,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub max_concurrent_regions: Option<usize>,
    #[serde(default = "default_zarr_time_chunk")]
    pub zarr_time_chunk: usize,
    /// Accepted for compatibility with older YAML configs; logging is set up
    /// from `-v` and `RUST_LOG`
    #[serde(default)]
    pub logging_config: Option<PathBuf>,
}

/// Operation specific settings; which keys are required depends on the operation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct OperationParameters {
    /// combine: variables to merge, empty for all
    #[serde(default)]
    pub variables: Vec<String>,
    /// clip: path of the GeoJSON file holding region polygons
    pub geom_path: Option<PathBuf>,
    /// clip: feature property holding the region id
    pub id_col: Option<String>,
    /// Zero-pad numeric ids to this width
    pub id_width: Option<usize>,
    /// aggregate: mean, min or max
    pub aggregation_mode: Option<String>,
}

fn default_output_format() -> String {
    "netcdf".to_string()
}
fn default_version() -> String {
    "v4".to_string()
}
fn default_zarr_time_chunk() -> usize {
    ZarrWriter::DEFAULT_TIME_CHUNK
}

/// What an operation needs beyond the common settings
#[derive(Debug, Clone, PartialEq)]
pub enum OperationTask {
    Combine {
        variables: Vec<String>,
    },
    Clip {
        geom_path: PathBuf,
        id_col: String,
        id_width: Option<usize>,
    },
    Aggregate {
        mode: AggregationMode,
    },
}

/// A validated configuration for one operation
#[derive(Debug, Clone)]
pub struct OperationPlan {
    pub operation: Operation,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Selected regions, empty for all
    pub ids: Vec<RegionId>,
    pub version: DaymetVersion,
    pub output_format: OutputFormat,
    pub task: OperationTask,
    pub parallel: ParallelConfig,
    pub zarr_time_chunk: usize,
    /// Whether outputs land next to their inputs
    pub in_place: bool,
}

impl ProcessingConfig {
    /// Load a configuration file, TOML, YAML or JSON depending on its extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            DaymetError::config(format!("cannot read config file {}: {e}", path.display()))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parsed = match extension.as_deref() {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            Some("yml") | Some("yaml") => Self::from_yaml_str(&text),
            _ => {
                return Err(DaymetError::config(format!(
                    "config file {} must have a .toml, .yaml or .json extension",
                    path.display()
                )))
            }
        };

        parsed.map_err(|e| match e {
            DaymetError::Configuration { .. } => e,
            other => DaymetError::config(format!("invalid config file {}: {other}", path.display())),
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Check the configuration for `operation` and resolve it into a plan
    ///
    /// The output directory is created when missing. No data file is opened.
    pub fn validate(&self, operation: Operation) -> Result<OperationPlan> {
        let version: DaymetVersion = self.version.parse()?;
        let output_format: OutputFormat = self.output_format.parse()?;
        if let Some(path) = &self.logging_config {
            warn!("loggingConfig {} is ignored; use -v or RUST_LOG instead", path.display());
        }

        if !self.data_dir.is_dir() {
            return Err(DaymetError::config(format!(
                "dataDir {} does not exist or is not a directory",
                self.data_dir.display()
            )));
        }
        for (key, value) in [
            ("threads", self.threads),
            ("maxConcurrentRegions", self.max_concurrent_regions),
            ("zarrTimeChunk", Some(self.zarr_time_chunk)),
            ("idWidth", self.operation_parameters.id_width),
        ] {
            if value == Some(0) {
                return Err(DaymetError::config(format!("{key} must be at least 1")));
            }
        }

        let task = self.operation_task(operation)?;

        fs::create_dir_all(&self.output_dir).map_err(|e| {
            DaymetError::config(format!(
                "cannot create outputDir {}: {e}",
                self.output_dir.display()
            ))
        })?;
        let in_place = same_directory(&self.data_dir, &self.output_dir);

        let id_width = self.operation_parameters.id_width;
        let ids = self
            .ids
            .iter()
            .flatten()
            .map(|id| match id_width {
                Some(width) => id.zero_padded(width),
                None => id.clone(),
            })
            .collect();

        let plan = OperationPlan {
            operation,
            data_dir: self.data_dir.clone(),
            output_dir: self.output_dir.clone(),
            ids,
            version,
            output_format,
            task,
            parallel: ParallelConfig::new(self.threads, self.max_concurrent_regions),
            zarr_time_chunk: self.zarr_time_chunk,
            in_place,
        };
        info!(
            "Validated {} configuration: {} {} output, {} region(s) selected",
            operation,
            plan.version,
            plan.output_format,
            if plan.ids.is_empty() {
                "all".to_string()
            } else {
                plan.ids.len().to_string()
            }
        );
        Ok(plan)
    }

    fn operation_task(&self, operation: Operation) -> Result<OperationTask> {
        let params = &self.operation_parameters;
        match operation {
            Operation::Combine => Ok(OperationTask::Combine {
                variables: params.variables.clone(),
            }),
            Operation::Clip => {
                let geom_path = params.geom_path.clone().ok_or_else(|| {
                    DaymetError::config("clip requires operationParameters.geomPath")
                })?;
                if !geom_path.is_file() {
                    return Err(DaymetError::config(format!(
                        "geomPath {} does not exist",
                        geom_path.display()
                    )));
                }
                let id_col = params
                    .id_col
                    .clone()
                    .ok_or_else(|| DaymetError::config("clip requires operationParameters.idCol"))?;
                Ok(OperationTask::Clip {
                    geom_path,
                    id_col,
                    id_width: params.id_width,
                })
            }
            Operation::Aggregate => {
                let mode = params.aggregation_mode.as_deref().ok_or_else(|| {
                    DaymetError::config("aggregate requires operationParameters.aggregationMode")
                })?;
                Ok(OperationTask::Aggregate { mode: mode.parse()? })
            }
        }
    }
}

impl OperationPlan {
    /// Postfix appended to output names so outputs do not overwrite inputs
    pub fn output_postfix(&self) -> Option<String> {
        if !self.in_place {
            return None;
        }
        match &self.task {
            OperationTask::Combine { .. } => None,
            OperationTask::Clip { .. } => Some("_clipped".to_string()),
            OperationTask::Aggregate { mode } => Some(format!("_{mode}")),
        }
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => {
            debug!("Comparing {} and {} without canonicalization", a.display(), b.display());
            a == b
        }
    }
}
