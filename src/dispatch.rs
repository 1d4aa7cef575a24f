//! Operation dispatch
//!
//! For one operation and a validated [`OperationPlan`] the dispatcher
//! discovers the regions to work on and runs every region through its
//! stages:
//!
//! ```text
//! Discovered -> Combined -> [Clipped | Aggregated] -> Written
//!      \            \               \                   \
//!       +------------+---------------+-------------------+--> Skipped(stage, reason)
//! ```
//!
//! Regions are independent. Each one runs as a blocking task on the tokio
//! runtime, at most [`ParallelConfig::region_concurrency`] at a time, and a
//! failure only ends that region. Outcomes are streamed back as they finish
//! and collected into a [`RunReport`] ordered by region.
//!
//! [`ParallelConfig::region_concurrency`]: crate::parallel::ParallelConfig::region_concurrency

use crate::clip::{ClipOutcome, Clipper};
use crate::combine::combine_region;
use crate::config::{OperationPlan, OperationTask};
use crate::data_source::{DatasetReader, DatasetWriter};
use crate::dataset::Dataset;
use crate::errors::{DaymetError, Result};
use crate::geometry::{GeoJsonSource, GeometryIndex, GeometrySource, LccReprojector, RegionGeometry, Reprojector};
use crate::locator::{Discovery, FileLocator, RegionFiles, RegionFilter};
use crate::metadata::log_metadata;
use crate::netcdf_io::NetcdfReader;
use crate::region::RegionId;
use crate::statistics::aggregate;
use futures::{Stream, StreamExt};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Operations the CLI can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Operation {
    /// Merge yearly per-variable files into one dataset per region
    #[value(alias = "merge")]
    Combine,
    /// Clip combined datasets to region polygons
    Clip,
    /// Spatially aggregate combined datasets to time series
    Aggregate,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Combine => "combine",
            Self::Clip => "clip",
            Self::Aggregate => "aggregate",
        }
    }

    /// The stage doing this operation's actual work
    const fn main_stage(self) -> Stage {
        match self {
            Self::Combine => Stage::Combine,
            Self::Clip => Stage::Clip,
            Self::Aggregate => Stage::Aggregate,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing stage of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Discovery,
    Combine,
    Read,
    Clip,
    Aggregate,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discovery => "discovery",
            Stage::Combine => "combine",
            Stage::Read => "read",
            Stage::Clip => "clip",
            Stage::Aggregate => "aggregate",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Why a region did not produce output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No input file was found for the region
    NoFiles,
    /// The geo file has no polygon for the region
    NoGeometry,
    /// The polygon does not overlap the dataset's grid
    NoOverlap,
    /// The stage failed with an error
    Failed(String),
}

impl SkipReason {
    /// Whether the skip is caused by an error rather than missing data
    pub fn is_failure(&self) -> bool {
        matches!(self, SkipReason::Failed(_))
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoFiles => f.write_str("no input files found"),
            SkipReason::NoGeometry => f.write_str("no geometry for region"),
            SkipReason::NoOverlap => f.write_str("geometry does not overlap the grid"),
            SkipReason::Failed(message) => f.write_str(message),
        }
    }
}

/// Where a region is in its pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionState {
    Discovered,
    Combined,
    Clipped,
    Aggregated,
    Written(PathBuf),
    Skipped { stage: Stage, reason: SkipReason },
}

/// Final state of one region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionOutcome {
    pub region: RegionId,
    pub state: RegionState,
}

impl RegionOutcome {
    pub fn written(region: RegionId, path: PathBuf) -> Self {
        Self {
            region,
            state: RegionState::Written(path),
        }
    }

    pub fn skipped(region: RegionId, stage: Stage, reason: SkipReason) -> Self {
        Self {
            region,
            state: RegionState::Skipped { stage, reason },
        }
    }

    pub fn output(&self) -> Option<&PathBuf> {
        match &self.state {
            RegionState::Written(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_written(&self) -> bool {
        self.output().is_some()
    }

    pub fn is_failure(&self) -> bool {
        matches!(&self.state, RegionState::Skipped { reason, .. } if reason.is_failure())
    }

    fn log(&self) {
        match &self.state {
            RegionState::Written(path) => info!(region = %self.region, "Wrote {}", path.display()),
            RegionState::Skipped { stage, reason } if reason.is_failure() => {
                error!(region = %self.region, "Failed during {stage}: {reason}")
            }
            RegionState::Skipped { stage, reason } => {
                warn!(region = %self.region, "Skipped during {stage}: {reason}")
            }
            other => debug!(region = %self.region, "Finished in state {other:?}"),
        }
    }
}

/// Per-region outcomes of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub operation: Operation,
    /// Sorted by region
    pub outcomes: Vec<RegionOutcome>,
    /// Files ignored during discovery because they match no naming convention
    pub ignored_files: usize,
}

impl RunReport {
    pub fn new(operation: Operation, mut outcomes: Vec<RegionOutcome>, ignored_files: usize) -> Self {
        outcomes.sort_by(|a, b| a.region.cmp(&b.region));
        Self {
            operation,
            outcomes,
            ignored_files,
        }
    }

    pub fn get(&self, region: &RegionId) -> Option<&RegionOutcome> {
        self.outcomes.iter().find(|o| &o.region == region)
    }

    pub fn written(&self) -> impl Iterator<Item = &RegionOutcome> {
        self.outcomes.iter().filter(|o| o.is_written())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &RegionOutcome> {
        self.outcomes.iter().filter(|o| !o.is_written())
    }

    pub fn written_count(&self) -> usize {
        self.written().count()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(RegionOutcome::is_failure)
    }

    pub fn print(&self) {
        println!("\n===== {} report =====", self.operation);
        for outcome in &self.outcomes {
            match &outcome.state {
                RegionState::Written(path) => println!("✅ {}: {}", outcome.region, path.display()),
                RegionState::Skipped { stage, reason } if reason.is_failure() => {
                    println!("❌ {}: {stage} failed: {reason}", outcome.region)
                }
                RegionState::Skipped { stage, reason } => {
                    println!("⏭️  {}: skipped at {stage}: {reason}", outcome.region)
                }
                other => println!("❔ {}: {other:?}", outcome.region),
            }
        }
        println!(
            "\n📊 {} of {} region(s) written, {} skipped",
            self.written_count(),
            self.outcomes.len(),
            self.outcomes.len() - self.written_count()
        );
        if self.ignored_files > 0 {
            println!("   {} file(s) ignored during discovery", self.ignored_files);
        }
    }
}

/// Work item for one region
#[derive(Debug, Clone)]
pub struct RegionJob {
    pub region: RegionId,
    pub files: RegionFiles,
    pub geometry: Option<RegionGeometry>,
}

/// Regions ready to run plus those already skipped during discovery
#[derive(Debug, Default)]
struct Prepared {
    jobs: Vec<RegionJob>,
    skipped: Vec<RegionOutcome>,
    ignored: usize,
}

/// Runs an operation over all selected regions
#[derive(Clone)]
pub struct Dispatcher {
    plan: Arc<OperationPlan>,
    reader: Arc<dyn DatasetReader>,
    writer: Arc<dyn DatasetWriter>,
    geometry_source: Option<Arc<dyn GeometrySource>>,
    reprojector: Arc<dyn Reprojector>,
}

impl Dispatcher {
    /// Dispatcher with the NetCDF reader, the plan's writer and, for clip,
    /// the plan's GeoJSON file
    pub fn new(plan: OperationPlan) -> Self {
        let writer: Arc<dyn DatasetWriter> = Arc::from(plan.output_format.writer(plan.zarr_time_chunk));
        let geometry_source: Option<Arc<dyn GeometrySource>> = match &plan.task {
            OperationTask::Clip {
                geom_path,
                id_col,
                id_width,
            } => Some(Arc::new(GeoJsonSource::new(geom_path, id_col, *id_width))),
            _ => None,
        };
        Self {
            plan: Arc::new(plan),
            reader: Arc::new(NetcdfReader::new()),
            writer,
            geometry_source,
            reprojector: Arc::new(LccReprojector),
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn DatasetReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn DatasetWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_geometry_source(mut self, source: Arc<dyn GeometrySource>) -> Self {
        self.geometry_source = Some(source);
        self
    }

    pub fn with_reprojector(mut self, reprojector: Arc<dyn Reprojector>) -> Self {
        self.reprojector = reprojector;
        self
    }

    pub fn plan(&self) -> &OperationPlan {
        &self.plan
    }

    /// Run the operation for every selected region
    ///
    /// Only errors that invalidate the whole run are returned; region
    /// failures end up in the report.
    pub async fn run(&self) -> Result<RunReport> {
        let this = self.clone();
        let prepared = tokio::task::spawn_blocking(move || this.prepare())
            .await
            .map_err(|e| DaymetError::ThreadPoolError(format!("discovery task failed: {e}")))?
            .map_err(|e| {
                if e.is_run_fatal() {
                    e
                } else {
                    DaymetError::config(format!("discovery failed: {e}"))
                }
            })?;

        info!(
            "{}: {} region(s) to process, {} skipped during discovery",
            self.plan.operation,
            prepared.jobs.len(),
            prepared.skipped.len()
        );
        for outcome in &prepared.skipped {
            outcome.log();
        }

        let mut outcomes = prepared.skipped;
        let stream = self.outcomes(prepared.jobs);
        futures::pin_mut!(stream);
        while let Some(outcome) = stream.next().await {
            outcome.log();
            outcomes.push(outcome);
        }

        Ok(RunReport::new(self.plan.operation, outcomes, prepared.ignored))
    }

    /// Process jobs concurrently, yielding outcomes in completion order
    pub fn outcomes(&self, jobs: Vec<RegionJob>) -> impl Stream<Item = RegionOutcome> {
        let limit = self.plan.parallel.region_concurrency();
        let this = self.clone();

        async_stream::stream! {
            let tasks = futures::stream::iter(jobs.into_iter().map(|job| {
                let worker = this.clone();
                async move {
                    let region = job.region.clone();
                    let stage = worker.plan.operation.main_stage();
                    match tokio::task::spawn_blocking(move || worker.process(job)).await {
                        Ok(outcome) => outcome,
                        Err(e) => RegionOutcome::skipped(
                            region,
                            stage,
                            SkipReason::Failed(format!("region task aborted: {e}")),
                        ),
                    }
                }
            }))
            .buffer_unordered(limit);
            futures::pin_mut!(tasks);

            while let Some(outcome) = tasks.next().await {
                yield outcome;
            }
        }
    }

    fn locator(&self) -> FileLocator {
        FileLocator::new(&self.plan.data_dir, self.plan.version)
    }

    /// Discover the regions of this run
    fn prepare(&self) -> Result<Prepared> {
        let filter = RegionFilter::new(&self.plan.ids);
        match &self.plan.task {
            OperationTask::Combine { variables } => {
                let discovery = self.locator().locate_yearly(&filter, variables)?;
                Ok(self.jobs_from(discovery, None))
            }
            OperationTask::Clip { .. } => {
                let source = self.geometry_source.as_ref().ok_or_else(|| {
                    DaymetError::config("clip requires a geometry source")
                })?;
                let geometries = source.load().map_err(|e| {
                    DaymetError::config(format!("cannot load region geometries: {e}"))
                })?;
                info!("Loaded {} region geometries", geometries.len());

                let filter = if self.plan.ids.is_empty() {
                    RegionFilter::new(&geometries.ids())
                } else {
                    filter
                };
                let discovery = self.locator().locate_combined(&filter)?;
                Ok(self.jobs_from(discovery, Some(&geometries)))
            }
            OperationTask::Aggregate { .. } => {
                let discovery = self.locator().locate_combined(&filter)?;
                Ok(self.jobs_from(discovery, None))
            }
        }
    }

    fn jobs_from(&self, discovery: Discovery, geometries: Option<&GeometryIndex>) -> Prepared {
        let mut prepared = Prepared {
            ignored: discovery.ignored.len(),
            ..Prepared::default()
        };
        for region in discovery.missing {
            prepared
                .skipped
                .push(RegionOutcome::skipped(region, Stage::Discovery, SkipReason::NoFiles));
        }

        for (region, files) in discovery.files {
            let geometry = match geometries {
                Some(index) => match index.get(&region) {
                    Some(geometry) => Some(geometry.clone()),
                    None => {
                        prepared.skipped.push(RegionOutcome::skipped(
                            region,
                            Stage::Discovery,
                            SkipReason::NoGeometry,
                        ));
                        continue;
                    }
                },
                None => None,
            };
            debug!(region = %region, state = ?RegionState::Discovered, "{} file group(s)", files.len());
            prepared.jobs.push(RegionJob {
                region,
                files,
                geometry,
            });
        }
        prepared
    }

    /// Run all stages of one region; blocking
    pub fn process(&self, job: RegionJob) -> RegionOutcome {
        let region = job.region.clone();
        match self.run_stages(&job) {
            Ok(path) => RegionOutcome::written(region, path),
            Err((stage, reason)) => RegionOutcome::skipped(region, stage, reason),
        }
    }

    fn run_stages(&self, job: &RegionJob) -> std::result::Result<PathBuf, (Stage, SkipReason)> {
        let region = &job.region;
        let failed = |stage: Stage| move |e: DaymetError| (stage, SkipReason::Failed(e.to_string()));

        let dataset = match &self.plan.task {
            OperationTask::Combine { variables } => {
                let dataset = combine_region(region, &job.files, self.reader.as_ref())
                    .map_err(failed(Stage::Combine))?;
                log_metadata(region, &dataset, variables);
                self.advance(region, RegionState::Combined);
                dataset
            }
            OperationTask::Clip { .. } => {
                let dataset = self.read_combined(job).map_err(failed(Stage::Read))?;
                self.advance(region, RegionState::Combined);
                let geometry = job
                    .geometry
                    .as_ref()
                    .ok_or((Stage::Clip, SkipReason::NoGeometry))?;
                match Clipper::new(self.reprojector.as_ref())
                    .clip(dataset, geometry)
                    .map_err(failed(Stage::Clip))?
                {
                    ClipOutcome::Clipped(dataset) => {
                        self.advance(region, RegionState::Clipped);
                        dataset
                    }
                    ClipOutcome::NoOverlap => return Err((Stage::Clip, SkipReason::NoOverlap)),
                }
            }
            OperationTask::Aggregate { mode } => {
                let dataset = self.read_combined(job).map_err(failed(Stage::Read))?;
                self.advance(region, RegionState::Combined);
                let dataset = aggregate(&dataset, *mode).map_err(failed(Stage::Aggregate))?;
                self.advance(region, RegionState::Aggregated);
                dataset
            }
        };

        let path = self.plan.output_dir.join(self.output_name(region));
        self.writer
            .write(&dataset, &path)
            .map_err(failed(Stage::Write))?;
        Ok(path)
    }

    /// Read the combined file of a region; with several candidates the first wins
    fn read_combined(&self, job: &RegionJob) -> Result<Dataset> {
        let descriptor = job
            .files
            .values()
            .flatten()
            .next()
            .ok_or_else(|| DaymetError::NoFiles {
                region: job.region.to_string(),
                dir: self.plan.data_dir.clone(),
            })?;
        self.reader.read(&descriptor.path)
    }

    fn advance(&self, region: &RegionId, state: RegionState) {
        debug!(region = %region, state = ?state, "Region advanced");
    }

    /// Output file or store name of a region, postfixed when writing in place
    pub fn output_name(&self, region: &RegionId) -> String {
        let name = self
            .plan
            .output_format
            .file_name(self.plan.version.convention(), region);
        match self.plan.output_postfix() {
            Some(postfix) => match name.rsplit_once('.') {
                Some((stem, extension)) => format!("{stem}{postfix}.{extension}"),
                None => format!("{name}{postfix}"),
            },
            None => name,
        }
    }
}
