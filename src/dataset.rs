//! In-memory labeled dataset shared by every stage of the pipeline
//!
//! A [`Dataset`] mirrors the xarray layout of a Daymet file: a `time`
//! coordinate, an optional projected `y`/`x` grid, and a set of named data
//! variables (the variable axis), each an `ndarray::ArrayD<f32>` over
//! `[time, y, x]`, or over `[time]` once spatially aggregated. Missing values
//! are stored as `NaN`; readers and writers translate to and from `_FillValue`.

use crate::errors::{DaymetError, Result};
use crate::geometry::Crs;
use chrono::{NaiveDate, NaiveDateTime};
use ndarray::ArrayD;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub const TIME_DIM: &str = "time";
pub const Y_DIM: &str = "y";
pub const X_DIM: &str = "x";

/// Attribute value as carried through the pipeline, independent of the file format
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Strs(Vec<String>),
    Int(i64),
    Ints(Vec<i64>),
    Float(f64),
    Floats(Vec<f64>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Scalar numeric view; single-element lists count as scalars
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            AttrValue::Ints(v) if v.len() == 1 => Some(v[0] as f64),
            AttrValue::Floats(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    pub fn as_f64s(&self) -> Option<Vec<f64>> {
        match self {
            AttrValue::Int(v) => Some(vec![*v as f64]),
            AttrValue::Float(v) => Some(vec![*v]),
            AttrValue::Ints(v) => Some(v.iter().map(|&i| i as f64).collect()),
            AttrValue::Floats(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// JSON rendering used for Zarr `.zattrs`. Non-finite floats become the
    /// strings `"NaN"`, `"Infinity"` and `"-Infinity"`, as zarr-python does.
    pub fn to_json(&self) -> JsonValue {
        fn float(v: f64) -> JsonValue {
            if v.is_nan() {
                JsonValue::from("NaN")
            } else if v.is_infinite() {
                JsonValue::from(if v > 0.0 { "Infinity" } else { "-Infinity" })
            } else {
                JsonValue::from(v)
            }
        }
        match self {
            AttrValue::Str(s) => JsonValue::from(s.as_str()),
            AttrValue::Strs(v) => JsonValue::from(v.clone()),
            AttrValue::Int(v) => JsonValue::from(*v),
            AttrValue::Ints(v) => JsonValue::from(v.clone()),
            AttrValue::Float(v) => float(*v),
            AttrValue::Floats(v) => JsonValue::Array(v.iter().map(|&f| float(f)).collect()),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(value: Vec<f64>) -> Self {
        AttrValue::Floats(value)
    }
}

/// Ordered attribute map; ordering keeps written output deterministic
pub type Attributes = BTreeMap<String, AttrValue>;

/// A one-dimensional coordinate variable
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub values: Vec<f64>,
    pub attributes: Attributes,
}

impl Coordinate {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn units(&self) -> Option<&str> {
        self.attributes.get("units").and_then(AttrValue::as_str)
    }

    /// Absolute spacing between the first two values, if there are two
    pub fn spacing(&self) -> Option<f64> {
        match self.values.as_slice() {
            [a, b, ..] => Some((b - a).abs()),
            _ => None,
        }
    }

    /// Index of the first value differing from `other` by more than `tolerance`
    fn first_mismatch(&self, other: &Coordinate, tolerance: f64) -> Option<usize> {
        if self.values.len() != other.values.len() {
            return Some(self.values.len().min(other.values.len()));
        }
        self.values
            .iter()
            .zip(&other.values)
            .position(|(a, b)| (a - b).abs() > tolerance)
    }
}

/// Projected spatial grid of cell centres
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub y: Coordinate,
    pub x: Coordinate,
}

impl Grid {
    pub const TOLERANCE: f64 = 1e-6;

    pub fn new(y: Coordinate, x: Coordinate) -> Self {
        Self { y, x }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.y.len(), self.x.len())
    }

    /// Compare coordinate vectors; returns a description of the first difference
    pub fn check_matches(&self, other: &Grid) -> std::result::Result<(), String> {
        for (name, mine, theirs) in [(Y_DIM, &self.y, &other.y), (X_DIM, &self.x, &other.x)] {
            if mine.len() != theirs.len() {
                return Err(format!(
                    "{name} has {} cells, expected {}",
                    theirs.len(),
                    mine.len()
                ));
            }
            if let Some(i) = mine.first_mismatch(theirs, Self::TOLERANCE) {
                return Err(format!(
                    "{name}[{i}] is {}, expected {}",
                    theirs.values[i], mine.values[i]
                ));
            }
        }
        Ok(())
    }
}

/// A named data variable with its dimension names
#[derive(Debug, Clone)]
pub struct DataVariable {
    pub dims: Vec<String>,
    pub data: ArrayD<f32>,
    pub attributes: Attributes,
}

impl DataVariable {
    pub fn new(dims: &[&str], data: ArrayD<f32>) -> Self {
        Self {
            dims: dims.iter().map(|d| d.to_string()).collect(),
            data,
            attributes: Attributes::new(),
        }
    }

    /// Number of finite values
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }
}

/// CF grid-mapping variable (e.g. `lambert_conformal_conic`)
#[derive(Debug, Clone, PartialEq)]
pub struct GridMapping {
    pub name: String,
    pub attributes: Attributes,
}

impl GridMapping {
    /// Derive a CRS description from CF grid-mapping attributes.
    /// `units` is the unit of the projected x/y coordinates.
    pub fn crs(&self, units: Option<&str>) -> Option<Crs> {
        for key in ["crs_wkt", "spatial_ref", "proj4", "proj4text"] {
            if let Some(text) = self.attributes.get(key).and_then(AttrValue::as_str) {
                return Some(Crs::parse(text));
            }
        }

        let get = |key: &str| self.attributes.get(key).and_then(AttrValue::as_f64);
        let mapping_name = self
            .attributes
            .get("grid_mapping_name")
            .and_then(AttrValue::as_str)?;

        match mapping_name {
            "latitude_longitude" => Some(Crs::Epsg(4326)),
            "lambert_conformal_conic" => {
                let parallels = self
                    .attributes
                    .get("standard_parallel")
                    .and_then(AttrValue::as_f64s)
                    .unwrap_or_default();
                let mut proj = String::from("+proj=lcc");
                if let Some(lat_1) = parallels.first() {
                    proj.push_str(&format!(" +lat_1={lat_1}"));
                }
                let lat_2 = parallels.get(1).or(parallels.first());
                if let Some(lat_2) = lat_2 {
                    proj.push_str(&format!(" +lat_2={lat_2}"));
                }
                if let Some(lat_0) = get("latitude_of_projection_origin") {
                    proj.push_str(&format!(" +lat_0={lat_0}"));
                }
                if let Some(lon_0) = get("longitude_of_central_meridian") {
                    proj.push_str(&format!(" +lon_0={lon_0}"));
                }
                proj.push_str(&format!(
                    " +x_0={} +y_0={}",
                    get("false_easting").unwrap_or(0.0),
                    get("false_northing").unwrap_or(0.0)
                ));
                match (get("semi_major_axis"), get("inverse_flattening")) {
                    (Some(a), Some(rf)) if (a - 6_378_137.0).abs() > 1e-3 || (rf - 298.257_223_563).abs() > 1e-6 => {
                        proj.push_str(&format!(" +a={a} +rf={rf}"));
                    }
                    _ => proj.push_str(" +ellps=WGS84"),
                }
                if let Some(units) = units {
                    proj.push_str(&format!(" +units={units}"));
                }
                proj.push_str(" +no_defs");
                Some(Crs::parse(&proj))
            }
            other => Some(Crs::Other(other.to_string())),
        }
    }
}

/// Labeled multi-variable dataset for one region
#[derive(Debug, Clone)]
pub struct Dataset {
    pub time: Coordinate,
    pub grid: Option<Grid>,
    pub variables: BTreeMap<String, DataVariable>,
    pub attributes: Attributes,
    pub grid_mapping: Option<GridMapping>,
}

impl Dataset {
    pub fn new(time: Coordinate, grid: Option<Grid>) -> Self {
        Self {
            time,
            grid,
            variables: BTreeMap::new(),
            attributes: Attributes::new(),
            grid_mapping: None,
        }
    }

    pub fn time_len(&self) -> usize {
        self.time.len()
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    /// Shape a data variable must have to fit this dataset's coordinates
    pub fn expected_shape(&self) -> Vec<usize> {
        match &self.grid {
            Some(grid) => vec![self.time.len(), grid.y.len(), grid.x.len()],
            None => vec![self.time.len()],
        }
    }

    /// Add a data variable after checking its shape against the coordinates
    pub fn insert_variable(&mut self, name: &str, variable: DataVariable) -> Result<()> {
        let expected = self.expected_shape();
        if variable.data.shape() != expected.as_slice() {
            return Err(DaymetError::Read {
                path: name.into(),
                message: format!(
                    "variable '{name}' has shape {:?}, coordinates imply {:?}",
                    variable.data.shape(),
                    expected
                ),
            });
        }
        self.variables.insert(name.to_string(), variable);
        Ok(())
    }

    /// Native CRS as declared by the grid mapping, if any
    pub fn crs(&self) -> Option<Crs> {
        let units = self.grid.as_ref().and_then(|g| g.x.units());
        self.grid_mapping.as_ref().and_then(|gm| gm.crs(units))
    }

    /// Rescale projected coordinates given in kilometres to metres
    ///
    /// Returns `true` when a conversion took place.
    pub fn normalize_projected_units(&mut self) -> bool {
        let Some(grid) = self.grid.as_mut() else {
            return false;
        };
        let mut changed = false;
        for coord in [&mut grid.y, &mut grid.x] {
            if coord.units() == Some("km") {
                coord.values.iter_mut().for_each(|v| *v *= 1000.0);
                coord
                    .attributes
                    .insert("units".to_string(), AttrValue::from("m"));
                changed = true;
            }
        }
        changed
    }

    /// Time units of this dataset, if a parsable `units` attribute exists
    pub fn time_units(&self) -> Option<TimeUnits> {
        self.time.units().and_then(|u| TimeUnits::parse(u).ok())
    }

    /// Human-readable first and last timestamps
    pub fn time_range(&self) -> Option<(String, String)> {
        let first = *self.time.values.first()?;
        let last = *self.time.values.last()?;
        Some(match self.time_units() {
            Some(units) => (units.format(first), units.format(last)),
            None => (first.to_string(), last.to_string()),
        })
    }
}

/// Supported CF time steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStep {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeStep {
    fn seconds(self) -> f64 {
        match self {
            TimeStep::Days => 86_400.0,
            TimeStep::Hours => 3_600.0,
            TimeStep::Minutes => 60.0,
            TimeStep::Seconds => 1.0,
        }
    }
}

/// Parsed CF time units, `<step> since <epoch>`
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnits {
    pub step: TimeStep,
    pub epoch: NaiveDateTime,
}

impl TimeUnits {
    pub fn parse(units: &str) -> Result<Self> {
        let invalid = || DaymetError::Read {
            path: "time".into(),
            message: format!("unsupported time units '{units}'"),
        };
        let (step, since) = units.trim().split_once(" since ").ok_or_else(invalid)?;
        let step = match step.trim().to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => TimeStep::Days,
            "hours" | "hour" | "hr" | "h" => TimeStep::Hours,
            "minutes" | "minute" | "min" => TimeStep::Minutes,
            "seconds" | "second" | "sec" | "s" => TimeStep::Seconds,
            _ => return Err(invalid()),
        };

        let since = since
            .trim()
            .trim_end_matches("UTC")
            .trim_end_matches('Z')
            .trim_end_matches("+00:00")
            .trim();
        let epoch = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(since, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(since, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .ok_or_else(invalid)?;

        Ok(Self { step, epoch })
    }

    fn epoch_seconds(&self) -> f64 {
        self.epoch.and_utc().timestamp() as f64
    }

    /// Seconds since the Unix epoch for a value in these units
    pub fn to_unix_seconds(&self, value: f64) -> f64 {
        self.epoch_seconds() + value * self.step.seconds()
    }

    /// Inverse of [`TimeUnits::to_unix_seconds`]
    pub fn from_unix_seconds(&self, seconds: f64) -> f64 {
        (seconds - self.epoch_seconds()) / self.step.seconds()
    }

    /// Format a value as an ISO-8601 timestamp
    pub fn format(&self, value: f64) -> String {
        let secs = self.to_unix_seconds(value);
        chrono::DateTime::from_timestamp(secs.round() as i64, 0)
            .map(|dt| dt.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_else(|| value.to_string())
    }
}
