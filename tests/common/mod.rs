//! Shared fixtures: small Daymet-like datasets and files

#![allow(dead_code)]

use chrono::NaiveDate;
use daymet_proc::data_source::{DatasetReader, DatasetWriter};
use daymet_proc::dataset::{AttrValue, Coordinate, DataVariable, Dataset, Grid, GridMapping};
use daymet_proc::errors::{DaymetError, Result};
use daymet_proc::netcdf_io::NetcdfWriter;
use ndarray::{Array1, Array2, Array3};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const TIME_UNITS: &str = "days since 1950-01-01 00:00:00";

pub const DAYMET_PROJ: &str =
    "+proj=lcc +lat_1=25 +lat_2=60 +lat_0=42.5 +lon_0=-100 +x_0=0 +y_0=0 +ellps=WGS84 +units=m +no_defs";

/// Noon of the first `days` days of `year`, in [`TIME_UNITS`]
pub fn year_times(year: i32, days: usize) -> Vec<f64> {
    let epoch = NaiveDate::from_ymd_opt(1950, 1, 1).unwrap();
    let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
    let offset = (start - epoch).num_days() as f64;
    (0..days).map(|d| offset + d as f64 + 0.5).collect()
}

/// 1 km grid in metres, y descending like Daymet
pub fn test_grid(ny: usize, nx: usize) -> Grid {
    let y = (0..ny).map(|i| 1_000_000.0 - 1000.0 * i as f64).collect();
    let x = (0..nx).map(|j| -500_000.0 + 1000.0 * j as f64).collect();
    Grid::new(
        Coordinate::new(y)
            .with_attr("units", "m")
            .with_attr("standard_name", "projection_y_coordinate"),
        Coordinate::new(x)
            .with_attr("units", "m")
            .with_attr("standard_name", "projection_x_coordinate"),
    )
}

/// 1 km grid in metres centred on the projection origin
pub fn origin_grid(n: usize) -> Grid {
    let centre = (n as f64 - 1.0) / 2.0;
    let y = (0..n).map(|i| 1000.0 * (centre - i as f64)).collect();
    let x = (0..n).map(|j| 1000.0 * (j as f64 - centre)).collect();
    Grid::new(
        Coordinate::new(y)
            .with_attr("units", "m")
            .with_attr("standard_name", "projection_y_coordinate"),
        Coordinate::new(x)
            .with_attr("units", "m")
            .with_attr("standard_name", "projection_x_coordinate"),
    )
}

pub fn lcc_mapping() -> GridMapping {
    let mut mapping = GridMapping {
        name: "lambert_conformal_conic".to_string(),
        attributes: Default::default(),
    };
    let attrs = &mut mapping.attributes;
    attrs.insert("grid_mapping_name".into(), AttrValue::from("lambert_conformal_conic"));
    attrs.insert("standard_parallel".into(), AttrValue::from(vec![25.0, 60.0]));
    attrs.insert("longitude_of_central_meridian".into(), AttrValue::from(-100.0));
    attrs.insert("latitude_of_projection_origin".into(), AttrValue::from(42.5));
    attrs.insert("false_easting".into(), AttrValue::from(0.0));
    attrs.insert("false_northing".into(), AttrValue::from(0.0));
    attrs.insert("semi_major_axis".into(), AttrValue::from(6_378_137.0));
    attrs.insert("inverse_flattening".into(), AttrValue::from(298.257_223_563));
    mapping
}

/// Dataset with one `(time, y, x)` variable per name, filled by `value(var, t, y, x)`
pub fn make_dataset(
    variables: &[&str],
    times: Vec<f64>,
    grid: Grid,
    value: impl Fn(&str, usize, usize, usize) -> f32,
) -> Dataset {
    let shape = (times.len(), grid.y.len(), grid.x.len());
    let time = Coordinate::new(times)
        .with_attr("units", TIME_UNITS)
        .with_attr("calendar", "standard");
    let mut dataset = Dataset::new(time, Some(grid));
    dataset.grid_mapping = Some(lcc_mapping());
    dataset
        .attributes
        .insert("source".into(), AttrValue::from("daymet_proc tests"));

    for &name in variables {
        let data = Array3::from_shape_fn(shape, |(t, i, j)| value(name, t, i, j)).into_dyn();
        let mut variable = DataVariable::new(&["time", "y", "x"], data);
        variable
            .attributes
            .insert("units".into(), AttrValue::from(units_of(name)));
        variable
            .attributes
            .insert("grid_mapping".into(), AttrValue::from("lambert_conformal_conic"));
        dataset.insert_variable(name, variable).unwrap();
    }
    dataset
}

fn units_of(variable: &str) -> &'static str {
    match variable {
        "prcp" => "mm/day",
        "tmax" | "tmin" => "degrees C",
        _ => "1",
    }
}

/// Yearly dataset of one variable whose values encode the day index
pub fn yearly(variable: &str, year: i32, days: usize, grid: Grid) -> Dataset {
    make_dataset(&[variable], year_times(year, days), grid, move |_, t, _, _| {
        (year * 1000) as f32 + t as f32
    })
}

pub fn write_netcdf(dataset: &Dataset, path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    NetcdfWriter::new().write(dataset, path).unwrap();
}

/// Write a file the way the Daymet service delivers it: km coordinates,
/// `-9999` fill values and auxiliary `lat` and `yearday` variables
pub fn write_raw_daymet_file(path: &Path, variable: &str, year: i32, days: usize, ny: usize, nx: usize) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("time", days).unwrap();
    file.add_dimension("y", ny).unwrap();
    file.add_dimension("x", nx).unwrap();

    let times = year_times(year, days);
    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_attribute("units", TIME_UNITS).unwrap();
    time.put_attribute("calendar", "standard").unwrap();
    time.put_attribute("bounds", "time_bnds").unwrap();
    time.put_values(times.as_slice(), ..).unwrap();

    let y: Vec<f32> = (0..ny).map(|i| 1000.0 - i as f32).collect();
    let x: Vec<f32> = (0..nx).map(|j| -500.0 + j as f32).collect();
    let mut y_var = file.add_variable::<f32>("y", &["y"]).unwrap();
    y_var.put_attribute("units", "km").unwrap();
    y_var.put_values(y.as_slice(), ..).unwrap();
    let mut x_var = file.add_variable::<f32>("x", &["x"]).unwrap();
    x_var.put_attribute("units", "km").unwrap();
    x_var.put_values(x.as_slice(), ..).unwrap();

    let lat: Vec<f32> = vec![45.0; ny * nx];
    let mut lat_var = file.add_variable::<f32>("lat", &["y", "x"]).unwrap();
    lat_var.put_attribute("units", "degrees_north").unwrap();
    lat_var.put_values(lat.as_slice(), ..).unwrap();

    let yearday: Vec<i16> = (1..=days as i16).collect();
    let mut yearday_var = file.add_variable::<i16>("yearday", &["time"]).unwrap();
    yearday_var.put_values(yearday.as_slice(), ..).unwrap();

    let mut mapping = file.add_variable::<i32>("lambert_conformal_conic", &[]).unwrap();
    mapping
        .put_attribute("grid_mapping_name", "lambert_conformal_conic")
        .unwrap();
    mapping
        .put_attribute("standard_parallel", vec![25.0_f64, 60.0])
        .unwrap();
    mapping
        .put_attribute("longitude_of_central_meridian", -100.0_f64)
        .unwrap();
    mapping
        .put_attribute("latitude_of_projection_origin", 42.5_f64)
        .unwrap();
    mapping.put_attribute("false_easting", 0.0_f64).unwrap();
    mapping.put_attribute("false_northing", 0.0_f64).unwrap();
    mapping.put_attribute("semi_major_axis", 6_378_137.0_f64).unwrap();
    mapping
        .put_attribute("inverse_flattening", 298.257_223_563_f64)
        .unwrap();

    // first cell of every day is missing
    let values: Vec<f32> = (0..days * ny * nx)
        .map(|k| if k % (ny * nx) == 0 { -9999.0 } else { k as f32 })
        .collect();
    let mut data = file.add_variable::<f32>(variable, &["time", "y", "x"]).unwrap();
    data.put_attribute("_FillValue", -9999.0_f32).unwrap();
    data.put_attribute("missing_value", -9999.0_f32).unwrap();
    data.put_attribute("units", units_of(variable)).unwrap();
    data.put_attribute("grid_mapping", "lambert_conformal_conic").unwrap();
    data.put_attribute("coordinates", "lat lon").unwrap();
    data.put_values(values.as_slice(), ..).unwrap();

    file.add_attribute("source", "Daymet Software Version 4.0").unwrap();
}

/// Square polygon feature with the given id property
pub fn square_feature(id: &str, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> serde_json::Value {
    serde_json::json!({
        "type": "Feature",
        "properties": { "gauge_id": id },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [min_x, min_y], [max_x, min_y], [max_x, max_y], [min_x, max_y], [min_x, min_y]
            ]]
        }
    })
}

pub fn feature_collection(features: Vec<serde_json::Value>, crs: Option<&str>) -> String {
    let mut root = serde_json::json!({ "type": "FeatureCollection", "features": features });
    if let Some(name) = crs {
        root["crs"] = serde_json::json!({ "type": "name", "properties": { "name": name } });
    }
    root.to_string()
}

/// Reader serving datasets from memory, keyed by path
#[derive(Default)]
pub struct MemoryReader {
    datasets: HashMap<PathBuf, Dataset>,
}

impl MemoryReader {
    pub fn insert(&mut self, path: impl Into<PathBuf>, dataset: Dataset) {
        self.datasets.insert(path.into(), dataset);
    }
}

impl DatasetReader for MemoryReader {
    fn read(&self, path: &Path) -> Result<Dataset> {
        self.datasets.get(path).cloned().ok_or_else(|| DaymetError::Read {
            path: path.to_path_buf(),
            message: "not in memory".to_string(),
        })
    }
}

pub fn values_1d(dataset: &Dataset, variable: &str) -> Array1<f32> {
    dataset.variables[variable]
        .data
        .clone()
        .into_dimensionality()
        .unwrap()
}

/// One timestep of a variable as a 2-D array
pub fn step_2d(dataset: &Dataset, variable: &str, t: usize) -> Array2<f32> {
    dataset.variables[variable]
        .data
        .index_axis(ndarray::Axis(0), t)
        .to_owned()
        .into_dimensionality()
        .unwrap()
}

pub fn empty_file(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"").unwrap();
}
