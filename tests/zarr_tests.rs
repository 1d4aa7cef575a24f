//! Zarr store layout and contents

mod common;

use common::{make_dataset, test_grid, year_times};
use daymet_proc::data_source::{DatasetWriter, OutputFormat};
use daymet_proc::dataset::{AttrValue, Dataset};
use daymet_proc::errors::DaymetError;
use daymet_proc::zarr_io::ZarrWriter;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn sample() -> Dataset {
    let mut dataset = make_dataset(&["prcp", "tmax"], year_times(2015, 5), test_grid(2, 3), |v, t, i, j| {
        let base = if v == "prcp" { 0.0 } else { 1000.0 };
        base + (t * 100 + i * 10 + j) as f32
    });
    dataset
        .variables
        .get_mut("prcp")
        .unwrap()
        .attributes
        .insert("_FillValue".into(), AttrValue::Float(-9999.0));
    dataset
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

fn chunk_names(array_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(array_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

#[test]
fn test_store_metadata_layout() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("001_daymet_v4_na.zarr");
    ZarrWriter::new(2).write(&sample(), &store).unwrap();

    assert_eq!(read_json(&store.join(".zgroup")), serde_json::json!({ "zarr_format": 2 }));
    assert_eq!(read_json(&store.join(".zattrs"))["source"], "daymet_proc tests");

    let consolidated = read_json(&store.join(".zmetadata"));
    assert_eq!(consolidated["zarr_consolidated_format"], 1);
    let metadata = consolidated["metadata"].as_object().unwrap();
    for key in [
        ".zgroup",
        ".zattrs",
        "time/.zarray",
        "y/.zattrs",
        "x/.zarray",
        "lambert_conformal_conic/.zarray",
        "prcp/.zarray",
        "tmax/.zattrs",
    ] {
        assert!(metadata.contains_key(key), "missing {key}");
    }
    assert_eq!(metadata["prcp/.zarray"], read_json(&store.join("prcp/.zarray")));
}

#[test]
fn test_data_variables_are_chunked_along_time() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("chunked.zarr");
    ZarrWriter::new(2).write(&sample(), &store).unwrap();

    let zarray = read_json(&store.join("prcp/.zarray"));
    assert_eq!(zarray["shape"], serde_json::json!([5, 2, 3]));
    assert_eq!(zarray["chunks"], serde_json::json!([2, 2, 3]));
    assert_eq!(zarray["dtype"], "<f4");
    assert_eq!(zarray["fill_value"], "NaN");
    assert_eq!(zarray["order"], "C");
    assert!(zarray["compressor"].is_null());

    assert_eq!(chunk_names(&store.join("prcp")), vec!["0.0.0", "1.0.0", "2.0.0"]);

    // the last chunk holds one timestep and is padded with NaN
    let last = fs::read(store.join("prcp/2.0.0")).unwrap();
    assert_eq!(last.len(), 2 * 2 * 3 * 4);
    let values: Vec<f32> = last
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    assert_eq!(values[0], 400.0);
    assert_eq!(values[5], 412.0);
    assert!(values[6..].iter().all(|v| v.is_nan()));

    let first = fs::read(store.join("tmax/0.0.0")).unwrap();
    assert_eq!(f32::from_le_bytes([first[4], first[5], first[6], first[7]]), 1001.0);
}

#[test]
fn test_coordinates_are_written_whole() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("coords.zarr");
    ZarrWriter::new(2).write(&sample(), &store).unwrap();

    let time = read_json(&store.join("time/.zarray"));
    assert_eq!(time["chunks"], serde_json::json!([5]));
    assert_eq!(time["dtype"], "<f8");
    assert_eq!(chunk_names(&store.join("time")), vec!["0"]);
    assert_eq!(fs::read(store.join("time/0")).unwrap().len(), 5 * 8);

    let mapping = read_json(&store.join("lambert_conformal_conic/.zarray"));
    assert_eq!(mapping["shape"], serde_json::json!([]));
    assert_eq!(mapping["dtype"], "<i4");
    assert_eq!(fs::read(store.join("lambert_conformal_conic/0")).unwrap().len(), 4);
}

#[test]
fn test_array_attributes() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("attrs.zarr");
    ZarrWriter::default().write(&sample(), &store).unwrap();

    let prcp = read_json(&store.join("prcp/.zattrs"));
    assert_eq!(prcp["_ARRAY_DIMENSIONS"], serde_json::json!(["time", "y", "x"]));
    assert_eq!(prcp["units"], "mm/day");
    assert_eq!(prcp["grid_mapping"], "lambert_conformal_conic");
    assert!(prcp.get("_FillValue").is_none());

    let time = read_json(&store.join("time/.zattrs"));
    assert_eq!(time["_ARRAY_DIMENSIONS"], serde_json::json!(["time"]));
    assert_eq!(time["units"], common::TIME_UNITS);

    let mapping = read_json(&store.join("lambert_conformal_conic/.zattrs"));
    assert_eq!(mapping["_ARRAY_DIMENSIONS"], serde_json::json!([]));
    assert_eq!(mapping["standard_parallel"], serde_json::json!([25.0, 60.0]));

    // the default chunk spans the whole five-day series
    let zarray = read_json(&store.join("prcp/.zarray"));
    assert_eq!(zarray["chunks"], serde_json::json!([5, 2, 3]));
}

#[test]
fn test_aggregated_series_store() {
    let dataset = daymet_proc::statistics::aggregate(&sample(), daymet_proc::statistics::AggregationMode::Max).unwrap();
    let dir = tempdir().unwrap();
    let store = dir.path().join("series.zarr");
    ZarrWriter::new(2).write(&dataset, &store).unwrap();

    assert!(!store.join("y").exists());
    assert!(!store.join("lambert_conformal_conic").exists());
    let zarray = read_json(&store.join("prcp/.zarray"));
    assert_eq!(zarray["shape"], serde_json::json!([5]));
    assert_eq!(zarray["chunks"], serde_json::json!([5]));
    assert_eq!(chunk_names(&store.join("prcp")), vec!["0"]);
}

#[test]
fn test_writes_are_deterministic_and_replace_existing_stores() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("again.zarr");
    let writer = ZarrWriter::new(3);
    assert_eq!(writer.time_chunk(), 3);
    assert_eq!(writer.format(), OutputFormat::Zarr);

    writer.write(&sample(), &store).unwrap();
    let first: Vec<(String, Vec<u8>)> = ["prcp/0.0.0", "prcp/1.0.0", ".zmetadata", "tmax/.zattrs"]
        .iter()
        .map(|p| (p.to_string(), fs::read(store.join(p)).unwrap()))
        .collect();

    fs::write(store.join("stale"), b"left over").unwrap();
    writer.write(&sample(), &store).unwrap();
    for (path, bytes) in first {
        assert_eq!(fs::read(store.join(&path)).unwrap(), bytes, "{path} changed");
    }
    assert!(!store.join("stale").exists());
}

#[test]
fn test_time_chunk_is_at_least_one() {
    assert_eq!(ZarrWriter::new(0).time_chunk(), 1);
    assert_eq!(ZarrWriter::default().time_chunk(), ZarrWriter::DEFAULT_TIME_CHUNK);
}

#[test]
fn test_write_failure_is_reported() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("file");
    fs::write(&blocker, b"").unwrap();
    let err = ZarrWriter::default()
        .write(&sample(), &blocker.join("nested.zarr"))
        .unwrap_err();
    assert!(matches!(err, DaymetError::Write { .. }));
}
