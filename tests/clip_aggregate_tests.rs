//! Clipping to polygons and spatial aggregation

mod common;

use common::{
    feature_collection, make_dataset, origin_grid, square_feature, step_2d, test_grid, values_1d, year_times,
    DAYMET_PROJ,
};
use daymet_proc::clip::{ClipOutcome, Clipper};
use daymet_proc::dataset::{AttrValue, Coordinate, Dataset, Grid};
use daymet_proc::errors::DaymetError;
use daymet_proc::geometry::{parse_geojson, Crs, LccReprojector, NoReprojection, RegionGeometry};
use daymet_proc::region::RegionId;
use daymet_proc::statistics::{aggregate, nan_mean, AggregationMode, SpatialReduction};
use geo::{polygon, MultiPolygon, Polygon};
use ndarray::{arr1, arr2, Array3};

/// 3 timesteps on a 5 x 5 grid, value `t * 100 + i * 10 + j`
fn indexed_dataset() -> Dataset {
    make_dataset(&["prcp", "tmax"], year_times(2015, 3), test_grid(5, 5), |_, t, i, j| {
        (t * 100 + i * 10 + j) as f32
    })
}

fn region_geometry(shape: Polygon<f64>, crs: Crs) -> RegionGeometry {
    RegionGeometry {
        region: RegionId::from("001"),
        shape: MultiPolygon(vec![shape]),
        crs,
    }
}

/// Triangle whose bounding box touches rows 0..3 and columns 1..4 of the
/// test grid; three cell centres fall inside it
fn triangle() -> Polygon<f64> {
    polygon![
        (x: -499_400.0, y: 997_600.0),
        (x: -497_300.0, y: 997_600.0),
        (x: -499_400.0, y: 999_700.0),
        (x: -499_400.0, y: 997_600.0),
    ]
}

fn daymet_crs() -> Crs {
    Crs::parse(DAYMET_PROJ)
}

fn clipped(outcome: ClipOutcome) -> Dataset {
    match outcome {
        ClipOutcome::Clipped(dataset) => dataset,
        ClipOutcome::NoOverlap => panic!("expected an overlap"),
    }
}

#[test]
fn test_clip_crops_and_masks() {
    let clipper = Clipper::new(&NoReprojection);
    let geometry = region_geometry(triangle(), daymet_crs());
    let result = clipped(clipper.clip(indexed_dataset(), &geometry).unwrap());

    let grid = result.grid.as_ref().unwrap();
    assert_eq!(grid.y.values, vec![1_000_000.0, 999_000.0, 998_000.0]);
    assert_eq!(grid.x.values, vec![-499_000.0, -498_000.0, -497_000.0]);
    assert_eq!(result.time_len(), 3);

    for t in 0..3 {
        let step = step_2d(&result, "prcp", t);
        let offset = (t * 100) as f32;
        let inside: Vec<(usize, usize)> = step
            .indexed_iter()
            .filter(|(_, v)| !v.is_nan())
            .map(|(ij, _)| ij)
            .collect();
        assert_eq!(inside, vec![(1, 0), (2, 0), (2, 1)]);
        assert_eq!(step[[1, 0]], offset + 11.0);
        assert_eq!(step[[2, 1]], offset + 22.0);
    }
    // every variable is clipped the same way
    assert!(step_2d(&result, "tmax", 0)[[0, 0]].is_nan());
    assert_eq!(result.variables["tmax"].valid_count(), 9);
}

#[test]
fn test_clip_without_overlap() {
    let clipper = Clipper::new(&NoReprojection);
    let far_away = polygon![
        (x: 0.0, y: 0.0),
        (x: 10.0, y: 0.0),
        (x: 10.0, y: 10.0),
        (x: 0.0, y: 0.0),
    ];
    let outcome = clipper
        .clip(indexed_dataset(), &region_geometry(far_away, daymet_crs()))
        .unwrap();
    assert!(outcome.is_no_overlap());

    let empty = RegionGeometry {
        region: RegionId::from("001"),
        shape: MultiPolygon(vec![]),
        crs: daymet_crs(),
    };
    assert!(clipper.clip(indexed_dataset(), &empty).unwrap().is_no_overlap());
}

#[test]
fn test_clip_with_crs_mismatch_fails() {
    let clipper = Clipper::new(&NoReprojection);
    let geometry = region_geometry(triangle(), Crs::Epsg(4326));
    let err = clipper.clip(indexed_dataset(), &geometry).unwrap_err();
    assert!(matches!(err, DaymetError::CrsTransform { .. }));
    assert!(!err.is_run_fatal());
}

#[test]
fn test_clip_assumes_matching_crs_without_grid_mapping() {
    let clipper = Clipper::new(&NoReprojection);
    let mut no_mapping = indexed_dataset();
    no_mapping.grid_mapping = None;
    let geometry = region_geometry(triangle(), Crs::Epsg(4326));
    let result = clipped(clipper.clip(no_mapping, &geometry).unwrap());
    assert_eq!(result.variables["prcp"].valid_count(), 9);
    assert_eq!(result.grid.unwrap().shape(), (3, 3));
}

/// GeoJSON without a `crs` member: a 0.02 x 0.016 degree box around the
/// projection origin
fn lonlat_basin() -> RegionGeometry {
    let text = feature_collection(vec![square_feature("001", -100.01, 42.492, -99.99, 42.508)], None);
    let index = parse_geojson(&text, "gauge_id", None).unwrap();
    index.get(&RegionId::from("001")).unwrap().clone()
}

#[test]
fn test_clip_lonlat_geometry_without_transform_fails() {
    let geometry = lonlat_basin();
    assert_eq!(geometry.crs, Crs::Epsg(4326));

    let dataset = make_dataset(&["prcp"], year_times(2015, 1), origin_grid(4), |_, _, i, j| (i * 10 + j) as f32);
    let err = Clipper::new(&NoReprojection).clip(dataset, &geometry).unwrap_err();
    assert!(matches!(err, DaymetError::CrsTransform { .. }));
}

#[test]
fn test_clip_reprojects_lonlat_geometry() {
    let dataset = make_dataset(&["prcp"], year_times(2015, 2), origin_grid(4), |_, t, i, j| {
        (t * 100 + i * 10 + j) as f32
    });
    let result = clipped(Clipper::new(&LccReprojector).clip(dataset, &lonlat_basin()).unwrap());

    // the box spans about 1.57 x 1.69 km, so only the four central cells remain
    let grid = result.grid.as_ref().unwrap();
    assert_eq!(grid.y.values, vec![500.0, -500.0]);
    assert_eq!(grid.x.values, vec![-500.0, 500.0]);
    assert_eq!(result.variables["prcp"].valid_count(), 8);
    assert_eq!(step_2d(&result, "prcp", 1)[[0, 0]], 111.0);
}

#[test]
fn test_clip_normalizes_km_coordinates() {
    let km_grid = Grid::new(
        Coordinate::new((0..5).map(|i| 1000.0 - i as f64).collect()).with_attr("units", "km"),
        Coordinate::new((0..5).map(|j| -500.0 + j as f64).collect()).with_attr("units", "km"),
    );
    let dataset = make_dataset(&["prcp"], year_times(2015, 1), km_grid, |_, _, i, j| (i * 10 + j) as f32);
    assert!(!dataset.crs().unwrap().same_as(&Crs::parse(DAYMET_PROJ)));

    let clipper = Clipper::new(&NoReprojection);
    let geometry = region_geometry(triangle(), daymet_crs());
    let result = clipped(clipper.clip(dataset, &geometry).unwrap());

    let grid = result.grid.as_ref().unwrap();
    assert_eq!(grid.x.units(), Some("m"));
    assert_eq!(grid.y.values[0], 1_000_000.0);
    assert_eq!(step_2d(&result, "prcp", 0)[[2, 0]], 21.0);
}

#[test]
fn test_clip_without_grid_is_an_error() {
    let mut dataset = Dataset::new(Coordinate::new(year_times(2015, 1)), None);
    dataset
        .insert_variable(
            "prcp",
            daymet_proc::dataset::DataVariable::new(&["time"], arr1(&[1.0_f32]).into_dyn()),
        )
        .unwrap();
    let clipper = Clipper::new(&NoReprojection);
    let err = clipper
        .clip(dataset, &region_geometry(triangle(), daymet_crs()))
        .unwrap_err();
    assert!(matches!(err, DaymetError::NoGrid { .. }));
}

#[test]
fn test_clip_single_row_grid_uses_column_spacing() {
    let grid = Grid::new(
        Coordinate::new(vec![1_000_000.0]).with_attr("units", "m"),
        Coordinate::new((0..5).map(|j| -500_000.0 + 1000.0 * j as f64).collect()).with_attr("units", "m"),
    );
    let dataset = make_dataset(&["prcp"], year_times(2015, 1), grid, |_, _, _, j| j as f32);
    // inside the row's cell but away from its centre line
    let strip = polygon![
        (x: -499_400.0, y: 999_700.0),
        (x: -498_600.0, y: 999_700.0),
        (x: -498_600.0, y: 999_900.0),
        (x: -499_400.0, y: 999_900.0),
        (x: -499_400.0, y: 999_700.0),
    ];
    let result = clipped(
        Clipper::new(&NoReprojection)
            .clip(dataset, &region_geometry(strip, daymet_crs()))
            .unwrap(),
    );
    let grid = result.grid.unwrap();
    assert_eq!(grid.shape(), (1, 1));
    assert_eq!(grid.x.values, vec![-499_000.0]);
}

/// Two variables over a 2 x 2 grid with a fully missing middle timestep
fn sparse_dataset() -> Dataset {
    let values = [
        arr2(&[[1.0, 2.0], [3.0, 4.0]]),
        arr2(&[[f32::NAN, f32::NAN], [f32::NAN, f32::NAN]]),
        arr2(&[[f32::NAN, 5.0], [7.0, f32::NAN]]),
    ];
    let mut dataset = make_dataset(&["prcp", "tmin"], year_times(2015, 3), test_grid(2, 2), move |_, t, i, j| {
        values[t][[i, j]]
    });
    dataset
        .variables
        .get_mut("tmin")
        .unwrap()
        .attributes
        .insert("cell_methods".into(), AttrValue::from("area: mean time: minimum"));
    dataset
}

fn assert_series(actual: &ndarray::Array1<f32>, expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        if e.is_nan() {
            assert!(a.is_nan(), "expected NaN, got {a}");
        } else {
            assert!((a - e).abs() < 1e-6, "expected {e}, got {a}");
        }
    }
}

#[test]
fn test_aggregate_mean_skips_nan() {
    let dataset = sparse_dataset();
    let result = aggregate(&dataset, AggregationMode::Mean).unwrap();

    assert!(result.grid.is_none());
    assert!(result.grid_mapping.is_none());
    assert_eq!(result.time, dataset.time);
    assert_eq!(result.variables["prcp"].dims, vec!["time".to_string()]);
    assert_series(&values_1d(&result, "prcp"), &[2.5, f32::NAN, 6.0]);

    let attrs = &result.variables["prcp"].attributes;
    assert_eq!(attrs["cell_methods"].as_str(), Some("y: x: mean"));
    assert!(!attrs.contains_key("grid_mapping"));
    assert_eq!(attrs["units"].as_str(), Some("mm/day"));
    assert_eq!(
        result.variables["tmin"].attributes["cell_methods"].as_str(),
        Some("area: mean time: minimum y: x: mean")
    );
    assert_eq!(result.attributes, dataset.attributes);
}

#[test]
fn test_aggregate_min_and_max() {
    let dataset = sparse_dataset();

    let min = aggregate(&dataset, AggregationMode::Min).unwrap();
    assert_series(&values_1d(&min, "prcp"), &[1.0, f32::NAN, 5.0]);
    assert_eq!(
        min.variables["prcp"].attributes["cell_methods"].as_str(),
        Some("y: x: minimum")
    );

    let max = aggregate(&dataset, AggregationMode::Max).unwrap();
    assert_series(&values_1d(&max, "tmin"), &[4.0, f32::NAN, 7.0]);
}

#[test]
fn test_aggregate_requires_grid() {
    let aggregated = aggregate(&sparse_dataset(), AggregationMode::Mean).unwrap();
    let err = aggregate(&aggregated, AggregationMode::Mean).unwrap_err();
    assert!(matches!(err, DaymetError::StatisticsError(_)));
}

#[test]
fn test_spatial_reduction_on_arrays() {
    let data = Array3::from_shape_fn((4, 3, 3), |(t, i, j)| (t + i + j) as f32).into_dyn();
    let means = data.reduce_spatial(AggregationMode::Mean).unwrap();
    assert_series(&means, &[2.0, 3.0, 4.0, 5.0]);

    let flat = arr1(&[1.0_f32, 2.0]).into_dyn();
    assert!(flat.reduce_spatial(AggregationMode::Max).is_err());

    let view = arr1(&[1.0_f32, f32::NAN, f32::INFINITY, 3.0]).into_dyn();
    assert_eq!(nan_mean(view.view()), 2.0);
    assert!(nan_mean(arr1(&[f32::NAN]).into_dyn().view()).is_nan());
}

#[test]
fn test_clip_then_aggregate() {
    let clipper = Clipper::new(&NoReprojection);
    let geometry = region_geometry(triangle(), daymet_crs());
    let result = clipped(clipper.clip(indexed_dataset(), &geometry).unwrap());
    let aggregated = aggregate(&result, AggregationMode::Mean).unwrap();
    // inside cells are 11, 21 and 22 plus the timestep offset
    assert_series(&values_1d(&aggregated, "prcp"), &[18.0, 118.0, 218.0]);
}
