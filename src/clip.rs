//! Clipping a region dataset to its polygon
//!
//! The grid is first cropped to the rows and columns whose cells touch the
//! polygon's bounding box. Inside that window every cell whose centre falls
//! outside the polygon is set to `NaN`.

use crate::dataset::{Coordinate, DataVariable, Dataset, Grid, X_DIM, Y_DIM};
use crate::errors::{DaymetError, Result};
use crate::geometry::{RegionGeometry, Reprojector};
use geo::{Contains, Point, Rect};
use ndarray::{Array2, ArrayD, Axis, Slice};
use rayon::prelude::*;
use std::borrow::Cow;
use std::ops::Range;
use tracing::{debug, warn};

/// Result of clipping one dataset
#[derive(Debug, Clone)]
pub enum ClipOutcome {
    Clipped(Dataset),
    /// The polygon does not touch a single grid cell
    NoOverlap,
}

impl ClipOutcome {
    pub fn is_no_overlap(&self) -> bool {
        matches!(self, ClipOutcome::NoOverlap)
    }
}

/// Clips datasets, reprojecting geometries when their CRS differs
pub struct Clipper<'a> {
    reprojector: &'a dyn Reprojector,
}

impl<'a> Clipper<'a> {
    pub fn new(reprojector: &'a dyn Reprojector) -> Self {
        Self { reprojector }
    }

    pub fn clip(&self, mut dataset: Dataset, geometry: &RegionGeometry) -> Result<ClipOutcome> {
        let region = &geometry.region;
        if dataset.normalize_projected_units() {
            debug!(region = %region, "Converted projected coordinates from km to m");
        }

        let geometry = self.align_crs(&dataset, geometry)?;
        let Some(bounds) = geometry.bounds() else {
            return Ok(ClipOutcome::NoOverlap);
        };
        let Some(grid) = dataset.grid.as_ref() else {
            return Err(DaymetError::NoGrid {
                region: region.to_string(),
            });
        };

        let rows = touching(&grid.y, grid.x.spacing(), bounds.min().y, bounds.max().y);
        let cols = touching(&grid.x, grid.y.spacing(), bounds.min().x, bounds.max().x);
        let (Some(rows), Some(cols)) = (rows, cols) else {
            debug!(region = %region, "Polygon bounds {} lie outside the grid", describe(&bounds));
            return Ok(ClipOutcome::NoOverlap);
        };

        let cropped = Grid::new(
            crop_coordinate(&grid.y, &rows),
            crop_coordinate(&grid.x, &cols),
        );
        let mask = inside_mask(&cropped, &geometry);
        let inside = mask.iter().filter(|&&m| m).count();
        debug!(
            region = %region,
            "Cropped grid to {} x {} cells, {inside} inside the polygon",
            rows.len(),
            cols.len()
        );
        let mask = mask.into_dyn();

        let variables = std::mem::take(&mut dataset.variables);
        dataset.grid = Some(cropped);
        for (name, variable) in variables {
            let clipped = clip_variable(variable, &rows, &cols, &mask);
            dataset.insert_variable(&name, clipped)?;
        }

        Ok(ClipOutcome::Clipped(dataset))
    }

    fn align_crs<'g>(&self, dataset: &Dataset, geometry: &'g RegionGeometry) -> Result<Cow<'g, RegionGeometry>> {
        match dataset.crs() {
            Some(target) if !geometry.crs.same_as(&target) => {
                debug!(region = %geometry.region, "Reprojecting geometry from {} to {target}", geometry.crs);
                Ok(Cow::Owned(self.reprojector.reproject(geometry, &target)?))
            }
            Some(_) => Ok(Cow::Borrowed(geometry)),
            None => {
                warn!(
                    region = %geometry.region,
                    "Dataset has no grid mapping; assuming the geometry uses dataset coordinates"
                );
                Ok(Cow::Borrowed(geometry))
            }
        }
    }
}

/// Contiguous index range of cells overlapping `[min, max]`
///
/// A cell covers its centre plus or minus half the coordinate spacing. A
/// single-valued coordinate borrows the spacing of the other axis.
fn touching(coord: &Coordinate, fallback_spacing: Option<f64>, min: f64, max: f64) -> Option<Range<usize>> {
    let half = coord.spacing().or(fallback_spacing).unwrap_or(0.0) / 2.0;
    let mut hits = coord
        .values
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c + half >= min && c - half <= max)
        .map(|(i, _)| i);
    let first = hits.next()?;
    let last = hits.last().unwrap_or(first);
    Some(first..last + 1)
}

fn crop_coordinate(coord: &Coordinate, range: &Range<usize>) -> Coordinate {
    Coordinate {
        values: coord.values[range.clone()].to_vec(),
        attributes: coord.attributes.clone(),
    }
}

/// `true` for cells whose centre lies inside the polygon, rows in parallel
fn inside_mask(grid: &Grid, geometry: &RegionGeometry) -> Array2<bool> {
    let (ny, nx) = grid.shape();
    let flags: Vec<bool> = grid
        .y
        .values
        .par_iter()
        .flat_map_iter(|&y| {
            grid.x
                .values
                .iter()
                .map(move |&x| geometry.shape.contains(&Point::new(x, y)))
        })
        .collect();
    Array2::from_shape_vec((ny, nx), flags).unwrap_or_else(|_| Array2::from_elem((ny, nx), false))
}

fn clip_variable(
    variable: DataVariable,
    rows: &Range<usize>,
    cols: &Range<usize>,
    mask: &ArrayD<bool>,
) -> DataVariable {
    let y_axis = variable.dims.iter().position(|d| d == Y_DIM);
    let x_axis = variable.dims.iter().position(|d| d == X_DIM);
    let (Some(y_axis), Some(x_axis)) = (y_axis, x_axis) else {
        return variable;
    };

    let mut data = variable
        .data
        .slice_axis(Axis(y_axis), Slice::from(rows.clone()))
        .slice_axis(Axis(x_axis), Slice::from(cols.clone()))
        .to_owned();

    data.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut step| {
            step.zip_mut_with(mask, |v, &inside| {
                if !inside {
                    *v = f32::NAN;
                }
            });
        });

    DataVariable {
        dims: variable.dims,
        data,
        attributes: variable.attributes,
    }
}

fn describe(bounds: &Rect<f64>) -> String {
    format!(
        "[{:.1}, {:.1}] x [{:.1}, {:.1}]",
        bounds.min().x,
        bounds.max().x,
        bounds.min().y,
        bounds.max().y
    )
}
