//! Zarr v2 store writer
//!
//! Stores are laid out the way xarray expects them: one group with
//! consolidated metadata (`.zmetadata`), one array per coordinate and data
//! variable, and `_ARRAY_DIMENSIONS` in every array's `.zattrs`. Chunks are
//! uncompressed little-endian and split along `time` only. Edge chunks are
//! padded with the fill value.

use crate::data_source::{DatasetWriter, OutputFormat};
use crate::dataset::{Attributes, Dataset, TIME_DIM, X_DIM, Y_DIM};
use crate::errors::{DaymetError, Result};
use ndarray::{arr0, ArrayView1, ArrayViewD, Axis, Slice};
use rayon::prelude::*;
use serde_json::{json, Map, Value as JsonValue};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Attributes that are expressed through `.zarray` instead of `.zattrs`
const ENCODING_ATTRS: &[&str] = &["_FillValue", "missing_value"];

/// Element types that can be stored in a chunk
trait ZarrElement: Copy + Send + Sync {
    const DTYPE: &'static str;

    fn fill_value() -> Self;

    fn fill_json() -> JsonValue;

    fn extend_le(self, out: &mut Vec<u8>);
}

impl ZarrElement for f32 {
    const DTYPE: &'static str = "<f4";

    fn fill_value() -> Self {
        f32::NAN
    }

    fn fill_json() -> JsonValue {
        JsonValue::from("NaN")
    }

    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl ZarrElement for f64 {
    const DTYPE: &'static str = "<f8";

    fn fill_value() -> Self {
        f64::NAN
    }

    fn fill_json() -> JsonValue {
        JsonValue::from("NaN")
    }

    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl ZarrElement for i32 {
    const DTYPE: &'static str = "<i4";

    fn fill_value() -> Self {
        0
    }

    fn fill_json() -> JsonValue {
        JsonValue::Null
    }

    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// Writes datasets as Zarr v2 directory stores
#[derive(Debug, Clone, Copy)]
pub struct ZarrWriter {
    time_chunk: usize,
}

impl Default for ZarrWriter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIME_CHUNK)
    }
}

impl ZarrWriter {
    pub const DEFAULT_TIME_CHUNK: usize = 365;

    pub fn new(time_chunk: usize) -> Self {
        Self {
            time_chunk: time_chunk.max(1),
        }
    }

    pub fn time_chunk(&self) -> usize {
        self.time_chunk
    }

    fn write_store(&self, dataset: &Dataset, store: &Path) -> Result<()> {
        if store.is_dir() {
            fs::remove_dir_all(store)?;
        } else if store.exists() {
            fs::remove_file(store)?;
        }
        fs::create_dir_all(store)?;

        let mut consolidated = Map::new();
        let group = json!({ "zarr_format": 2 });
        write_json(&store.join(".zgroup"), &group)?;
        consolidated.insert(".zgroup".to_string(), group);

        let global_attrs = attrs_json(&dataset.attributes, None);
        write_json(&store.join(".zattrs"), &global_attrs)?;
        consolidated.insert(".zattrs".to_string(), global_attrs);

        let time_dims = [TIME_DIM.to_string()];
        self.write_array(
            store,
            TIME_DIM,
            ArrayView1::from(&dataset.time.values).into_dyn(),
            &time_dims,
            &dataset.time.attributes,
            &mut consolidated,
        )?;

        if let Some(grid) = &dataset.grid {
            for (name, coord) in [(Y_DIM, &grid.y), (X_DIM, &grid.x)] {
                self.write_array(
                    store,
                    name,
                    ArrayView1::from(&coord.values).into_dyn(),
                    &[name.to_string()],
                    &coord.attributes,
                    &mut consolidated,
                )?;
            }
        }

        if let Some(mapping) = &dataset.grid_mapping {
            let scalar = arr0(0i32).into_dyn();
            self.write_array(
                store,
                &mapping.name,
                scalar.view(),
                &[],
                &mapping.attributes,
                &mut consolidated,
            )?;
        }

        for (name, variable) in &dataset.variables {
            self.write_array(
                store,
                name,
                variable.data.view(),
                &variable.dims,
                &variable.attributes,
                &mut consolidated,
            )?;
        }

        write_json(
            &store.join(".zmetadata"),
            &json!({
                "metadata": consolidated,
                "zarr_consolidated_format": 1,
            }),
        )?;

        debug!(
            "Wrote Zarr store {} with {} data variables",
            store.display(),
            dataset.variables.len()
        );
        Ok(())
    }

    fn write_array<T: ZarrElement>(
        &self,
        store: &Path,
        name: &str,
        data: ArrayViewD<'_, T>,
        dims: &[String],
        attributes: &Attributes,
        consolidated: &mut Map<String, JsonValue>,
    ) -> Result<()> {
        let shape = data.shape().to_vec();
        // data variables are split along time, coordinates are written whole
        let split_time = dims.first().is_some_and(|d| d == TIME_DIM) && shape.len() > 1;
        let chunks: Vec<usize> = shape
            .iter()
            .enumerate()
            .map(|(axis, &extent)| {
                if axis == 0 && split_time {
                    self.time_chunk.min(extent).max(1)
                } else {
                    extent.max(1)
                }
            })
            .collect();

        let array_dir = store.join(name);
        fs::create_dir_all(&array_dir)?;

        let zarray = json!({
            "chunks": chunks,
            "compressor": null,
            "dtype": T::DTYPE,
            "fill_value": T::fill_json(),
            "filters": null,
            "order": "C",
            "shape": shape,
            "zarr_format": 2,
        });
        let zattrs = attrs_json(attributes, Some(dims));
        write_json(&array_dir.join(".zarray"), &zarray)?;
        write_json(&array_dir.join(".zattrs"), &zattrs)?;
        consolidated.insert(format!("{name}/.zarray"), zarray);
        consolidated.insert(format!("{name}/.zattrs"), zattrs);

        if shape.is_empty() {
            let mut bytes = Vec::with_capacity(8);
            for &value in data.iter() {
                value.extend_le(&mut bytes);
            }
            fs::write(array_dir.join("0"), bytes)?;
            return Ok(());
        }

        let chunk_len = chunks[0];
        let per_chunk: usize = chunks.iter().product();
        let num_chunks = shape[0].div_ceil(chunk_len);
        let trailing = ".0".repeat(shape.len() - 1);

        (0..num_chunks).into_par_iter().try_for_each(|i| -> Result<()> {
            let start = i * chunk_len;
            let end = (start + chunk_len).min(shape[0]);
            let slab = data.slice_axis(Axis(0), Slice::from(start..end));

            let mut bytes = Vec::with_capacity(per_chunk * std::mem::size_of::<T>());
            for &value in slab.iter() {
                value.extend_le(&mut bytes);
            }
            for _ in slab.len()..per_chunk {
                T::fill_value().extend_le(&mut bytes);
            }

            fs::write(array_dir.join(format!("{i}{trailing}")), bytes)?;
            Ok(())
        })?;

        debug!("Wrote array '{name}' in {num_chunks} chunks");
        Ok(())
    }
}

impl DatasetWriter for ZarrWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Zarr
    }

    fn write(&self, dataset: &Dataset, path: &Path) -> Result<()> {
        self.write_store(dataset, path).map_err(|e| DaymetError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

fn attrs_json(attributes: &Attributes, dims: Option<&[String]>) -> JsonValue {
    let mut map: Map<String, JsonValue> = attributes
        .iter()
        .filter(|(k, _)| dims.is_none() || !ENCODING_ATTRS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    if let Some(dims) = dims {
        map.insert("_ARRAY_DIMENSIONS".to_string(), json!(dims));
    }
    JsonValue::Object(map)
}

fn write_json(path: &Path, value: &JsonValue) -> Result<()> {
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}
