//! Creates a small Daymet-like directory tree for trying out daymet-proc.
//!
//! Layout written to `daymet_sample/`:
//!
//! - `prcp/01013500/01013500_daymet_v4_daily_na_prcp_{2015,2016}.nc`
//! - `tmax/01013500/01013500_daymet_v4_daily_na_tmax_{2015,2016}.nc`
//! - `01022500/01022500_daymet_v4_daily_na_prcp_2015.nc` (flat layout)
//! - `basins.geojson` and `combine.toml`, `clip.toml`, `aggregate.toml`
//!
//! Run `daymet-proc combine daymet_sample/combine.toml` afterwards.

use chrono::{Datelike, NaiveDate};
use netcdf::create;
use std::fs;
use std::path::Path;

const NY: usize = 20;
const NX: usize = 25;
const DAYS: usize = 30;

fn write_yearly(path: &Path, variable: &str, year: i32, origin: (f32, f32)) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        fs::remove_file(path)?
    }

    let mut file = create(path)?;
    file.add_attribute("source", "Daymet Software Version 4.0")?;
    file.add_attribute("created_by", "create_sample_tree.rs")?;

    file.add_dimension("time", DAYS)?;
    file.add_dimension("y", NY)?;
    file.add_dimension("x", NX)?;

    let epoch = NaiveDate::from_ymd_opt(1950, 1, 1).ok_or("bad epoch")?;
    let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or("bad year")?;
    let offset = (start - epoch).num_days() as f64;
    {
        let times: Vec<f64> = (0..DAYS).map(|d| offset + d as f64 + 0.5).collect();
        let mut time = file.add_variable::<f64>("time", &["time"])?;
        time.put_attribute("units", "days since 1950-01-01 00:00:00")?;
        time.put_attribute("calendar", "standard")?;
        time.put_values(times.as_slice(), ..)?;
    }

    {
        let (y0, x0) = origin;
        let y: Vec<f32> = (0..NY).map(|i| y0 - i as f32).collect();
        let x: Vec<f32> = (0..NX).map(|j| x0 + j as f32).collect();
        let mut y_var = file.add_variable::<f32>("y", &["y"])?;
        y_var.put_attribute("units", "km")?;
        y_var.put_attribute("standard_name", "projection_y_coordinate")?;
        y_var.put_values(y.as_slice(), ..)?;
        let mut x_var = file.add_variable::<f32>("x", &["x"])?;
        x_var.put_attribute("units", "km")?;
        x_var.put_attribute("standard_name", "projection_x_coordinate")?;
        x_var.put_values(x.as_slice(), ..)?;
    }

    {
        let mut mapping = file.add_variable::<i32>("lambert_conformal_conic", &[])?;
        mapping.put_attribute("grid_mapping_name", "lambert_conformal_conic")?;
        mapping.put_attribute("standard_parallel", vec![25.0_f64, 60.0])?;
        mapping.put_attribute("longitude_of_central_meridian", -100.0_f64)?;
        mapping.put_attribute("latitude_of_projection_origin", 42.5_f64)?;
        mapping.put_attribute("false_easting", 0.0_f64)?;
        mapping.put_attribute("false_northing", 0.0_f64)?;
        mapping.put_attribute("semi_major_axis", 6_378_137.0_f64)?;
        mapping.put_attribute("inverse_flattening", 298.257_223_563_f64)?;
    }

    // seasonal signal plus a spatial gradient, the grid corner is missing
    let mut values = Vec::with_capacity(DAYS * NY * NX);
    for d in 0..DAYS {
        let day_of_year = (start + chrono::Duration::days(d as i64)).ordinal() as f32;
        let seasonal = (day_of_year / 365.0 * std::f32::consts::TAU).cos();
        for i in 0..NY {
            for j in 0..NX {
                let value = match variable {
                    "prcp" => (3.0 + 2.0 * seasonal + 0.1 * j as f32).max(0.0),
                    _ => -5.0 - 10.0 * seasonal + 0.2 * i as f32,
                };
                values.push(if i == 0 && j == 0 { -9999.0 } else { value });
            }
        }
    }
    let mut data = file.add_variable::<f32>(variable, &["time", "y", "x"])?;
    data.put_attribute("_FillValue", -9999.0_f32)?;
    data.put_attribute("missing_value", -9999.0_f32)?;
    data.put_attribute("units", if variable == "prcp" { "mm/day" } else { "degrees C" })?;
    data.put_attribute("grid_mapping", "lambert_conformal_conic")?;
    data.put_attribute("cell_methods", "area: mean time: sum")?;
    data.put_values(values.as_slice(), ..)?;

    println!("   📄 {}", path.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let root = Path::new("daymet_sample");
    println!("🔨 Creating sample Daymet tree in {}", root.display());

    let gauge_a = (1500.0, -300.0);
    let gauge_b = (1200.0, 250.0);

    for variable in ["prcp", "tmax"] {
        for year in [2015, 2016] {
            let name = format!("01013500_daymet_v4_daily_na_{variable}_{year}.nc");
            write_yearly(&root.join(variable).join("01013500").join(name), variable, year, gauge_a)?;
        }
    }
    write_yearly(
        &root.join("01022500").join("01022500_daymet_v4_daily_na_prcp_2015.nc"),
        "prcp",
        2015,
        gauge_b,
    )?;

    // square basins in metres, in the grid's projection; the legacy crs
    // member says so, without it positions are read as longitude/latitude
    let square = |(y0, x0): (f32, f32)| {
        let (top, left) = (f64::from(y0) * 1000.0, f64::from(x0) * 1000.0);
        let (bottom, right) = (top - 8_000.0, left + 10_000.0);
        serde_json::json!([[[left + 2_000.0, bottom], [right, bottom], [right, top - 2_000.0], [left + 2_000.0, top - 2_000.0], [left + 2_000.0, bottom]]])
    };
    let basins = serde_json::json!({
        "type": "FeatureCollection",
        "crs": {
            "type": "name",
            "properties": {
                "name": "+proj=lcc +lat_1=25 +lat_2=60 +lat_0=42.5 +lon_0=-100 +x_0=0 +y_0=0 +ellps=WGS84 +units=m +no_defs"
            }
        },
        "features": [
            { "type": "Feature", "properties": { "gauge_id": 1013500 }, "geometry": { "type": "Polygon", "coordinates": square(gauge_a) } },
            { "type": "Feature", "properties": { "gauge_id": 1022500 }, "geometry": { "type": "Polygon", "coordinates": square(gauge_b) } }
        ]
    });
    fs::write(root.join("basins.geojson"), serde_json::to_string_pretty(&basins)?)?;

    let root_dir = root.canonicalize()?;
    let combined_dir = root_dir.join("combined");
    fs::write(
        root.join("combine.toml"),
        format!(
            "dataDir = {:?}\noutputDir = {:?}\n\n[operationParameters]\nvariables = [\"prcp\", \"tmax\"]\n",
            root_dir, combined_dir
        ),
    )?;
    fs::write(
        root.join("clip.toml"),
        format!(
            "dataDir = {:?}\noutputDir = {:?}\n\n[operationParameters]\ngeomPath = {:?}\nidCol = \"gauge_id\"\nidWidth = 8\n",
            combined_dir,
            combined_dir,
            root_dir.join("basins.geojson")
        ),
    )?;
    fs::write(
        root.join("aggregate.toml"),
        format!(
            "dataDir = {:?}\noutputDir = {:?}\noutputFormat = \"zarr\"\n\n[operationParameters]\naggregationMode = \"mean\"\n",
            combined_dir,
            root_dir.join("series")
        ),
    )?;

    println!("✅ Done. Try: daymet-proc combine {}", root.join("combine.toml").display());
    Ok(())
}
