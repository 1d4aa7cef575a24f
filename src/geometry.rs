//! Region geometries, coordinate reference systems and the geo-file reader
//!
//! Geometries are read from GeoJSON feature collections. Each feature must
//! carry a Polygon or MultiPolygon geometry and an identifier property whose
//! name is configurable. A collection without a `crs` member is WGS84
//! longitude/latitude, as RFC 7946 prescribes.
//!
//! [`Reprojector`] is the seam for coordinate transforms. [`LccReprojector`]
//! projects geographic coordinates onto the Lambert conformal conic grids
//! Daymet is distributed on; [`NoReprojection`] refuses every transform.

use crate::errors::{DaymetError, Result};
use crate::region::RegionId;
use geo::{BoundingRect, Coord, CoordsIter, LineString, MapCoords, MultiPolygon, Polygon, Rect};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_4, PI, TAU};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Proj parameters that do not change the meaning of a CRS
const IGNORED_PROJ_KEYS: &[&str] = &["no_defs", "wktext", "type"];

/// WGS84 semi-major axis and inverse flattening
const WGS84: (f64, f64) = (6_378_137.0, 298.257_223_563);
const GRS80: (f64, f64) = (6_378_137.0, 298.257_222_101);

/// Coordinate reference system description
#[derive(Debug, Clone, PartialEq)]
pub enum Crs {
    /// EPSG code, e.g. 4326
    Epsg(u32),
    /// Proj string parameters, keyed without the leading `+`
    Proj(BTreeMap<String, Option<String>>),
    /// Anything else (WKT, unknown grid mapping names)
    Other(String),
}

impl Crs {
    /// Parse an EPSG reference, OGC URN or proj string
    ///
    /// Proj strings are tolerant of spacing, so
    /// `"+proj = lcc + lat_1 = 25"` and `"+proj=lcc +lat_1=25"` are equivalent.
    pub fn parse(text: &str) -> Crs {
        let trimmed = text.trim();
        let upper = trimmed.to_ascii_uppercase();

        if upper.ends_with("CRS84") {
            return Crs::Epsg(4326);
        }
        if upper.contains("EPSG") && !upper.starts_with("PROJCS") && !upper.starts_with("GEOGCS") {
            if let Some(code) = upper.rsplit(':').next().and_then(|c| c.trim().parse().ok()) {
                return Crs::Epsg(code);
            }
        }
        if trimmed.starts_with('+') {
            let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
            let params: BTreeMap<String, Option<String>> = compact
                .split('+')
                .filter(|token| !token.is_empty())
                .map(|token| match token.split_once('=') {
                    Some((k, v)) => (k.to_string(), Some(v.to_string())),
                    None => (token.to_string(), None),
                })
                .collect();
            let is_wgs84 = |key: &str| {
                params
                    .get(key)
                    .and_then(|v| v.as_deref())
                    .is_some_and(|v| v.eq_ignore_ascii_case("WGS84"))
            };
            let geographic = matches!(
                params.get("proj").and_then(|v| v.as_deref()),
                Some("longlat") | Some("latlong")
            );
            if geographic && (is_wgs84("datum") || is_wgs84("ellps")) {
                return Crs::Epsg(4326);
            }
            return Crs::Proj(params);
        }
        Crs::Other(trimmed.to_string())
    }

    /// Semantic equality: proj parameters are compared numerically and
    /// independent of their order
    pub fn same_as(&self, other: &Crs) -> bool {
        match (self, other) {
            (Crs::Epsg(a), Crs::Epsg(b)) => a == b,
            (Crs::Proj(a), Crs::Proj(b)) => {
                let significant = |params: &BTreeMap<String, Option<String>>| {
                    params
                        .iter()
                        .filter(|(k, _)| !IGNORED_PROJ_KEYS.contains(&k.as_str()))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect::<Vec<_>>()
                };
                let (a, b) = (significant(a), significant(b));
                a.len() == b.len()
                    && a.iter().zip(&b).all(|((ka, va), (kb, vb))| {
                        ka == kb && proj_values_equal(va.as_deref(), vb.as_deref())
                    })
            }
            (Crs::Other(a), Crs::Other(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}

fn proj_values_equal(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => (x - y).abs() < 1e-9,
            _ => a.eq_ignore_ascii_case(b),
        },
        (None, None) => true,
        _ => false,
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Proj(params) => {
                let parts: Vec<String> = params
                    .iter()
                    .map(|(k, v)| match v {
                        Some(v) => format!("+{k}={v}"),
                        None => format!("+{k}"),
                    })
                    .collect();
                f.write_str(&parts.join(" "))
            }
            Crs::Other(text) => f.write_str(text),
        }
    }
}

/// Polygon geometry of one region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGeometry {
    pub region: RegionId,
    pub shape: MultiPolygon<f64>,
    pub crs: Crs,
}

impl RegionGeometry {
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.shape.bounding_rect()
    }
}

/// Geometries keyed by region
#[derive(Debug, Clone, Default)]
pub struct GeometryIndex {
    by_region: BTreeMap<RegionId, RegionGeometry>,
}

impl GeometryIndex {
    /// Insert a geometry; polygons of an already known region are appended
    pub fn insert(&mut self, geometry: RegionGeometry) {
        match self.by_region.get_mut(&geometry.region) {
            Some(existing) => {
                debug!(region = %geometry.region, "merging duplicate feature into existing geometry");
                existing.shape.0.extend(geometry.shape.0);
            }
            None => {
                self.by_region.insert(geometry.region.clone(), geometry);
            }
        }
    }

    pub fn get(&self, region: &RegionId) -> Option<&RegionGeometry> {
        self.by_region.get(region)
    }

    pub fn ids(&self) -> Vec<RegionId> {
        self.by_region.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_region.is_empty()
    }
}

/// Reader for region geometries
pub trait GeometrySource: Send + Sync {
    fn load(&self) -> Result<GeometryIndex>;
}

/// Turns a geometry into another CRS
pub trait Reprojector: Send + Sync {
    fn reproject(&self, geometry: &RegionGeometry, target: &Crs) -> Result<RegionGeometry>;
}

/// Reprojector that has no transforms available
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReprojection;

impl Reprojector for NoReprojection {
    fn reproject(&self, geometry: &RegionGeometry, target: &Crs) -> Result<RegionGeometry> {
        Err(DaymetError::CrsTransform {
            from: geometry.crs.to_string(),
            to: target.to_string(),
        })
    }
}

/// Projects WGS84 longitude/latitude geometries onto `+proj=lcc` targets
///
/// Every other pair of reference systems is refused with
/// [`DaymetError::CrsTransform`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LccReprojector;

impl Reprojector for LccReprojector {
    fn reproject(&self, geometry: &RegionGeometry, target: &Crs) -> Result<RegionGeometry> {
        let refused = || DaymetError::CrsTransform {
            from: geometry.crs.to_string(),
            to: target.to_string(),
        };
        if geometry.crs != Crs::Epsg(4326) {
            return Err(refused());
        }
        let projection = LambertConformalConic::from_crs(target).ok_or_else(refused)?;

        let shape = geometry.shape.map_coords(|c| projection.project(c.x, c.y));
        // the pole opposite the cone's apex projects to infinity
        if !shape.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite()) {
            return Err(refused());
        }
        Ok(RegionGeometry {
            region: geometry.region.clone(),
            shape,
            crs: target.clone(),
        })
    }
}

/// Ellipsoidal Lambert conformal conic, one or two standard parallels
#[derive(Debug, Clone, PartialEq)]
pub struct LambertConformalConic {
    e: f64,
    n: f64,
    af: f64,
    rho0: f64,
    lon0: f64,
    x0: f64,
    y0: f64,
    to_meter: f64,
}

impl LambertConformalConic {
    /// Build the projection from `+proj=lcc` parameters
    ///
    /// Returns `None` for other projections or an unknown ellipsoid.
    pub fn from_crs(crs: &Crs) -> Option<Self> {
        let Crs::Proj(params) = crs else {
            return None;
        };
        let text = |key: &str| params.get(key).and_then(|v| v.as_deref());
        let number = |key: &str| text(key).and_then(|v| v.parse::<f64>().ok());
        if text("proj") != Some("lcc") {
            return None;
        }

        let (a, rf) = match (number("R"), number("a"), number("rf"), number("b")) {
            (Some(r), ..) => (r, f64::INFINITY),
            (None, Some(a), Some(rf), _) => (a, rf),
            (None, Some(a), None, Some(b)) => (a, a / (a - b)),
            _ => match text("ellps").or(text("datum")).map(str::to_ascii_uppercase).as_deref() {
                Some("WGS84") => WGS84,
                Some("GRS80") | None => GRS80,
                Some(_) => return None,
            },
        };
        let to_meter = match text("units") {
            None | Some("m") => 1.0,
            Some("km") => 1000.0,
            Some(_) => number("to_meter")?,
        };

        let lat_1 = number("lat_1")?.to_radians();
        let lat_2 = number("lat_2").map_or(lat_1, f64::to_radians);
        let lat_0 = number("lat_0").unwrap_or(0.0).to_radians();
        let lon0 = number("lon_0").unwrap_or(0.0).to_radians();

        let f = 1.0 / rf;
        let e = (2.0 * f - f * f).sqrt();
        let n = if (lat_1 - lat_2).abs() > 1e-10 {
            (msfn(lat_1, e).ln() - msfn(lat_2, e).ln()) / (tsfn(lat_1, e).ln() - tsfn(lat_2, e).ln())
        } else {
            lat_1.sin()
        };
        if n.abs() < 1e-10 {
            return None;
        }
        let af = a * msfn(lat_1, e) / (n * tsfn(lat_1, e).powf(n));

        Some(Self {
            e,
            n,
            af,
            rho0: af * tsfn(lat_0, e).powf(n),
            lon0,
            x0: number("x_0").unwrap_or(0.0),
            y0: number("y_0").unwrap_or(0.0),
            to_meter,
        })
    }

    /// Project longitude/latitude in degrees to easting/northing
    pub fn project(&self, lon: f64, lat: f64) -> Coord<f64> {
        let dlon = (lon.to_radians() - self.lon0 + PI).rem_euclid(TAU) - PI;
        let rho = self.af * tsfn(lat.to_radians(), self.e).powf(self.n);
        let theta = self.n * dlon;
        Coord {
            x: (self.x0 + rho * theta.sin()) / self.to_meter,
            y: (self.y0 + self.rho0 - rho * theta.cos()) / self.to_meter,
        }
    }
}

fn msfn(phi: f64, e: f64) -> f64 {
    let s = e * phi.sin();
    phi.cos() / (1.0 - s * s).sqrt()
}

fn tsfn(phi: f64, e: f64) -> f64 {
    let s = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - s) / (1.0 + s)).powf(e / 2.0)
}

/// GeoJSON feature-collection reader
#[derive(Debug, Clone)]
pub struct GeoJsonSource {
    path: PathBuf,
    id_col: String,
    id_width: Option<usize>,
}

impl GeoJsonSource {
    pub fn new(path: impl AsRef<Path>, id_col: &str, id_width: Option<usize>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            id_col: id_col.to_string(),
            id_width,
        }
    }
}

impl GeometrySource for GeoJsonSource {
    fn load(&self) -> Result<GeometryIndex> {
        let text = std::fs::read_to_string(&self.path)?;
        parse_geojson(&text, &self.id_col, self.id_width).map_err(|message| DaymetError::Read {
            path: self.path.clone(),
            message,
        })
    }
}

/// Parse a GeoJSON FeatureCollection into a [`GeometryIndex`]
pub fn parse_geojson(
    text: &str,
    id_col: &str,
    id_width: Option<usize>,
) -> std::result::Result<GeometryIndex, String> {
    let root: JsonValue = serde_json::from_str(text).map_err(|e| e.to_string())?;
    if root["type"] != "FeatureCollection" {
        return Err("expected a GeoJSON FeatureCollection".to_string());
    }

    let crs = root["crs"]["properties"]["name"]
        .as_str()
        .map_or(Crs::Epsg(4326), Crs::parse);
    let features = root["features"]
        .as_array()
        .ok_or_else(|| "FeatureCollection has no 'features' array".to_string())?;

    let mut index = GeometryIndex::default();
    for (i, feature) in features.iter().enumerate() {
        let region = match &feature["properties"][id_col] {
            JsonValue::String(s) => RegionId::new(s.clone()),
            JsonValue::Number(n) => RegionId::new(n.to_string()),
            _ => {
                warn!("feature {i} has no usable '{id_col}' property, skipping it");
                continue;
            }
        };
        let region = match id_width {
            Some(width) => region.zero_padded(width),
            None => region,
        };

        let shape = match parse_geometry(&feature["geometry"]) {
            Ok(shape) => shape,
            Err(reason) => {
                warn!(region = %region, "skipping feature {i}: {reason}");
                continue;
            }
        };

        index.insert(RegionGeometry {
            region,
            shape,
            crs: crs.clone(),
        });
    }
    Ok(index)
}

fn parse_geometry(geometry: &JsonValue) -> std::result::Result<MultiPolygon<f64>, String> {
    match geometry["type"].as_str() {
        Some("Polygon") => Ok(MultiPolygon(vec![parse_polygon(&geometry["coordinates"])?])),
        Some("MultiPolygon") => {
            let polygons = geometry["coordinates"]
                .as_array()
                .ok_or("MultiPolygon without coordinates")?
                .iter()
                .map(parse_polygon)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(MultiPolygon(polygons))
        }
        Some(other) => Err(format!("unsupported geometry type '{other}'")),
        None => Err("missing geometry".to_string()),
    }
}

fn parse_polygon(coordinates: &JsonValue) -> std::result::Result<Polygon<f64>, String> {
    let rings = coordinates.as_array().ok_or("polygon without rings")?;
    let mut rings = rings.iter().map(parse_ring);
    let exterior = rings.next().ok_or("polygon without exterior ring")??;
    let interiors = rings.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(ring: &JsonValue) -> std::result::Result<LineString<f64>, String> {
    ring.as_array()
        .ok_or("ring is not an array")?
        .iter()
        .map(|position| match position.as_array().map(Vec::as_slice) {
            Some([x, y, ..]) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err("non-numeric position".to_string()),
            },
            _ => Err("position needs at least two numbers".to_string()),
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(LineString::new)
}
