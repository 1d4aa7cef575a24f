//! Daymet file naming conventions
//!
//! Each dataset version has one convention, implemented as its own type
//! behind the [`NamingConvention`] capability. A convention knows how to
//! parse and build the names of the yearly files written by the download
//! step and of the combined per-region files written by `combine`.
//!
//! | version | yearly file                                   | combined file              |
//! |---------|-----------------------------------------------|----------------------------|
//! | v3      | `{id}_daymet_v3_{var}_{period}_na.nc4`        | `{id}_daymet_v3_na.nc4`    |
//! | v4      | `{id}_daymet_v4_daily_na_{var}_{period}.nc`   | `{id}_daymet_v4_daily_na.nc` |

use crate::errors::DaymetError;
use crate::region::RegionId;
use std::fmt;
use std::str::FromStr;

/// Daymet dataset version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaymetVersion {
    V3,
    V4,
}

impl DaymetVersion {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V3 => "v3",
            Self::V4 => "v4",
        }
    }

    /// The naming convention belonging to this version
    pub fn convention(self) -> &'static dyn NamingConvention {
        match self {
            Self::V3 => &V3Convention,
            Self::V4 => &V4Convention,
        }
    }
}

impl fmt::Display for DaymetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DaymetVersion {
    type Err = DaymetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v3" => Ok(Self::V3),
            "v4" => Ok(Self::V4),
            other => Err(DaymetError::config(format!(
                "unsupported Daymet version '{other}'. Supported versions: 'v3', 'v4'"
            ))),
        }
    }
}

/// Year or inclusive year range encoded in a yearly file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub start: i32,
    pub end: i32,
}

impl Period {
    pub const fn year(year: i32) -> Self {
        Self {
            start: year,
            end: year,
        }
    }

    /// Parse `2015` or `2015-2017`
    pub fn parse(token: &str) -> Option<Self> {
        fn year(s: &str) -> Option<i32> {
            (s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()))
                .then(|| s.parse().ok())
                .flatten()
        }
        match token.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (year(start)?, year(end)?);
                (start <= end).then_some(Self { start, end })
            }
            None => year(token).map(Self::year),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Fields recovered from a yearly file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearlyName {
    pub region: RegionId,
    pub variable: String,
    pub period: Period,
}

/// Parser and builder for one version's file names
pub trait NamingConvention: Send + Sync {
    fn version(&self) -> DaymetVersion;

    fn parse_yearly(&self, file_name: &str) -> Option<YearlyName>;

    fn yearly_file_name(&self, region: &RegionId, variable: &str, period: Period) -> String;

    fn parse_combined(&self, file_name: &str) -> Option<RegionId>;

    fn combined_file_name(&self, region: &RegionId) -> String;

    fn zarr_store_name(&self, region: &RegionId) -> String {
        format!("{region}_daymet_{}_na.zarr", self.version())
    }
}

/// Splits `{id}{marker}{variable}_{period}` into its parts
fn split_yearly(stem: &str, marker: &str) -> Option<YearlyName> {
    let at = stem.find(marker)?;
    let region = &stem[..at];
    let (variable, period) = stem[at + marker.len()..].rsplit_once('_')?;
    if region.is_empty() || variable.is_empty() {
        return None;
    }
    Some(YearlyName {
        region: RegionId::from(region),
        variable: variable.to_string(),
        period: Period::parse(period)?,
    })
}

fn split_combined(file_name: &str, suffix: &str) -> Option<RegionId> {
    let region = file_name.strip_suffix(suffix)?;
    (!region.is_empty()).then(|| RegionId::from(region))
}

/// Daymet v3: `.nc4` files, period token before the `_na` suffix
#[derive(Debug, Clone, Copy, Default)]
pub struct V3Convention;

impl V3Convention {
    const MARKER: &'static str = "_daymet_v3_";
    const YEARLY_SUFFIX: &'static str = "_na.nc4";
    const COMBINED_SUFFIX: &'static str = "_daymet_v3_na.nc4";
}

impl NamingConvention for V3Convention {
    fn version(&self) -> DaymetVersion {
        DaymetVersion::V3
    }

    fn parse_yearly(&self, file_name: &str) -> Option<YearlyName> {
        split_yearly(file_name.strip_suffix(Self::YEARLY_SUFFIX)?, Self::MARKER)
    }

    fn yearly_file_name(&self, region: &RegionId, variable: &str, period: Period) -> String {
        format!("{region}{}{variable}_{period}{}", Self::MARKER, Self::YEARLY_SUFFIX)
    }

    fn parse_combined(&self, file_name: &str) -> Option<RegionId> {
        split_combined(file_name, Self::COMBINED_SUFFIX)
    }

    fn combined_file_name(&self, region: &RegionId) -> String {
        format!("{region}{}", Self::COMBINED_SUFFIX)
    }
}

/// Daymet v4: `.nc` files, `daily_na` before the variable token
#[derive(Debug, Clone, Copy, Default)]
pub struct V4Convention;

impl V4Convention {
    const MARKER: &'static str = "_daymet_v4_daily_na_";
    const EXTENSION: &'static str = ".nc";
    const COMBINED_SUFFIX: &'static str = "_daymet_v4_daily_na.nc";
}

impl NamingConvention for V4Convention {
    fn version(&self) -> DaymetVersion {
        DaymetVersion::V4
    }

    fn parse_yearly(&self, file_name: &str) -> Option<YearlyName> {
        split_yearly(file_name.strip_suffix(Self::EXTENSION)?, Self::MARKER)
    }

    fn yearly_file_name(&self, region: &RegionId, variable: &str, period: Period) -> String {
        format!("{region}{}{variable}_{period}{}", Self::MARKER, Self::EXTENSION)
    }

    fn parse_combined(&self, file_name: &str) -> Option<RegionId> {
        split_combined(file_name, Self::COMBINED_SUFFIX)
    }

    fn combined_file_name(&self, region: &RegionId) -> String {
        format!("{region}{}", Self::COMBINED_SUFFIX)
    }
}
