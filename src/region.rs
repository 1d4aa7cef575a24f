//! Region identifiers

use serde::Deserialize;
use std::fmt;

/// Opaque key of a region of interest (a basin, a gauge catchment, ...)
///
/// Identifiers coming from geo files or configs may be numeric; they are
/// always handled as strings so `"01013500"` keeps its leading zero.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(String);

impl RegionId {
    pub fn new(id: impl Into<String>) -> Self {
        RegionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Left-pad purely numeric identifiers with zeros up to `width`
    ///
    /// USGS gauge ids are eight digits but often stored as integers in
    /// attribute tables, which drops the leading zero.
    #[must_use]
    pub fn zero_padded(&self, width: usize) -> Self {
        if !self.0.is_empty() && self.0.len() < width && self.0.bytes().all(|b| b.is_ascii_digit()) {
            RegionId(format!("{:0>width$}", self.0))
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(value: &str) -> Self {
        RegionId(value.to_string())
    }
}

impl From<String> for RegionId {
    fn from(value: String) -> Self {
        RegionId(value)
    }
}

impl<'de> Deserialize<'de> for RegionId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Integer(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => RegionId(s),
            Raw::Integer(i) => RegionId(i.to_string()),
        })
    }
}
