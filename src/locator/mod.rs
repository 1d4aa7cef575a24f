//! File discovery
//!
//! Maps a directory tree of Daymet files back to logical per-region groups.
//! Matching is purely structural: directory names and file-name tokens are
//! compared, no file is opened. Two layouts are recognised for yearly files:
//!
//! - `{root}/{variable}/{id}/{yearly file}` as produced by the download step
//! - `{root}/{id}/{yearly file}`, the variable taken from the file name
//!
//! Combined per-region files live directly in `{root}`.

pub mod convention;

pub use convention::{DaymetVersion, NamingConvention, Period, V3Convention, V4Convention, YearlyName};

use crate::errors::{DaymetError, Result};
use crate::region::RegionId;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A discovered file and the fields its name encodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub region: RegionId,
    /// `None` for combined files holding every variable
    pub variable: Option<String>,
    pub period: Option<Period>,
    pub version: DaymetVersion,
}

impl FileDescriptor {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Files of one region, sub-grouped by variable (`None` for combined files)
pub type RegionFiles = BTreeMap<Option<String>, Vec<FileDescriptor>>;

/// Discovered files grouped by region
#[derive(Debug, Clone, Default)]
pub struct FileGroup {
    regions: BTreeMap<RegionId, RegionFiles>,
}

impl FileGroup {
    pub fn insert(&mut self, descriptor: FileDescriptor) {
        self.regions
            .entry(descriptor.region.clone())
            .or_default()
            .entry(descriptor.variable.clone())
            .or_default()
            .push(descriptor);
    }

    pub fn get(&self, region: &RegionId) -> Option<&RegionFiles> {
        self.regions.get(region)
    }

    pub fn regions(&self) -> impl Iterator<Item = &RegionId> {
        self.regions.keys()
    }

    pub fn file_count(&self, region: &RegionId) -> usize {
        self.regions
            .get(region)
            .map_or(0, |files| files.values().map(Vec::len).sum())
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl IntoIterator for FileGroup {
    type Item = (RegionId, RegionFiles);
    type IntoIter = std::collections::btree_map::IntoIter<RegionId, RegionFiles>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.into_iter()
    }
}

/// Which regions to keep; an empty selection keeps all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionFilter {
    selected: BTreeSet<RegionId>,
}

impl RegionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(ids: &[RegionId]) -> Self {
        Self {
            selected: ids.iter().cloned().collect(),
        }
    }

    pub fn allows(&self, region: &RegionId) -> bool {
        self.selected.is_empty() || self.selected.contains(region)
    }

    /// Explicitly requested regions, empty when all are selected
    pub fn requested(&self) -> &BTreeSet<RegionId> {
        &self.selected
    }
}

/// Result of a discovery pass
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub files: FileGroup,
    /// Requested regions for which nothing was found
    pub missing: Vec<RegionId>,
    /// Files that matched no naming convention
    pub ignored: Vec<PathBuf>,
}

impl Discovery {
    fn finish(mut self, filter: &RegionFilter, root: &Path) -> Self {
        for region in filter.requested() {
            if self.files.get(region).is_none() {
                warn!(region = %region, "No Daymet files found in {}", root.display());
                self.missing.push(region.clone());
            }
        }
        self
    }
}

/// Scans a root directory for files following one version's convention
#[derive(Debug, Clone)]
pub struct FileLocator {
    root: PathBuf,
    version: DaymetVersion,
}

impl FileLocator {
    pub fn new(root: impl AsRef<Path>, version: DaymetVersion) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            version,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn convention(&self) -> &'static dyn NamingConvention {
        self.version.convention()
    }

    /// Entries of the root directory; an unreadable root aborts the run
    fn root_entries(&self) -> Result<Vec<PathBuf>> {
        sorted_entries(&self.root).map_err(|e| {
            DaymetError::config(format!("cannot read data directory {}: {e}", self.root.display()))
        })
    }

    /// Discover yearly per-variable files
    ///
    /// `variables` restricts discovery to the given variables; empty means all.
    pub fn locate_yearly(&self, filter: &RegionFilter, variables: &[String]) -> Result<Discovery> {
        let mut discovery = Discovery::default();
        let wanted = |variable: &str| variables.is_empty() || variables.iter().any(|v| v == variable);

        for top in self.root_entries()? {
            if !top.is_dir() {
                debug!("Ignoring {}: yearly files are expected in sub directories", top.display());
                discovery.ignored.push(top);
                continue;
            }
            let top_name = dir_name(&top);

            for entry in sorted_entries_lenient(&top) {
                if entry.is_dir() {
                    // {root}/{variable}/{id}/...
                    if !wanted(&top_name) {
                        continue;
                    }
                    let region = RegionId::new(dir_name(&entry));
                    if !filter.allows(&region) {
                        continue;
                    }
                    for file in sorted_entries_lenient(&entry) {
                        self.match_yearly(&file, &region, Some(&top_name), &wanted, &mut discovery);
                    }
                } else {
                    // {root}/{id}/...
                    let region = RegionId::new(top_name.clone());
                    if !filter.allows(&region) {
                        continue;
                    }
                    self.match_yearly(&entry, &region, None, &wanted, &mut discovery);
                }
            }
        }

        let discovery = discovery.finish(filter, &self.root);
        for region in discovery.files.regions() {
            let found = discovery.files.get(region);
            for variable in variables {
                if found.is_some_and(|f| !f.contains_key(&Some(variable.clone()))) {
                    warn!(region = %region, "No files found for variable '{variable}'");
                }
            }
        }
        Ok(discovery)
    }

    fn match_yearly(
        &self,
        path: &Path,
        region: &RegionId,
        variable_dir: Option<&str>,
        wanted: &dyn Fn(&str) -> bool,
        discovery: &mut Discovery,
    ) {
        if path.is_dir() {
            return;
        }
        let file_name = dir_name(path);
        let parsed = self
            .convention()
            .parse_yearly(&file_name)
            .filter(|name| &name.region == region)
            .filter(|name| variable_dir.map_or(true, |dir| dir == name.variable));

        match parsed {
            Some(name) if wanted(&name.variable) => discovery.files.insert(FileDescriptor {
                path: path.to_path_buf(),
                region: name.region,
                variable: Some(name.variable),
                period: Some(name.period),
                version: self.version,
            }),
            Some(_) => {}
            None => {
                debug!(
                    "Ignoring {}: does not follow the Daymet {} naming convention",
                    path.display(),
                    self.version
                );
                discovery.ignored.push(path.to_path_buf());
            }
        }
    }

    /// Discover combined per-region files directly inside the root directory
    pub fn locate_combined(&self, filter: &RegionFilter) -> Result<Discovery> {
        let mut discovery = Discovery::default();

        for path in self.root_entries()? {
            if path.is_dir() {
                continue;
            }
            match self.convention().parse_combined(&dir_name(&path)) {
                Some(region) if filter.allows(&region) => discovery.files.insert(FileDescriptor {
                    path,
                    region,
                    variable: None,
                    period: None,
                    version: self.version,
                }),
                Some(_) => {}
                None => {
                    debug!(
                        "Ignoring {}: not a combined Daymet {} file",
                        path.display(),
                        self.version
                    );
                    discovery.ignored.push(path);
                }
            }
        }

        Ok(discovery.finish(filter, &self.root))
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Entries of a directory, hidden ones skipped, sorted by path
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !dir_name(&path).starts_with('.') {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

fn sorted_entries_lenient(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    sorted_entries(dir).unwrap_or_else(|e| {
        warn!("Cannot read directory {}: {e}", dir.display());
        Vec::new()
    })
}
