//! Directory scanning for completed descriptors and pending-transfer sentinels.
//!
//! Layout: `<root>/<run>/.../metadata/*.metadata.xml` for completed cells and
//! `<root>/<run>/.../metadata/Transfer_Test_*.txt` for cells whose transfer has
//! started. Both scans are lazy; calling the function again restarts the walk.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::domain::RunView;
use crate::error::RevioError;

pub const DESCRIPTOR_DIR: &str = "metadata";
pub const DESCRIPTOR_SUFFIX: &str = ".metadata.xml";
pub const SENTINEL_PREFIX: &str = "Transfer_Test_";
pub const SENTINEL_SUFFIX: &str = ".txt";

static RUN_NAME_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^_]*_(\d{4})(\d{2})(\d{2})(?:_|$)").expect("run name date pattern is valid")
});

/// Completed descriptors plus pending runs found under one root.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub descriptors: Vec<Utf8PathBuf>,
    pub pending: BTreeMap<String, RunView>,
}

/// Scans `root` once for descriptors and once for pending sentinels.
pub fn discover(root: &Utf8Path) -> Result<Discovery, RevioError> {
    let descriptors = descriptor_paths(root).collect::<Result<Vec<_>, _>>()?;
    let pending = find_pending_runs(root)?;
    debug!(
        root = %root,
        descriptors = descriptors.len(),
        pending = pending.len(),
        "discovery finished"
    );
    Ok(Discovery {
        descriptors,
        pending,
    })
}

/// Authoritative `*.metadata.xml` files inside directories named `metadata`.
pub fn descriptor_paths(
    root: &Utf8Path,
) -> impl Iterator<Item = Result<Utf8PathBuf, RevioError>> + use<> {
    walk(root).filter_map(|entry| match entry {
        Ok(entry) => {
            let keep = is_file(&entry)
                && in_descriptor_dir(&entry)
                && entry.file_name().to_str().is_some_and(is_descriptor_name);
            keep.then(|| to_utf8(entry.into_path()))
        }
        Err(err) => Some(Err(err)),
    })
}

/// Sentinel files in `metadata` directories that hold no authoritative descriptor yet.
pub fn pending_markers(
    root: &Utf8Path,
) -> impl Iterator<Item = Result<Utf8PathBuf, RevioError>> + use<> {
    walk(root).filter_map(|entry| {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => return Some(Err(err)),
        };
        let is_sentinel = is_file(&entry)
            && entry.file_name().to_str().is_some_and(|name| {
                name.starts_with(SENTINEL_PREFIX) && name.ends_with(SENTINEL_SUFFIX)
            });
        if !is_sentinel || !in_descriptor_dir(&entry) {
            return None;
        }
        let metadata_dir = entry.path().parent()?.to_path_buf();
        match has_descriptor(&metadata_dir) {
            Ok(true) => None,
            Ok(false) => Some(to_utf8(entry.into_path())),
            Err(err) => Some(Err(err)),
        }
    })
}

/// Groups pending sentinels by run name, the first path segment below `root`.
pub fn find_pending_runs(root: &Utf8Path) -> Result<BTreeMap<String, RunView>, RevioError> {
    let mut runs = BTreeMap::new();
    for marker in pending_markers(root) {
        let marker = marker?;
        let Ok(relative) = marker.strip_prefix(root) else {
            continue;
        };
        let segments = relative.components().collect::<Vec<_>>();
        // <run>/<...>/metadata/<sentinel>
        if segments.len() < 3 {
            continue;
        }
        let run_name = segments[0].as_str();
        if !runs.contains_key(run_name) {
            debug!(run = run_name, marker = %marker, "pending run");
            runs.insert(
                run_name.to_string(),
                RunView::pending(run_name, infer_started_date(run_name)),
            );
        }
    }
    Ok(runs)
}

/// `r84297_20250922_085610` → `20250922`, when the second token is a plausible `YYYYMMDD`.
pub fn infer_started_date(run_name: &str) -> Option<String> {
    let captures = RUN_NAME_DATE.captures(run_name)?;
    let year: u32 = captures[1].parse().ok()?;
    let month: u32 = captures[2].parse().ok()?;
    let day: u32 = captures[3].parse().ok()?;
    if year <= 2000 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(format!("{}{}{}", &captures[1], &captures[2], &captures[3]))
}

pub fn is_descriptor_name(file_name: &str) -> bool {
    file_name.ends_with(DESCRIPTOR_SUFFIX) && !file_name.to_lowercase().contains("preview")
}

fn walk(root: &Utf8Path) -> impl Iterator<Item = Result<DirEntry, RevioError>> + use<> {
    WalkDir::new(root.as_std_path())
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map_err(|err| RevioError::DiscoveryFailed(err.to_string())))
}

/// Regular files and symlinks resolving to one.
fn is_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
}

fn in_descriptor_dir(entry: &DirEntry) -> bool {
    entry
        .path()
        .parent()
        .and_then(|parent| parent.file_name())
        .is_some_and(|name| name == DESCRIPTOR_DIR)
}

fn has_descriptor(metadata_dir: &std::path::Path) -> Result<bool, RevioError> {
    let entries = fs::read_dir(metadata_dir).map_err(|err| {
        RevioError::DiscoveryFailed(format!("read {}: {err}", metadata_dir.display()))
    })?;
    for entry in entries {
        let entry = entry.map_err(|err| RevioError::DiscoveryFailed(err.to_string()))?;
        if entry.file_name().to_str().is_some_and(is_descriptor_name) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn to_utf8(path: PathBuf) -> Result<Utf8PathBuf, RevioError> {
    Utf8PathBuf::from_path_buf(path).map_err(|path| {
        RevioError::DiscoveryFailed(format!("non-utf8 path: {}", path.display()))
    })
}
