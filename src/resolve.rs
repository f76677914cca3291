//! Mapping of a run's cells onto HiFi read files and per-sample destinations.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use tracing::{debug, warn};

use crate::discovery::DESCRIPTOR_SUFFIX;
use crate::domain::{FileMapping, MultiplexPolicy, RunView, SampleIdentity, TieBreak};
use crate::error::RevioError;

pub const READS_DIR: &str = "hifi_reads";
pub const SINGLE_SAMPLE_PATTERN: &str = "*.hifi_reads.bam";
pub const INDEX_SUFFIX: &str = ".pbi";

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub output_root: Utf8PathBuf,
    pub multiplex_policy: MultiplexPolicy,
    pub tie_break: TieBreak,
}

/// Resolves every cell of `run`, skipping cells that fail.
///
/// Fails when two sources would be copied to the same destination.
pub fn resolve_run(run: &RunView, options: &ResolveOptions) -> Result<Vec<FileMapping>, RevioError> {
    debug!(run = run.name(), cells = run.cells().len(), "identifying HiFi files");
    let mut mappings = Vec::new();
    for cell in run.cells() {
        match resolve_cell(&cell.file_path, &cell.samples, options) {
            Ok(found) => mappings.extend(found),
            Err(err) => warn!(descriptor = %cell.file_path, error = %err, "skipping cell"),
        }
    }
    if mappings.is_empty() {
        return Err(RevioError::NoFilesIdentified(run.name().to_string()));
    }
    ensure_distinct_destinations(&mappings)?;
    Ok(mappings)
}

/// Two sources sharing one destination would overwrite each other on copy.
fn ensure_distinct_destinations(mappings: &[FileMapping]) -> Result<(), RevioError> {
    let mut seen = HashMap::<&Utf8Path, &FileMapping>::with_capacity(mappings.len());
    for mapping in mappings {
        if let Some(first) = seen.insert(mapping.dest_read_file.as_path(), mapping) {
            return Err(RevioError::DestinationCollision {
                sample: mapping.sample_name.clone(),
                dest: mapping.dest_read_file.clone(),
                first: first.source_read_file.clone(),
                second: mapping.source_read_file.clone(),
            });
        }
    }
    Ok(())
}

/// Resolves the read files of one cell described by the descriptor at `descriptor`.
pub fn resolve_cell(
    descriptor: &Utf8Path,
    samples: &[SampleIdentity],
    options: &ResolveOptions,
) -> Result<Vec<FileMapping>, RevioError> {
    let reads_dir = reads_dir(descriptor);
    debug!(descriptor = %descriptor, reads_dir = %reads_dir, "resolving cell");
    if !reads_dir.is_dir() {
        return Err(RevioError::SourceDirMissing(reads_dir));
    }

    if options.multiplex_policy.is_multiplex(samples) {
        resolve_multiplexed(&reads_dir, samples, &options.output_root)
    } else {
        resolve_single(descriptor, &reads_dir, samples, options)
            .map(|mapping| vec![mapping])
    }
}

/// `<cell>/metadata/<descriptor>` → `<cell>/hifi_reads`.
pub fn reads_dir(descriptor: &Utf8Path) -> Utf8PathBuf {
    let cell_dir = descriptor
        .parent()
        .and_then(Utf8Path::parent)
        .unwrap_or_else(|| Utf8Path::new(""));
    cell_dir.join(READS_DIR)
}

fn resolve_single(
    descriptor: &Utf8Path,
    reads_dir: &Utf8Path,
    samples: &[SampleIdentity],
    options: &ResolveOptions,
) -> Result<FileMapping, RevioError> {
    let sample = samples
        .first()
        .ok_or_else(|| RevioError::MissingField(format!("biosamples for {descriptor}")))?;
    if samples.len() > 1 {
        let dropped = samples[1..]
            .iter()
            .map(|sample| sample.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            descriptor = %descriptor,
            kept = %sample.name,
            dropped = %dropped,
            "cell is not multiplexed, only the first biosample gets the reads"
        );
    }

    let candidates = glob_in(reads_dir, SINGLE_SAMPLE_PATTERN)?;
    debug!(found = candidates.len(), "single-sample BAM candidates");
    let read_file = pick_single(descriptor, candidates, options.tie_break)
        .ok_or_else(|| RevioError::NoReadFiles(reads_dir.to_owned()))?;

    let index_file = index_for(&read_file);
    if !index_file.is_file() {
        return Err(RevioError::MissingIndex(read_file));
    }
    Ok(FileMapping::new(
        read_file,
        index_file,
        &options.output_root,
        &sample.name,
    ))
}

fn pick_single(
    descriptor: &Utf8Path,
    mut candidates: Vec<Utf8PathBuf>,
    tie_break: TieBreak,
) -> Option<Utf8PathBuf> {
    if candidates.len() <= 1 {
        return candidates.pop();
    }
    if tie_break == TieBreak::DescriptorPrefix {
        if let Some(prefix) = descriptor_prefix(descriptor) {
            let matched = candidates
                .iter()
                .position(|path| path.file_name().is_some_and(|name| name.starts_with(prefix)));
            if let Some(index) = matched {
                return Some(candidates.swap_remove(index));
            }
        }
        warn!(
            descriptor = %descriptor,
            candidates = candidates.len(),
            "no BAM named after descriptor, taking first match"
        );
    }
    Some(candidates.swap_remove(0))
}

/// `m84297_250922_085610_s1.metadata.xml` → `m84297_250922_085610_s1`.
fn descriptor_prefix(descriptor: &Utf8Path) -> Option<&str> {
    descriptor
        .file_name()
        .map(|name| name.strip_suffix(DESCRIPTOR_SUFFIX).unwrap_or(name))
        .filter(|prefix| !prefix.is_empty())
}

fn resolve_multiplexed(
    reads_dir: &Utf8Path,
    samples: &[SampleIdentity],
    output_root: &Utf8Path,
) -> Result<Vec<FileMapping>, RevioError> {
    let mut mappings = Vec::new();
    for sample in samples {
        let Some(token) = sample.barcode_token() else {
            warn!(sample = %sample.name, "sample has no barcode in a multiplexed cell, skipping");
            continue;
        };
        let pattern = format!("*{}*.bam", Pattern::escape(token));
        let read_files = glob_in(reads_dir, &pattern)?;
        debug!(sample = %sample.name, pattern = %pattern, found = read_files.len(), "barcode matches");

        for read_file in read_files {
            let index_file = index_for(&read_file);
            if !index_file.is_file() {
                debug!(bam = %read_file, "PBI index not found, skipping");
                continue;
            }
            mappings.push(FileMapping::new(
                read_file,
                index_file,
                output_root,
                &sample.name,
            ));
        }
    }
    Ok(mappings)
}

fn index_for(read_file: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{read_file}{INDEX_SUFFIX}"))
}

/// Files in `dir` whose name matches `pattern`, in sorted order.
fn glob_in(dir: &Utf8Path, pattern: &str) -> Result<Vec<Utf8PathBuf>, RevioError> {
    let full = format!("{}/{pattern}", Pattern::escape(dir.as_str()));
    let paths = glob::glob(&full)
        .map_err(|err| RevioError::Filesystem(format!("invalid pattern {full}: {err}")))?;

    let mut matches = Vec::new();
    for path in paths {
        let path = path.map_err(|err| RevioError::Filesystem(err.to_string()))?;
        if !path.is_file() {
            continue;
        }
        let path = Utf8PathBuf::from_path_buf(path).map_err(|path| {
            RevioError::Filesystem(format!("non-utf8 path: {}", path.display()))
        })?;
        matches.push(path);
    }
    Ok(matches)
}
