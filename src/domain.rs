use std::collections::BTreeSet;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One biosample declared by a cell descriptor, optionally tagged with a barcode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SampleIdentity {
    pub name: String,
    pub barcode: Option<String>,
}

impl SampleIdentity {
    pub fn new(name: impl Into<String>, barcode: Option<String>) -> Self {
        Self {
            name: name.into(),
            barcode: barcode.filter(|value| !value.is_empty()),
        }
    }

    pub fn has_barcode(&self) -> bool {
        self.barcode.is_some()
    }

    /// Forward half of a `forward--reverse` barcode pair.
    pub fn barcode_token(&self) -> Option<&str> {
        self.barcode
            .as_deref()
            .and_then(|barcode| barcode.split("--").next())
            .filter(|token| !token.is_empty())
    }
}

/// Rule deciding whether a cell's samples share one directory of demultiplexed reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MultiplexPolicy {
    /// Only the first extracted sample's barcode is inspected.
    FirstSample,
    /// Any extracted sample carrying a barcode triggers multiplexing.
    #[default]
    AnySample,
}

impl MultiplexPolicy {
    pub fn is_multiplex(self, samples: &[SampleIdentity]) -> bool {
        if samples.len() < 2 {
            return false;
        }
        match self {
            MultiplexPolicy::FirstSample => samples[0].has_barcode(),
            MultiplexPolicy::AnySample => samples.iter().any(SampleIdentity::has_barcode),
        }
    }
}

impl fmt::Display for MultiplexPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultiplexPolicy::FirstSample => write!(f, "first-sample"),
            MultiplexPolicy::AnySample => write!(f, "any-sample"),
        }
    }
}

/// Which BAM to take when a single-sample cell has several `*.hifi_reads.bam` files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Prefer the file named after the descriptor's movie prefix, else the first match.
    #[default]
    DescriptorPrefix,
    /// Always take the first match in sorted order.
    FirstMatch,
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreak::DescriptorPrefix => write!(f, "descriptor-prefix"),
            TieBreak::FirstMatch => write!(f, "first-match"),
        }
    }
}

/// Normalized contents of one `*.metadata.xml` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellMetadata {
    pub run_name: String,
    pub file_path: Utf8PathBuf,
    pub created_date: Option<String>,
    pub started_date: Option<String>,
    pub well_sample_name: String,
    pub samples: Vec<SampleIdentity>,
    pub is_multiplex: bool,
}

impl CellMetadata {
    pub fn sample_names(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|sample| sample.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Complete,
    Pending,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Complete => write!(f, "complete"),
            RunStatus::Pending => write!(f, "pending"),
        }
    }
}

/// Run-level view over every cell sharing a run name.
///
/// Fields are read-only outside this module so that `unique_sample_names`
/// always equals the union of the cells' sample names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunView {
    name: String,
    created_date: Option<String>,
    started_date: Option<String>,
    cells: Vec<CellMetadata>,
    unique_sample_names: BTreeSet<String>,
    status: RunStatus,
}

impl RunView {
    pub fn from_cell(cell: CellMetadata) -> Self {
        let mut run = Self {
            name: cell.run_name.clone(),
            created_date: cell.created_date.clone(),
            started_date: cell.started_date.clone(),
            cells: Vec::new(),
            unique_sample_names: BTreeSet::new(),
            status: RunStatus::Complete,
        };
        run.push_cell(cell);
        run
    }

    pub fn pending(name: impl Into<String>, started_date: Option<String>) -> Self {
        Self {
            name: name.into(),
            created_date: None,
            started_date,
            cells: Vec::new(),
            unique_sample_names: BTreeSet::new(),
            status: RunStatus::Pending,
        }
    }

    /// Adds a cell of the same run. Dates only fill fields that are still empty.
    pub fn push_cell(&mut self, cell: CellMetadata) {
        debug_assert_eq!(cell.run_name, self.name);
        if self.created_date.is_none() {
            self.created_date = cell.created_date.clone();
        }
        if self.started_date.is_none() {
            self.started_date = cell.started_date.clone();
        }
        self.unique_sample_names
            .extend(cell.sample_names().map(str::to_string));
        self.cells.push(cell);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_date(&self) -> Option<&str> {
        self.created_date.as_deref()
    }

    pub fn started_date(&self) -> Option<&str> {
        self.started_date.as_deref()
    }

    pub fn cells(&self) -> &[CellMetadata] {
        &self.cells
    }

    pub fn unique_sample_names(&self) -> &BTreeSet<String> {
        &self.unique_sample_names
    }

    pub fn sample_count(&self) -> usize {
        self.unique_sample_names.len()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == RunStatus::Pending
    }
}

/// Source and destination of one biosample's reads and index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMapping {
    pub source_read_file: Utf8PathBuf,
    pub source_index_file: Utf8PathBuf,
    pub dest_read_file: Utf8PathBuf,
    pub dest_index_file: Utf8PathBuf,
    pub sample_name: String,
}

impl FileMapping {
    pub fn new(
        source_read_file: Utf8PathBuf,
        source_index_file: Utf8PathBuf,
        output_root: &Utf8Path,
        sample_name: &str,
    ) -> Self {
        let dest_dir = sample_dir(output_root, sample_name);
        Self {
            source_read_file,
            source_index_file,
            dest_read_file: dest_dir.join(format!("{sample_name}.mod.unmapped.bam")),
            dest_index_file: dest_dir.join(format!("{sample_name}.mod.unmapped.bam.pbi")),
            sample_name: sample_name.to_string(),
        }
    }

    pub fn dest_dir(&self) -> Option<&Utf8Path> {
        self.dest_read_file.parent()
    }
}

pub fn sample_dir(output_root: &Utf8Path, sample_name: &str) -> Utf8PathBuf {
    output_root.join(format!("Sample_{sample_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(run: &str, samples: &[&str], started: Option<&str>) -> CellMetadata {
        CellMetadata {
            run_name: run.to_string(),
            file_path: Utf8PathBuf::from(format!("/runs/{run}/1_A01/metadata/m.metadata.xml")),
            created_date: None,
            started_date: started.map(str::to_string),
            well_sample_name: "WS".to_string(),
            samples: samples
                .iter()
                .map(|name| SampleIdentity::new(*name, None))
                .collect(),
            is_multiplex: false,
        }
    }

    #[test]
    fn empty_barcode_is_none() {
        let sample = SampleIdentity::new("S1", Some(String::new()));
        assert!(!sample.has_barcode());
        assert_eq!(sample.barcode_token(), None);
    }

    #[test]
    fn barcode_token_takes_forward_half() {
        let sample = SampleIdentity::new("S1", Some("bc1001--bc1002".to_string()));
        assert_eq!(sample.barcode_token(), Some("bc1001"));

        let single = SampleIdentity::new("S2", Some("bc2001".to_string()));
        assert_eq!(single.barcode_token(), Some("bc2001"));
    }

    #[test]
    fn run_view_keeps_first_dates_and_unions_samples() {
        let mut run = RunView::from_cell(cell("R1", &["S1", "S2"], None));
        run.push_cell(cell("R1", &["S2", "S3"], Some("2025-01-02")));
        run.push_cell(cell("R1", &["S4"], Some("2025-03-04")));

        assert_eq!(run.started_date(), Some("2025-01-02"));
        assert_eq!(run.cells().len(), 3);
        assert_eq!(run.sample_count(), 4);
        assert!(run.unique_sample_names().contains("S3"));
    }

    #[test]
    fn destination_layout() {
        let mapping = FileMapping::new(
            Utf8PathBuf::from("/in/x.hifi_reads.bam"),
            Utf8PathBuf::from("/in/x.hifi_reads.bam.pbi"),
            Utf8Path::new("/out"),
            "S1",
        );
        assert_eq!(mapping.dest_read_file, "/out/Sample_S1/S1.mod.unmapped.bam");
        assert_eq!(mapping.dest_index_file, "/out/Sample_S1/S1.mod.unmapped.bam.pbi");
        assert_eq!(mapping.dest_dir(), Some(Utf8Path::new("/out/Sample_S1")));
    }
}
