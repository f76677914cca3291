use std::fs;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{collect_runs, find_run, select_index};
use crate::config::Settings;
use crate::copy::{CopyReport, Copier, copy_all};
use crate::domain::{FileMapping, RunStatus, RunView};
use crate::error::RevioError;
use crate::resolve::resolve_run;

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub root: String,
    pub runs: Vec<RunSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub status: RunStatus,
    pub created_date: Option<String>,
    pub started_date: Option<String>,
    pub cells: usize,
    pub biosamples: usize,
}

impl From<&RunView> for RunSummary {
    fn from(run: &RunView) -> Self {
        Self {
            name: run.name().to_string(),
            status: run.status(),
            created_date: run.created_date().map(str::to_string),
            started_date: run.started_date().map(str::to_string),
            cells: run.cells().len(),
            biosamples: run.sample_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunDetails {
    pub name: String,
    pub started_date: Option<String>,
    pub biosample_count: usize,
    pub biosamples: Vec<String>,
}

impl From<&RunView> for RunDetails {
    fn from(run: &RunView) -> Self {
        Self {
            name: run.name().to_string(),
            started_date: run.started_date().map(str::to_string),
            biosample_count: run.sample_count(),
            biosamples: run.unique_sample_names().iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub path: String,
    pub exists: bool,
    pub size_bytes: u64,
    pub error: Option<String>,
}

impl FileStatus {
    fn probe(path: &Utf8Path) -> Self {
        match fs::metadata(path.as_std_path()) {
            Ok(meta) => Self {
                path: path.to_string(),
                exists: true,
                size_bytes: meta.len(),
                error: None,
            },
            Err(err) => Self {
                path: path.to_string(),
                exists: false,
                size_bytes: 0,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub sample_name: String,
    pub source_bam: FileStatus,
    pub source_pbi: FileStatus,
    pub dest_bam: String,
    pub dest_pbi: String,
    pub dest_dir_exists: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub files_identified: usize,
    pub valid_files: usize,
    pub missing_files: usize,
    pub bam_bytes: u64,
    pub pbi_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentificationReport {
    pub run: String,
    pub output_dir: String,
    pub generated_at: String,
    pub entries: Vec<ReportEntry>,
    pub summary: ReportSummary,
    #[serde(skip)]
    pub mappings: Vec<FileMapping>,
}

impl IdentificationReport {
    pub fn build(run: &RunView, output_dir: &Utf8Path, mappings: Vec<FileMapping>) -> Self {
        let mut summary = ReportSummary {
            files_identified: mappings.len() * 2,
            valid_files: 0,
            missing_files: 0,
            bam_bytes: 0,
            pbi_bytes: 0,
        };
        let mut entries = Vec::with_capacity(mappings.len());
        for mapping in &mappings {
            let source_bam = FileStatus::probe(&mapping.source_read_file);
            let source_pbi = FileStatus::probe(&mapping.source_index_file);
            for status in [&source_bam, &source_pbi] {
                if status.exists {
                    summary.valid_files += 1;
                } else {
                    summary.missing_files += 1;
                }
            }
            summary.bam_bytes += source_bam.size_bytes;
            summary.pbi_bytes += source_pbi.size_bytes;

            entries.push(ReportEntry {
                sample_name: mapping.sample_name.clone(),
                source_bam,
                source_pbi,
                dest_bam: mapping.dest_read_file.to_string(),
                dest_pbi: mapping.dest_index_file.to_string(),
                dest_dir_exists: mapping
                    .dest_dir()
                    .is_some_and(|dir| dir.as_std_path().is_dir()),
            });
        }

        Self {
            run: run.name().to_string(),
            output_dir: output_dir.to_string(),
            generated_at: iso_timestamp(),
            entries,
            summary,
            mappings,
        }
    }

    pub fn can_copy(&self) -> bool {
        !self.mappings.is_empty() && self.summary.missing_files == 0
    }
}

pub struct App<C: Copier> {
    settings: Settings,
    copier: C,
}

impl<C: Copier> App<C> {
    pub fn new(settings: Settings, copier: C) -> Self {
        Self { settings, copier }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn runs(&self) -> Result<Vec<RunView>, RevioError> {
        info!(root = %self.settings.root, "scanning for runs");
        collect_runs(&self.settings.root, self.settings.multiplex_policy)
    }

    pub fn list(&self) -> Result<ListResult, RevioError> {
        let runs = self.runs()?;
        Ok(ListResult {
            root: self.settings.root.to_string(),
            runs: runs.iter().map(RunSummary::from).collect(),
        })
    }

    /// The configured run, if a run name was given.
    pub fn configured_run<'a>(&self, runs: &'a [RunView]) -> Result<Option<&'a RunView>, RevioError> {
        match self.settings.run_name.as_deref() {
            Some(name) => {
                info!(run = name, "looking for run");
                find_run(runs, name).map(Some)
            }
            None => Ok(None),
        }
    }

    /// A run picked by position, as returned from an interactive selection.
    pub fn run_at<'a>(&self, runs: &'a [RunView], index: usize) -> Result<&'a RunView, RevioError> {
        select_index(runs, index)
    }

    /// Resolves and inspects the files of `run`; `None` when no output directory is configured.
    pub fn identify(&self, run: &RunView) -> Result<Option<IdentificationReport>, RevioError> {
        let Some(options) = self.settings.resolve_options() else {
            debug!("no output directory configured, skipping file identification");
            return Ok(None);
        };
        debug!(
            run = run.name(),
            cells = run.cells().len(),
            output = %options.output_root,
            "identifying files to copy"
        );
        let mappings = resolve_run(run, &options)?;
        Ok(Some(IdentificationReport::build(
            run,
            &options.output_root,
            mappings,
        )))
    }

    /// Copies every identified file; refuses when any source file is missing.
    pub fn transfer(&self, report: &IdentificationReport) -> Result<CopyReport, RevioError> {
        if !report.can_copy() {
            return Err(RevioError::CopyFailed(format!(
                "{} source files missing for run {}",
                report.summary.missing_files, report.run
            )));
        }
        Ok(copy_all(
            &self.copier,
            &report.mappings,
            self.settings.copy_options(),
        ))
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::copy::CopyOptions;
    use crate::domain::{CellMetadata, SampleIdentity};

    #[derive(Default)]
    struct MockCopier {
        calls: Mutex<usize>,
    }

    impl Copier for MockCopier {
        fn copy_file(
            &self,
            _source: &Utf8Path,
            _dest: &Utf8Path,
            _options: CopyOptions,
        ) -> Result<u64, RevioError> {
            *self.calls.lock().unwrap() += 1;
            Ok(1)
        }
    }

    fn run_with_mapping(root: &Utf8Path) -> (RunView, FileMapping) {
        let cell = CellMetadata {
            run_name: "RUN1".to_string(),
            file_path: root.join("RUN1/1_A01/metadata/m.metadata.xml"),
            created_date: None,
            started_date: None,
            well_sample_name: "WS".to_string(),
            samples: vec![SampleIdentity::new("S1", None)],
            is_multiplex: false,
        };
        let mapping = FileMapping::new(
            root.join("x.bam"),
            root.join("x.bam.pbi"),
            &root.join("out"),
            "S1",
        );
        (RunView::from_cell(cell), mapping)
    }

    #[test]
    fn report_counts_missing_sources() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("x.bam"), b"12345").unwrap();
        let (run, mapping) = run_with_mapping(&root);

        let report = IdentificationReport::build(&run, &root.join("out"), vec![mapping]);
        assert_eq!(report.summary.files_identified, 2);
        assert_eq!(report.summary.valid_files, 1);
        assert_eq!(report.summary.missing_files, 1);
        assert_eq!(report.summary.bam_bytes, 5);
        assert!(!report.entries[0].dest_dir_exists);
        assert!(!report.can_copy());

        let app = App::new(Settings::new(root.clone()), MockCopier::default());
        assert!(app.transfer(&report).is_err());
        assert_eq!(*app.copier.calls.lock().unwrap(), 0);
    }

    #[test]
    fn transfer_runs_when_sources_present() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("x.bam"), b"12345").unwrap();
        fs::write(root.join("x.bam.pbi"), b"1").unwrap();
        let (run, mapping) = run_with_mapping(&root);

        let report = IdentificationReport::build(&run, &root.join("out"), vec![mapping]);
        assert!(report.can_copy());

        let mut settings = Settings::new(root.clone());
        settings.dry_run = true;
        let app = App::new(settings, MockCopier::default());
        let copied = app.transfer(&report).unwrap();
        assert_eq!(copied.files_done, 2);
        assert_eq!(*app.copier.calls.lock().unwrap(), 2);
    }
}
