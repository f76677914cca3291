use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::FileMapping;
use crate::error::RevioError;

#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    pub dry_run: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Copied,
    Simulated,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyOutcome {
    pub sample_name: String,
    pub dest_read_file: String,
    pub status: CopyStatus,
    pub bytes: u64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    pub dry_run: bool,
    pub files_total: usize,
    pub files_done: usize,
    pub outcomes: Vec<CopyOutcome>,
}

impl CopyReport {
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == CopyStatus::Failed)
            .count()
    }
}

/// Transfers one file with integrity verification.
pub trait Copier {
    /// Copies `source` to `dest` and returns the number of bytes transferred.
    /// With `options.dry_run` nothing is written and the source size is returned.
    fn copy_file(
        &self,
        source: &Utf8Path,
        dest: &Utf8Path,
        options: CopyOptions,
    ) -> Result<u64, RevioError>;
}

/// Copies the read file and index of every mapping; a failed mapping does not stop the batch.
pub fn copy_all<C: Copier + ?Sized>(
    copier: &C,
    mappings: &[FileMapping],
    options: CopyOptions,
) -> CopyReport {
    let files_total = mappings.len() * 2;
    let mut files_done = 0;
    let mut outcomes = Vec::with_capacity(mappings.len());
    info!(
        files = files_total,
        dry_run = options.dry_run,
        "starting copy of BAM and PBI files"
    );

    for (index, mapping) in mappings.iter().enumerate() {
        info!(
            "[{}/{}] processing biosample {}",
            index + 1,
            mappings.len(),
            mapping.sample_name
        );
        let outcome = match copy_mapping(copier, mapping, options) {
            Ok(bytes) => {
                files_done += 2;
                info!(
                    done = files_done,
                    total = files_total,
                    "progress {:.1}%",
                    files_done as f64 / files_total as f64 * 100.0
                );
                CopyOutcome {
                    sample_name: mapping.sample_name.clone(),
                    dest_read_file: mapping.dest_read_file.to_string(),
                    status: if options.dry_run {
                        CopyStatus::Simulated
                    } else {
                        CopyStatus::Copied
                    },
                    bytes,
                    message: None,
                }
            }
            Err(err) => {
                warn!(sample = %mapping.sample_name, error = %err, "copy failed");
                CopyOutcome {
                    sample_name: mapping.sample_name.clone(),
                    dest_read_file: mapping.dest_read_file.to_string(),
                    status: CopyStatus::Failed,
                    bytes: 0,
                    message: Some(err.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    CopyReport {
        dry_run: options.dry_run,
        files_total,
        files_done,
        outcomes,
    }
}

fn copy_mapping<C: Copier + ?Sized>(
    copier: &C,
    mapping: &FileMapping,
    options: CopyOptions,
) -> Result<u64, RevioError> {
    if !options.dry_run {
        if let Some(dir) = mapping.dest_dir() {
            fs::create_dir_all(dir.as_std_path()).map_err(|err| {
                RevioError::Filesystem(format!("create destination directory {dir}: {err}"))
            })?;
        }
    }
    let read_bytes = copier
        .copy_file(&mapping.source_read_file, &mapping.dest_read_file, options)
        .map_err(|err| RevioError::CopyFailed(format!("BAM file: {err}")))?;
    let index_bytes = copier
        .copy_file(&mapping.source_index_file, &mapping.dest_index_file, options)
        .map_err(|err| RevioError::CopyFailed(format!("PBI file: {err}")))?;
    Ok(read_bytes + index_bytes)
}

/// Copier backed by `rclone copyto --checksum`.
#[derive(Debug, Clone)]
pub struct RcloneCopier {
    rclone: Option<PathBuf>,
}

impl RcloneCopier {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self {
            rclone: explicit.or_else(|| find_in_path("rclone")),
        }
    }

    fn require_rclone(&self) -> Result<&PathBuf, RevioError> {
        self.rclone
            .as_ref()
            .ok_or_else(|| RevioError::MissingTool("rclone".to_string()))
    }

    /// Runs `rclone version` and returns its first line.
    pub fn check_available(&self) -> Result<String, RevioError> {
        let rclone = self.require_rclone()?;
        let output = Command::new(rclone)
            .arg("version")
            .output()
            .map_err(|err| RevioError::MissingTool(format!("rclone: {err}")))?;
        if !output.status.success() {
            return Err(RevioError::MissingTool(format!(
                "rclone version exited with {}",
                output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = stdout.lines().next().unwrap_or_default().trim().to_string();
        debug!(version = %version, "rclone available");
        Ok(version)
    }

    fn run_cmd(&self, program: &Path, args: &[String], verbose: bool) -> Result<(), RevioError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if verbose {
            // keep rclone's progress output visible
            let status = cmd
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(|err| RevioError::CopyFailed(err.to_string()))?;
            if status.success() {
                return Ok(());
            }
            return Err(RevioError::CopyFailed(format!("rclone exited with {status}")));
        }

        let output = cmd
            .output()
            .map_err(|err| RevioError::CopyFailed(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("rclone exited with {}", output.status)
        } else {
            stderr
        };
        Err(RevioError::CopyFailed(message))
    }
}

impl Copier for RcloneCopier {
    fn copy_file(
        &self,
        source: &Utf8Path,
        dest: &Utf8Path,
        options: CopyOptions,
    ) -> Result<u64, RevioError> {
        let source_size = fs::metadata(source.as_std_path())
            .map_err(|err| RevioError::Filesystem(format!("source file {source}: {err}")))?
            .len();

        let mut args = rclone_args(source, dest, options.verbose);
        if options.dry_run {
            args.insert(0, "--dry-run".to_string());
            info!(
                "[dry run] would copy {} ({}) -> {}",
                file_name(source),
                megabytes(source_size),
                file_name(dest)
            );
            if options.verbose {
                info!("[dry run] command: rclone {}", args.join(" "));
            }
            return Ok(source_size);
        }

        let rclone = self.require_rclone()?;
        info!(
            "copying {} ({}) -> {}",
            file_name(source),
            megabytes(source_size),
            file_name(dest)
        );
        self.run_cmd(rclone, &args, options.verbose)?;

        let dest_size = fs::metadata(dest.as_std_path())
            .map_err(|err| {
                RevioError::CopyFailed(format!("destination verification failed: {err}"))
            })?
            .len();
        if dest_size != source_size {
            return Err(RevioError::CopyFailed(format!(
                "size mismatch: source={source_size} bytes, destination={dest_size} bytes"
            )));
        }
        info!("copy verified ({})", megabytes(source_size));
        Ok(source_size)
    }
}

fn rclone_args(source: &Utf8Path, dest: &Utf8Path, verbose: bool) -> Vec<String> {
    let mut args = vec!["copyto".to_string(), "--checksum".to_string()];
    if verbose {
        args.push("--progress".to_string());
    }
    args.push(source.to_string());
    args.push(dest.to_string());
    args
}

fn file_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or(path.as_str())
}

fn megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}
