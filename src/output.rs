use std::io::{self, Write};

use serde::Serialize;

use crate::app::{IdentificationReport, ListResult, RunDetails};
use crate::copy::{CopyReport, CopyStatus};
use crate::domain::RunStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

/// Everything `process` produced, emitted as one JSON document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub run: RunDetails,
    pub report: Option<IdentificationReport>,
    pub copy: Option<CopyReport>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_process(result: &ProcessResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        write_list(&mut stdout, result)
    }

    pub fn print_details(details: &RunDetails) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        write_details(&mut stdout, details)
    }

    pub fn print_report(report: &IdentificationReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        write_report(&mut stdout, report)
    }

    pub fn print_copy(report: &CopyReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        write_copy(&mut stdout, report)
    }
}

pub fn write_list<W: Write>(out: &mut W, result: &ListResult) -> io::Result<()> {
    writeln!(out, "Runs under {}:", result.root)?;
    for (index, run) in result.runs.iter().enumerate() {
        let started = run.started_date.as_deref().unwrap_or("unknown");
        write!(
            out,
            "{}. {} - Started: {} ({} biosamples)",
            index + 1,
            run.name,
            started,
            run.biosamples
        )?;
        if run.status == RunStatus::Pending {
            write!(out, " (pending)")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn write_details<W: Write>(out: &mut W, details: &RunDetails) -> io::Result<()> {
    writeln!(out, "Run: {}", details.name)?;
    writeln!(
        out,
        "Started: {}",
        details.started_date.as_deref().unwrap_or("unknown")
    )?;
    writeln!(out, "Biosamples ({}):", details.biosample_count)?;
    for name in &details.biosamples {
        writeln!(out, "  - {name}")?;
    }
    Ok(())
}

pub fn write_report<W: Write>(out: &mut W, report: &IdentificationReport) -> io::Result<()> {
    writeln!(out, "Files for run {} -> {}", report.run, report.output_dir)?;
    for entry in &report.entries {
        writeln!(out, "Sample {}", entry.sample_name)?;
        for status in [&entry.source_bam, &entry.source_pbi] {
            if status.exists {
                writeln!(out, "  [ok] {} ({})", status.path, format_bytes(status.size_bytes))?;
            } else {
                writeln!(out, "  [missing] {}", status.path)?;
            }
        }
        let marker = if entry.dest_dir_exists { "exists" } else { "new" };
        writeln!(out, "  -> {} ({marker})", entry.dest_bam)?;
        writeln!(out, "  -> {}", entry.dest_pbi)?;
    }
    let summary = &report.summary;
    writeln!(
        out,
        "Identified {} files: {} valid, {} missing",
        summary.files_identified, summary.valid_files, summary.missing_files
    )?;
    writeln!(
        out,
        "Total size: BAM {}, PBI {}",
        format_bytes(summary.bam_bytes),
        format_bytes(summary.pbi_bytes)
    )?;
    Ok(())
}

pub fn write_copy<W: Write>(out: &mut W, report: &CopyReport) -> io::Result<()> {
    for outcome in &report.outcomes {
        let label = match outcome.status {
            CopyStatus::Copied => "copied",
            CopyStatus::Simulated => "dry-run",
            CopyStatus::Failed => "FAILED",
        };
        write!(out, "[{label}] {} -> {}", outcome.sample_name, outcome.dest_read_file)?;
        if let Some(message) = &outcome.message {
            write!(out, ": {message}")?;
        }
        writeln!(out)?;
    }
    let verb = if report.dry_run { "Simulated" } else { "Copied" };
    writeln!(
        out,
        "{verb} {}/{} files ({} failed)",
        report.files_done,
        report.files_total,
        report.failures()
    )?;
    Ok(())
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
