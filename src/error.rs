use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RevioError {
    #[error("missing required descriptor field: {0}")]
    MissingField(String),

    #[error("failed to read descriptor {path}: {message}")]
    DescriptorRead { path: Utf8PathBuf, message: String },

    #[error("failed to parse descriptor {path}: {message}")]
    DescriptorParse { path: Utf8PathBuf, message: String },

    #[error("run discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("no runs found in {0}")]
    #[diagnostic(help("expected <root>/<run>/.../metadata/*.metadata.xml"))]
    NoRunsFound(Utf8PathBuf),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("run {0} is pending and cannot be processed")]
    #[diagnostic(help("re-run once the transfer of this run has completed"))]
    RunPending(String),

    #[error("invalid run selection: {0}")]
    InvalidSelection(usize),

    #[error("hifi_reads directory not found at {0}")]
    SourceDirMissing(Utf8PathBuf),

    #[error("no HiFi BAM files found in {0}")]
    NoReadFiles(Utf8PathBuf),

    #[error("PBI index not found for BAM: {0}")]
    MissingIndex(Utf8PathBuf),

    #[error("no valid HiFi files identified for run {0}")]
    NoFilesIdentified(String),

    #[error("sample {sample}: {first} and {second} both map to {dest}")]
    #[diagnostic(help("biosample names must be unique per read file within a run"))]
    DestinationCollision {
        sample: String,
        dest: Utf8PathBuf,
        first: Utf8PathBuf,
        second: Utf8PathBuf,
    },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("copy failed: {0}")]
    CopyFailed(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
