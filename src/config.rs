use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::copy::CopyOptions;
use crate::domain::{MultiplexPolicy, TieBreak};
use crate::error::RevioError;
use crate::resolve::ResolveOptions;

pub const CONFIG_FILE_NAME: &str = "revio-copy.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub multiplex_policy: Option<MultiplexPolicy>,
    #[serde(default)]
    pub tie_break: Option<TieBreak>,
    #[serde(default)]
    pub rclone_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub output_dir: Option<Utf8PathBuf>,
    pub multiplex_policy: MultiplexPolicy,
    pub tie_break: TieBreak,
    pub rclone_path: Option<PathBuf>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            output_dir: None,
            multiplex_policy: MultiplexPolicy::default(),
            tie_break: TieBreak::default(),
            rclone_path: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; otherwise `./revio-copy.json` and then the
    /// user config directory are tried, falling back to defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, RevioError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => match default_config_path() {
                Some(path) => path,
                None => return Ok(ResolvedConfig::default()),
            },
        };
        debug!(config = %config_path, "loading config");

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| RevioError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| RevioError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            output_dir: config
                .output_dir
                .filter(|dir| !dir.is_empty())
                .map(Utf8PathBuf::from),
            multiplex_policy: config.multiplex_policy.unwrap_or_default(),
            tie_break: config.tie_break.unwrap_or_default(),
            rclone_path: config.rclone_path.map(PathBuf::from),
        }
    }
}

fn default_config_path() -> Option<Utf8PathBuf> {
    let local = Utf8PathBuf::from(CONFIG_FILE_NAME);
    if local.as_std_path().is_file() {
        return Some(local);
    }
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.config_dir().join("revio-copy").join("config.json"))
                .ok()
        })
        .filter(|path| path.as_std_path().is_file())
}

/// Everything one pipeline invocation needs, passed explicitly to each stage.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root: Utf8PathBuf,
    pub output_dir: Option<Utf8PathBuf>,
    pub run_name: Option<String>,
    pub debug: bool,
    pub dry_run: bool,
    pub multiplex_policy: MultiplexPolicy,
    pub tie_break: TieBreak,
    pub rclone_path: Option<PathBuf>,
}

impl Settings {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self::from_config(root, ResolvedConfig::default())
    }

    pub fn from_config(root: impl Into<Utf8PathBuf>, config: ResolvedConfig) -> Self {
        Self {
            root: root.into(),
            output_dir: config.output_dir,
            run_name: None,
            debug: false,
            dry_run: false,
            multiplex_policy: config.multiplex_policy,
            tie_break: config.tie_break,
            rclone_path: config.rclone_path,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// `None` when no output directory is configured (listing only).
    pub fn resolve_options(&self) -> Option<ResolveOptions> {
        self.output_dir.as_ref().map(|output_root| ResolveOptions {
            output_root: output_root.clone(),
            multiplex_policy: self.multiplex_policy,
            tie_break: self.tie_break,
        })
    }

    pub fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            dry_run: self.dry_run,
            verbose: self.debug,
        }
    }
}
