//! `config.json` loading.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use labobs_core::{ConfigError, RunConfig};
use labobs_fhir::terminology::DEFAULT_TERMINOLOGY_SERVER;
use serde::Deserialize;

pub const DEFAULT_SOURCE_FILE: &str = "srcfile.txt";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    subject: Option<String>,
    performer: Option<String>,
    srcfile: Option<String>,
    terminology_server: Option<String>,
}

/// Everything a run needs from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub run: RunConfig,
    /// Source table name, resolved against the root data folder.
    pub source_file: PathBuf,
    pub terminology_server: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("config {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("config {path}: {source}")]
    Invalid { path: PathBuf, source: ConfigError },
}

pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(&text, path)
}

/// `origin` only labels errors.
pub fn parse_settings(text: &str, origin: &Path) -> Result<Settings, SettingsError> {
    let file: SettingsFile = serde_json::from_str(text).map_err(|source| SettingsError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;

    let run = RunConfig::new(
        file.subject.as_deref().unwrap_or_default(),
        file.performer.as_deref(),
    )
    .map_err(|source| SettingsError::Invalid {
        path: origin.to_path_buf(),
        source,
    })?;

    Ok(Settings {
        run,
        source_file: file
            .srcfile
            .filter(|name| !name.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_SOURCE_FILE), PathBuf::from),
        terminology_server: file
            .terminology_server
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TERMINOLOGY_SERVER.to_string()),
    })
}
