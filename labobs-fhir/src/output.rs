//! JSON artifacts on disk: one file per observation, one per bundle.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use labobs_core::Bundle;
use serde::Serialize;
use tracing::info;

use crate::bundle::RowObservation;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("cannot write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cannot serialize {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

const UNSAFE_PATH_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// `observation_<code>_<index>.json`, with path separators and other
/// characters that are unsafe in file names replaced by `-`.
pub fn observation_file_name(code: &str, index: usize) -> String {
    let safe_code: String = code
        .chars()
        .map(|c| if UNSAFE_PATH_CHARS.contains(&c) { '-' } else { c })
        .collect();
    format!("observation_{safe_code}_{index:03}.json")
}

pub fn bundle_file_name(created_at: NaiveDateTime) -> String {
    format!(
        "observations_bundle_{}.json",
        created_at.format("%Y%m%d_%H%M%S")
    )
}

/// Pretty-printed JSON; non-ASCII text is written as-is.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let io_error = |source: io::Error| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| OutputError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error)
}

pub fn write_observation(dir: &Path, observation: &RowObservation) -> Result<PathBuf, OutputError> {
    let path = dir.join(observation_file_name(
        observation.code(),
        observation.index,
    ));
    write_json(&path, &observation.record)?;
    info!(file = %path.display(), "created observation file");
    Ok(path)
}

pub fn write_bundle(
    dir: &Path,
    bundle: &Bundle,
    created_at: NaiveDateTime,
) -> Result<PathBuf, OutputError> {
    let path = dir.join(bundle_file_name(created_at));
    write_json(&path, bundle)?;
    info!(
        file = %path.display(),
        observations = bundle.entry.len(),
        "created bundle"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn observation_names_are_path_safe_and_padded() {
        assert_eq!(observation_file_name("2345-7", 4), "observation_2345-7_004.json");
        assert_eq!(
            observation_file_name("AB/12\\x:y", 1234),
            "observation_AB-12-x-y_1234.json"
        );
    }

    #[test]
    fn bundle_name_is_timestamped() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|date| date.and_hms_opt(9, 5, 7))
            .unwrap();
        assert_eq!(bundle_file_name(at), "observations_bundle_20240315_090507.json");
    }

    #[test]
    fn write_json_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("x.json");
        let err = write_json(&path, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, OutputError::Io { .. }));
    }
}
