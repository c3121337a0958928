//! Tab-separated lab-result table.
//!
//! The first line names the columns. Column order does not matter, unknown
//! columns are ignored, and missing or empty cells read as absent.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use labobs_core::LabRow;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source table not found: {path}")]
    NotFound { path: PathBuf },
    #[error("cannot open source table {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("malformed source table {path}: {source}")]
    Table { path: PathBuf, source: csv::Error },
}

pub fn read_rows(path: &Path) -> Result<Vec<LabRow>, SourceError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => SourceError::NotFound {
            path: path.to_path_buf(),
        },
        _ => SourceError::Open {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let rows = read_rows_from(file).map_err(|source| SourceError::Table {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(file = %path.display(), rows = rows.len(), "loaded source table");
    Ok(rows)
}

pub fn read_rows_from<R: Read>(reader: R) -> Result<Vec<LabRow>, csv::Error> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader)
        .deserialize()
        .collect()
}
