//! One conversion run: rows in, observation files and a bundle file out.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDateTime;
use labobs_core::{LabRow, RunConfig};
use labobs_fhir::{
    write_bundle, write_observation, BundleAssembler, ConceptDisplayResolver, ConceptLookup,
    HttpConceptLookup, ObservationBuilder, OfflineLookup,
};
use tracing::{error, info, info_span};

/// Counts reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rows: usize,
    /// Observations that made it into the bundle.
    pub observations: usize,
    /// Rows that produced no observation.
    pub failed_rows: usize,
    /// Observations whose own file could not be written.
    pub write_failures: usize,
    pub bundle_path: PathBuf,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.failed_rows > 0 || self.write_failures > 0
    }
}

pub fn concept_lookup(
    offline: bool,
    server: &str,
    timeout: Duration,
) -> anyhow::Result<Box<dyn ConceptLookup>> {
    if offline {
        info!("terminology lookups disabled");
        return Ok(Box::new(OfflineLookup));
    }
    let lookup = HttpConceptLookup::new(server, timeout)
        .with_context(|| format!("cannot build terminology client for {server}"))?;
    Ok(Box::new(lookup))
}

pub fn prepare_out_dir(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("cannot create output folder {}", dir.display()))
}

/// Build every row, writing each observation file as soon as it exists,
/// then write the bundle.
///
/// A row that fails, or whose file cannot be written, is counted and the
/// run goes on. Failing to write the bundle ends the run with an error.
pub fn run<L: ConceptLookup>(
    rows: &[LabRow],
    config: &RunConfig,
    resolver: &ConceptDisplayResolver<L>,
    out_dir: &Path,
    created_at: NaiveDateTime,
) -> anyhow::Result<RunSummary> {
    let span = info_span!("run", out_dir = %out_dir.display());
    let _entered = span.enter();
    info!(rows = rows.len(), "processing lab results");

    let assembler = BundleAssembler::new(ObservationBuilder::new(config, resolver));
    let mut write_failures = 0;
    let assembly = assembler.assemble_with(rows, |observation| {
        if let Err(err) = write_observation(out_dir, observation) {
            error!(index = observation.index, error = %err, "observation file not written");
            write_failures += 1;
        }
    });

    let bundle_path = write_bundle(out_dir, &assembly.bundle, created_at)
        .context("cannot write observation bundle")?;

    let summary = RunSummary {
        rows: assembly.rows_processed(),
        observations: assembly.observations.len(),
        failed_rows: assembly.failures.len(),
        write_failures,
        bundle_path,
    };
    info!(
        rows = summary.rows,
        observations = summary.observations,
        failed_rows = summary.failed_rows,
        write_failures = summary.write_failures,
        "run finished"
    );
    Ok(summary)
}
