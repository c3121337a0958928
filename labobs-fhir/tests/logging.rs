//! Row-level problems must leave a log line behind.

mod common;

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use labobs_core::RunConfig;
use labobs_fhir::{Assembly, BundleAssembler, ConceptDisplayResolver, ObservationBuilder};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

use common::{lab_panel_rows, lab_row, CannedLookup};

/// In-memory log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// The single line that mentions `message`.
    fn line_with(&self, message: &str) -> String {
        let contents = self.contents();
        let lines: Vec<_> = contents.lines().filter(|line| line.contains(message)).collect();
        assert_eq!(lines.len(), 1, "expected one `{message}` line in:\n{contents}");
        lines[0].to_string()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn assemble_logged(rows: &[labobs_core::LabRow]) -> (Assembly, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(Level::DEBUG)
        .finish();

    let config = RunConfig::new("Patient/example", None).unwrap();
    let assembly = tracing::subscriber::with_default(subscriber, || {
        let resolver = ConceptDisplayResolver::new(CannedLookup::lab_panel());
        BundleAssembler::new(ObservationBuilder::new(&config, &resolver)).assemble(rows)
    });
    (assembly, logs)
}

#[test]
fn invalid_date_is_warned_and_redacted() {
    let (assembly, logs) = assemble_logged(&lab_panel_rows());

    assert!(assembly.observations[2].record.effective_date_time.is_none());
    let line = logs.line_with("invalid date format");
    assert!(line.contains("WARN"), "{line}");
    assert!(line.contains("index=2"), "{line}");
    assert!(!logs.contents().contains("13/40/2024"));
}

#[test]
fn skipped_row_is_logged_with_its_index() {
    let (assembly, logs) = assemble_logged(&lab_panel_rows());

    assert_eq!(assembly.failures.len(), 1);
    let line = logs.line_with("skipping row");
    assert!(line.contains("ERROR"), "{line}");
    assert!(line.contains("index=3"), "{line}");
    assert!(line.contains("no coding system"), "{line}");
}

#[test]
fn unusable_value_and_bound_are_warned() {
    let mut row = lab_row("2345-7", "Glucose", "   ");
    row.low_ref_range = Some("abc".into());
    row.high_ref_range = Some("10".into());

    let (assembly, logs) = assemble_logged(&[row]);

    let record = &assembly.observations[0].record;
    assert!(record.value.is_none());
    assert!(record.reference_range.is_some());

    let value_line = logs.line_with("invalid value");
    assert!(value_line.contains("WARN") && value_line.contains("index=0"), "{value_line}");
    let bound_line = logs.line_with("invalid reference range bound");
    assert!(bound_line.contains("WARN") && bound_line.contains("bound"), "{bound_line}");
    assert!(!logs.contents().contains("abc"));
}
