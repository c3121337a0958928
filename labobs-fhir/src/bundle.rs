//! Run-wide assembly: every row becomes one observation, and every
//! observation lands both in its own artifact and in the bundle.

use labobs_core::{
    Bundle, BundleEntry, BundleType, LabRow, ObservationRecord, Reference, ResourceType,
    ResultHistorySection,
};
use tracing::{error, info_span};
use uuid::Uuid;

use crate::narrative::{render_table, HistoryRow};
use crate::observation::{ObservationBuilder, RowError};
use crate::terminology::ConceptLookup;

/// An observation together with the index of the row it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RowObservation {
    pub index: usize,
    pub record: ObservationRecord,
}

impl RowObservation {
    pub fn code(&self) -> &str {
        self.record
            .code
            .coding
            .first()
            .map(|coding| coding.code.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct RowFailure {
    pub index: usize,
    pub error: RowError,
}

/// Outcome of one run over the table.
#[derive(Debug)]
pub struct Assembly {
    /// Built observations in row order.
    pub observations: Vec<RowObservation>,
    pub bundle: Bundle,
    pub failures: Vec<RowFailure>,
}

impl Assembly {
    pub fn rows_processed(&self) -> usize {
        self.observations.len() + self.failures.len()
    }
}

pub struct BundleAssembler<'a, L> {
    builder: ObservationBuilder<'a, L>,
}

impl<'a, L: ConceptLookup> BundleAssembler<'a, L> {
    pub fn new(builder: ObservationBuilder<'a, L>) -> Self {
        Self { builder }
    }

    pub fn assemble(&self, rows: &[LabRow]) -> Assembly {
        self.assemble_with(rows, |_| {})
    }

    /// Like [`assemble`](Self::assemble), handing each observation to `sink`
    /// as soon as it is built so it can be persisted before the next row.
    pub fn assemble_with<F>(&self, rows: &[LabRow], mut sink: F) -> Assembly
    where
        F: FnMut(&RowObservation),
    {
        let mut observations = Vec::with_capacity(rows.len());
        let mut history = Vec::with_capacity(rows.len());
        let mut failures = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            let span = info_span!("row", index);
            let _entered = span.enter();

            match self.builder.build(row) {
                Ok(record) => {
                    history.push(HistoryRow::new(row, &record));
                    let observation = RowObservation { index, record };
                    sink(&observation);
                    observations.push(observation);
                }
                Err(err) => {
                    error!(error = %err, "skipping row");
                    failures.push(RowFailure { index, error: err });
                }
            }
        }

        let bundle = collection_bundle(&observations, &history);
        Assembly {
            observations,
            bundle,
            failures,
        }
    }
}

fn collection_bundle(observations: &[RowObservation], history: &[HistoryRow]) -> Bundle {
    let entry: Vec<BundleEntry> = observations
        .iter()
        .map(|observation| BundleEntry {
            full_url: observation.record.full_url(),
            resource: observation.record.clone(),
        })
        .collect();

    let section = if entry.is_empty() {
        Vec::new()
    } else {
        let references = entry
            .iter()
            .map(|item| Reference::to(item.full_url.clone()))
            .collect();
        match render_table(history) {
            Ok(div) => vec![ResultHistorySection::new(div, references)],
            Err(err) => {
                error!(error = %err, "result history narrative not rendered");
                Vec::new()
            }
        }
    };

    Bundle {
        resource_type: ResourceType::Bundle,
        id: Uuid::new_v4(),
        kind: BundleType::Collection,
        entry,
        section,
    }
}
