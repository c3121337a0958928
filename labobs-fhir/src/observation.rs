//! Row to `Observation` assembly.

use chrono::NaiveDate;
use labobs_core::{
    laboratory_category, present, redact, CodeableConcept, Coding, LabRow, ObservationRecord,
    ObservationStatus, Reference, ResourceType, RunConfig,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::range::reference_range;
use crate::terminology::{ConceptDisplayResolver, ConceptLookup, TerminologyError};
use crate::value::{interpret, UnitRule};

/// Input date layout, e.g. `03/15/2024`.
pub const OBSERVED_DATE_FORMAT: &str = "%m/%d/%Y";

/// Why a row produced no observation at all.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("row has no code")]
    MissingCode,
    #[error("row has no coding system")]
    MissingSystem,
    #[error("display lookup for {system}|{code} failed: {source}")]
    Lookup {
        system: String,
        code: String,
        #[source]
        source: TerminologyError,
    },
}

pub fn parse_observed_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), OBSERVED_DATE_FORMAT).ok()
}

/// Builds one `Observation` per row from the row itself and the run context.
pub struct ObservationBuilder<'a, L> {
    config: &'a RunConfig,
    resolver: &'a ConceptDisplayResolver<L>,
}

impl<'a, L: ConceptLookup> ObservationBuilder<'a, L> {
    pub fn new(config: &'a RunConfig, resolver: &'a ConceptDisplayResolver<L>) -> Self {
        Self { config, resolver }
    }

    /// Fields that fail to parse are left out with a warning; only a row
    /// without a resolvable concept is rejected.
    pub fn build(&self, row: &LabRow) -> Result<ObservationRecord, RowError> {
        let code = present(&row.code).ok_or(RowError::MissingCode)?;
        let system = present(&row.system).ok_or(RowError::MissingSystem)?;

        let display = self
            .resolver
            .resolve(code, system)
            .map_err(|source| RowError::Lookup {
                system: system.to_string(),
                code: code.to_string(),
                source,
            })?;

        let units = UnitRule::resolve(row.ucum.as_deref(), row.units.as_deref());

        let value = interpret(row.value.as_deref(), &units);
        match (&value, row.value.as_deref()) {
            (None, Some(raw)) => warn!(value = redact(raw), "invalid value"),
            (None, None) => debug!("row has no value"),
            _ => {}
        }

        let effective_date_time = present(&row.date_observed).and_then(|raw| {
            let parsed = parse_observed_date(raw);
            if parsed.is_none() {
                warn!(date = redact(raw), "invalid date format, expected MM/DD/YYYY");
            }
            parsed
        });

        let reference_range = reference_range(
            row.low_ref_range.as_deref(),
            row.high_ref_range.as_deref(),
            row.ref_range_display.as_deref(),
            &units,
        );

        Ok(ObservationRecord {
            resource_type: ResourceType::Observation,
            id: Uuid::new_v4(),
            status: ObservationStatus::Final,
            category: vec![laboratory_category()],
            code: CodeableConcept {
                coding: vec![Coding {
                    system: system.to_string(),
                    code: code.to_string(),
                    display,
                }],
                text: present(&row.text_description).map(str::to_string),
            },
            subject: Reference::to(self.config.subject.clone()),
            performer: self
                .config
                .performer
                .iter()
                .map(Reference::from)
                .collect(),
            effective_date_time,
            value,
            reference_range,
        })
    }
}
