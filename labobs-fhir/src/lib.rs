//! Lab-result rows to FHIR R4 `Observation` resources and a `collection` bundle.
//!
//! The pipeline for one row is: concept display lookup, value and reference
//! range interpretation, then observation assembly. [`BundleAssembler`] runs it
//! over a whole table and gathers the results.

mod bundle;
mod fhirpath;
mod narrative;
mod observation;
mod output;
mod range;
pub mod terminology;
mod value;

pub use bundle::{Assembly, BundleAssembler, RowFailure, RowObservation};
pub use fhirpath::{FhirPathError, FhirPathQuery, PROPERTY_DISPLAY};
pub use narrative::{render_table, HistoryRow, DISPLAY_DATE_FORMAT};
pub use observation::{parse_observed_date, ObservationBuilder, RowError, OBSERVED_DATE_FORMAT};
pub use output::{
    bundle_file_name, observation_file_name, write_bundle, write_json, write_observation,
    OutputError,
};
pub use range::reference_range;
pub use terminology::{
    ConceptDisplayResolver, ConceptLookup, HttpConceptLookup, OfflineLookup, TerminologyError,
};
pub use value::{interpret, parse_number, UnitRule, ROUNDING_THRESHOLD};
