//! Data model shared by the lab-result conversion pipeline.
//!
//! Rows come in as loosely-typed strings; everything that leaves the pipeline
//! is one of the typed FHIR shapes below, serialized with `serde`.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

pub const LOINC_SYSTEM: &str = "http://loinc.org";
pub const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";
pub const OBSERVATION_CATEGORY_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/observation-category";
pub const INTERPRETATION_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/v3-ObservationInterpretation";
pub const DATA_ABSENT_REASON_URL: &str =
    "http://hl7.org/fhir/StructureDefinition/data-absent-reason";

/// Sentinel performer value meaning "performed by someone we cannot name".
pub const UNKNOWN_PERFORMER: &str = "unknown";

/// LOINC code of the "History of Results" section.
pub const RESULT_HISTORY_CODE: &str = "30954-2";

/// One lab-result line of the source table.
///
/// Field names follow the column headers of the source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabRow {
    pub code: Option<String>,
    pub system: Option<String>,
    pub text_description: Option<String>,
    pub value: Option<String>,
    /// Human display unit, e.g. `mg/dL`.
    pub units: Option<String>,
    /// Coded UCUM unit.
    pub ucum: Option<String>,
    #[serde(rename = "LowRefRange")]
    pub low_ref_range: Option<String>,
    #[serde(rename = "HighRefRange")]
    pub high_ref_range: Option<String>,
    #[serde(rename = "RR Display")]
    pub ref_range_display: Option<String>,
    /// `MM/DD/YYYY`.
    #[serde(rename = "dateobserved")]
    pub date_observed: Option<String>,
}

impl LabRow {
    /// `(code, system)` when both are present, trimmed.
    pub fn coding_key(&self) -> Option<(&str, &str)> {
        Some((present(&self.code)?, present(&self.system)?))
    }
}

/// Trimmed cell content, `None` when the cell is absent or blank.
pub fn present(cell: &Option<String>) -> Option<&str> {
    cell.as_deref().map(str::trim).filter(|text| !text.is_empty())
}

/// Who performed the observations of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Performer {
    /// Performer exists but is unknown; recorded with a data-absent-reason.
    Unknown,
    Reference(String),
}

impl Performer {
    /// Interpret a configured performer value. Blank means "no performer".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" => None,
            UNKNOWN_PERFORMER => Some(Self::Unknown),
            reference => Some(Self::Reference(reference.to_string())),
        }
    }
}

/// Per-run context shared read-only by every row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub subject: String,
    pub performer: Option<Performer>,
}

impl RunConfig {
    pub fn new(subject: &str, performer: Option<&str>) -> Result<Self, ConfigError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(ConfigError::MissingSubject);
        }
        Ok(Self {
            subject: subject.to_string(),
            performer: performer.and_then(Performer::parse),
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration has no subject reference")]
    MissingSubject,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResourceType {
    Observation,
    Bundle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
    pub system: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeableConcept {
    pub coding: Vec<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    pub fn single(coding: Coding) -> Self {
        Self {
            coding: vec![coding],
            text: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    pub url: String,
    pub value_code: String,
}

/// A FHIR reference. Either points somewhere or explains via extension why it cannot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Reference {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            extension: Vec::new(),
            reference: Some(target.into()),
        }
    }

    pub fn absent_unknown() -> Self {
        Self {
            extension: vec![Extension {
                url: DATA_ABSENT_REASON_URL.to_string(),
                value_code: "unknown".to_string(),
            }],
            reference: None,
        }
    }
}

impl From<&Performer> for Reference {
    fn from(performer: &Performer) -> Self {
        match performer {
            Performer::Unknown => Reference::absent_unknown(),
            Performer::Reference(target) => Reference::to(target.clone()),
        }
    }
}

/// Numeric magnitude of a quantity. Whole values are written as JSON integers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuantityValue {
    Integer(i64),
    Decimal(f64),
}

impl QuantityValue {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Integer(value) => value as f64,
            Self::Decimal(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quantity {
    pub value: QuantityValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Quantity {
    /// A quantity with a coded unit (UCUM system) and/or a display unit.
    pub fn new(value: QuantityValue, unit_code: Option<&str>, unit_display: Option<&str>) -> Self {
        Self {
            value,
            system: unit_code.map(|_| UCUM_SYSTEM.to_string()),
            code: unit_code.map(str::to_string),
            unit: unit_display.map(str::to_string),
        }
    }
}

/// Antibiotic susceptibility interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "CodeableConcept")]
pub enum Susceptibility {
    Susceptible,
    Intermediate,
    Resistant,
}

impl Susceptibility {
    /// Exact, case-sensitive match on `S`, `I` or `R`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "S" => Some(Self::Susceptible),
            "I" => Some(Self::Intermediate),
            "R" => Some(Self::Resistant),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Susceptible => "S",
            Self::Intermediate => "I",
            Self::Resistant => "R",
        }
    }

    pub fn display(self) -> &'static str {
        match self {
            Self::Susceptible => "Susceptible",
            Self::Intermediate => "Intermediate",
            Self::Resistant => "Resistant",
        }
    }
}

impl From<Susceptibility> for CodeableConcept {
    fn from(value: Susceptibility) -> Self {
        CodeableConcept::single(Coding {
            system: INTERPRETATION_SYSTEM.to_string(),
            code: value.code().to_string(),
            display: Some(value.display().to_string()),
        })
    }
}

/// The single `value[x]` of an observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ObservationValue {
    #[serde(rename = "valueQuantity")]
    Quantity(Quantity),
    #[serde(rename = "valueCodeableConcept")]
    Susceptibility(Susceptibility),
    #[serde(rename = "valueString")]
    Text(String),
}

/// Inclusive normal bounds. Never empty of bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ReferenceRange {
    /// `None` unless at least one bound is known.
    pub fn from_bounds(
        low: Option<Quantity>,
        high: Option<Quantity>,
        text: Option<String>,
    ) -> Option<Self> {
        if low.is_none() && high.is_none() {
            return None;
        }
        Some(Self { low, high, text })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationStatus {
    Final,
}

/// One converted lab result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    pub resource_type: ResourceType,
    pub id: Uuid,
    pub status: ObservationStatus,
    pub category: Vec<CodeableConcept>,
    pub code: CodeableConcept,
    pub subject: Reference,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub performer: Vec<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date_time: Option<NaiveDate>,
    #[serde(flatten)]
    pub value: Option<ObservationValue>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_as_list"
    )]
    pub reference_range: Option<ReferenceRange>,
}

impl ObservationRecord {
    /// In-bundle identity of this record.
    pub fn full_url(&self) -> String {
        format!("urn:uuid:{}", self.id)
    }

    /// The resolved concept display, if the terminology service knew one.
    pub fn display(&self) -> Option<&str> {
        self.code
            .coding
            .first()
            .and_then(|coding| coding.display.as_deref())
    }
}

/// The fixed `laboratory` observation category.
pub fn laboratory_category() -> CodeableConcept {
    CodeableConcept::single(Coding {
        system: OBSERVATION_CATEGORY_SYSTEM.to_string(),
        code: "laboratory".to_string(),
        display: Some("Laboratory".to_string()),
    })
}

fn serialize_as_list<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    match value {
        Some(item) => serializer.collect_seq(std::iter::once(item)),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleType {
    Collection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub full_url: String,
    pub resource: ObservationRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeStatus {
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Narrative {
    pub status: NarrativeStatus,
    pub div: String,
}

/// Human-readable table of every bundled result, with back-references.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultHistorySection {
    pub title: String,
    pub code: CodeableConcept,
    pub text: Narrative,
    pub entry: Vec<Reference>,
}

impl ResultHistorySection {
    pub fn new(div: String, entry: Vec<Reference>) -> Self {
        Self {
            title: "Result History".to_string(),
            code: CodeableConcept::single(Coding {
                system: LOINC_SYSTEM.to_string(),
                code: RESULT_HISTORY_CODE.to_string(),
                display: None,
            }),
            text: Narrative {
                status: NarrativeStatus::Generated,
                div,
            },
            entry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub resource_type: ResourceType,
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: BundleType,
    pub entry: Vec<BundleEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub section: Vec<ResultHistorySection>,
}

impl Bundle {
    /// Observations in entry order.
    pub fn observations(&self) -> impl Iterator<Item = &ObservationRecord> {
        self.entry.iter().map(|entry| &entry.resource)
    }
}

static LOG_DATA_ENABLED: AtomicBool = AtomicBool::new(false);

/// Placeholder logged instead of row values unless data logging is enabled.
pub const REDACTED_VALUE: &str = "[REDACTED]";

/// Allow raw lab values to appear in log messages.
pub fn set_log_data(enabled: bool) {
    LOG_DATA_ENABLED.store(enabled, Ordering::Release);
}

pub fn redact(value: &str) -> &str {
    if LOG_DATA_ENABLED.load(Ordering::Acquire) {
        value
    } else {
        REDACTED_VALUE
    }
}
