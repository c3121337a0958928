#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;

use labobs_core::LabRow;
use labobs_fhir::{ConceptLookup, TerminologyError};
use serde_json::{json, Value};

pub const LOINC: &str = "http://loinc.org";

pub fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

/// In-memory `$lookup` answers keyed by code; unknown codes are "not found".
#[derive(Default)]
pub struct CannedLookup {
    responses: HashMap<String, Value>,
    failing: Vec<String>,
    pub calls: RefCell<Vec<String>>,
}

impl CannedLookup {
    pub fn with(mut self, code: &str, response: Value) -> Self {
        self.responses.insert(code.to_string(), response);
        self
    }

    pub fn failing(mut self, code: &str) -> Self {
        self.failing.push(code.to_string());
        self
    }

    pub fn lab_panel() -> Self {
        Self::default()
            .with(
                "2345-7",
                json!({
                    "resourceType": "Parameters",
                    "parameter": [
                        { "name": "name", "valueString": "LOINC" },
                        { "name": "display", "valueString": "Glucose [Mass/volume] in Serum or Plasma" }
                    ]
                }),
            )
            .with(
                "1920-8",
                json!({
                    "resourceType": "Parameters",
                    "parameter": [{
                        "name": "property",
                        "part": [
                            { "name": "preferred", "valueBoolean": true },
                            {
                                "name": "display",
                                "valueString": "Aspartate aminotransferase [Enzymatic activity/volume] in Serum or Plasma"
                            }
                        ]
                    }]
                }),
            )
            .with(
                "5778-6",
                json!({
                    "resourceType": "Parameters",
                    "parameter": [{
                        "name": "property",
                        "part": [
                            { "name": "code", "valueCode": "COMPONENT" },
                            { "name": "display", "valueString": "Color of Urine" }
                        ]
                    }]
                }),
            )
    }
}

impl ConceptLookup for CannedLookup {
    fn lookup(&self, _system: &str, code: &str) -> Result<Option<Value>, TerminologyError> {
        self.calls.borrow_mut().push(code.to_string());
        if self.failing.iter().any(|failing| failing == code) {
            return Err(TerminologyError::Status { status: 502 });
        }
        Ok(self.responses.get(code).cloned())
    }
}

pub fn lab_row(code: &str, text: &str, value: &str) -> LabRow {
    LabRow {
        code: Some(code.to_string()),
        system: Some(LOINC.to_string()),
        text_description: Some(text.to_string()),
        value: Some(value.to_string()),
        ..LabRow::default()
    }
}

/// Glucose, AST, an ampicillin susceptibility with a bad date, a row with no
/// coding system, and a free-text urine color.
pub fn lab_panel_rows() -> Vec<LabRow> {
    let mut glucose = lab_row("2345-7", "Glucose", "7.5");
    glucose.units = Some("mg/dL".into());
    glucose.ucum = Some("mg/dL".into());
    glucose.low_ref_range = Some("4".into());
    glucose.high_ref_range = Some("10".into());
    glucose.ref_range_display = Some("4-10 mg/dL".into());
    glucose.date_observed = Some("03/15/2024".into());

    let mut ast = lab_row("1920-8", "AST", "15.2");
    ast.units = Some("U/L".into());
    ast.date_observed = Some("03/16/2024".into());

    let mut ampicillin = lab_row("18864-9", "Ampicillin", "S");
    ampicillin.date_observed = Some("13/40/2024".into());

    let mut orphan = lab_row("XYZ", "Unknown panel", "1");
    orphan.system = None;

    let urine = lab_row("5778-6", "Urine color", "Yellow");

    vec![glucose, ast, ampicillin, orphan, urine]
}

/// Replace generated identifiers so documents can be compared with fixtures.
pub fn normalize_dynamic_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if key == "id" && field.is_string() {
                    *field = Value::String("__ID__".to_string());
                } else {
                    normalize_dynamic_fields(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_dynamic_fields),
        Value::String(text) if text.starts_with("urn:uuid:") => {
            *text = "urn:uuid:__ID__".to_string();
        }
        _ => {}
    }
}
