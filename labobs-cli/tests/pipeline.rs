//! End-to-end runs over the fixture table, without a terminology server.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use labobs_cli::pipeline::{self, RunSummary};
use labobs_cli::settings::{load_settings, Settings};
use labobs_cli::source::read_rows;
use labobs_fhir::{observation_file_name, ConceptDisplayResolver, OfflineLookup};
use serde_json::Value;

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

fn created_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 18)
        .and_then(|date| date.and_hms_opt(10, 15, 0))
        .unwrap()
}

fn settings() -> Settings {
    load_settings(&fixture_path("config.json")).unwrap()
}

fn run_offline(out_dir: &Path) -> anyhow::Result<RunSummary> {
    let settings = settings();
    let rows = read_rows(&fixture_path("lab_results.tsv").with_file_name(&settings.source_file))?;
    let resolver = ConceptDisplayResolver::new(OfflineLookup);
    pipeline::run(&rows, &settings.run, &resolver, out_dir, created_at())
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn offline_run_writes_observations_and_bundle() {
    let out = tempfile::tempdir().unwrap();
    let summary = run_offline(out.path()).unwrap();

    assert_eq!(summary.rows, 5);
    assert_eq!(summary.observations, 4);
    assert_eq!(summary.failed_rows, 1);
    assert_eq!(summary.write_failures, 0);
    assert!(summary.has_failures());
    assert_eq!(
        summary.bundle_path,
        out.path().join("observations_bundle_20240318_101500.json")
    );

    for (code, index) in [("2345-7", 0), ("1920-8", 1), ("18864-9", 2), ("5778-6", 4)] {
        assert!(out.path().join(observation_file_name(code, index)).is_file());
    }
    assert!(!out.path().join(observation_file_name("XYZ", 3)).exists());

    let bundle = read_json(&summary.bundle_path);
    let entries = bundle["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 4);

    let glucose = read_json(&out.path().join(observation_file_name("2345-7", 0)));
    assert_eq!(entries[0]["resource"], glucose);
    assert_eq!(entries[0]["fullUrl"], format!("urn:uuid:{}", glucose["id"].as_str().unwrap()));
    assert_eq!(glucose["subject"]["reference"], "Patient/example");
    assert!(glucose["code"]["coding"][0].get("display").is_none());
    assert_eq!(glucose["code"]["text"], "Glucose");

    let ast = &entries[1]["resource"];
    assert_eq!(ast["valueQuantity"]["value"], 15);
    assert_eq!(ast["valueQuantity"]["unit"], "U/L");
    assert_eq!(ast["valueQuantity"]["code"], "U/L");
    assert_eq!(ast["referenceRange"][0]["high"]["value"], 40.0);
    assert!(ast["referenceRange"][0].get("low").is_none());
    assert_eq!(ast["referenceRange"][0]["text"], "<40 U/L");

    let ampicillin = &entries[2]["resource"];
    assert!(ampicillin.get("effectiveDateTime").is_none());
    assert_eq!(ampicillin["valueCodeableConcept"]["coding"][0]["code"], "S");

    let div = bundle["section"][0]["text"]["div"].as_str().unwrap();
    assert!(div.contains("<td>Glucose</td>"));
    assert!(div.contains("<td>7.5 mg/dL</td>"));
    assert!(div.contains("<td>15/03/2024</td>"));
    assert!(div.contains("<td>13/40/2024</td>"));
    assert!(!div.contains("Unknown panel"));
}

#[test]
fn unwritable_observation_file_is_counted_but_still_bundled() {
    let out = tempfile::tempdir().unwrap();
    fs::create_dir(out.path().join(observation_file_name("1920-8", 1))).unwrap();

    let summary = run_offline(out.path()).unwrap();

    assert_eq!(summary.write_failures, 1);
    assert_eq!(summary.observations, 4);
    let bundle = read_json(&summary.bundle_path);
    assert_eq!(bundle["entry"].as_array().unwrap().len(), 4);
}

#[test]
fn missing_output_folder_aborts_the_run() {
    let out = tempfile::tempdir().unwrap();
    let err = run_offline(&out.path().join("not-created")).unwrap_err();
    assert!(format!("{err:#}").contains("cannot write observation bundle"));
}

#[test]
fn prepared_output_folder_accepts_a_run() {
    let out = tempfile::tempdir().unwrap();
    let nested = out.path().join("a").join("b");
    pipeline::prepare_out_dir(&nested).unwrap();

    let summary = run_offline(&nested).unwrap();
    assert!(summary.bundle_path.starts_with(&nested));
}

#[test]
fn offline_lookup_needs_no_server() {
    let lookup = pipeline::concept_lookup(true, "http://127.0.0.1:9/fhir", Default::default());
    assert!(lookup.is_ok());
}
