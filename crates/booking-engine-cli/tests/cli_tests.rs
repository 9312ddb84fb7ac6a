//! Integration tests for the `bookgen` CLI binary.
//!
//! These run the actual binary with `assert_cmd`, feeding JSON fixtures via
//! `-i` or stdin and checking the JSON written to stdout or `-o`.

// `Command::cargo_bin` was deprecated in assert_cmd 2.1.2 in favor of
// `cargo::cargo_bin_cmd!`. Allow it until we migrate.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

/// Helper: absolute path to a fixture file.
fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

/// Helper: a `bookgen` command isolated from the caller's environment.
fn bookgen() -> Command {
    let mut cmd = Command::cargo_bin("bookgen").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("BOOKGEN_CLINIC__TIMEZONE")
        .env_remove("BOOKGEN_SCHEDULING__SLOT_STEP_MINUTES")
        .env_remove("BOOKGEN_SCHEDULING__DEFAULT_WINDOW_DAYS");
    cmd
}

/// Helper: run and parse stdout as JSON.
fn run_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout must be valid JSON")
}

// ─────────────────────────────────────────────────────────────────────────────
// expand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn expand_weekly_from_file() {
    let dates = run_json(bookgen().args(["expand", "-i", &fixture("expand_weekly.json")]));
    assert_eq!(
        dates,
        serde_json::json!([
            "2025-01-06", "2025-01-08", "2025-01-10",
            "2025-01-13", "2025-01-15", "2025-01-17"
        ])
    );
}

#[test]
fn expand_from_stdin_with_default_window() {
    // Monthly for a year, but the default 90-day window starting Jan 1 ends Apr 1.
    let input = r#"{
        "recurrence": {"pattern": "MONTHLY", "dayOfMonth": 1, "startDate": "2025-01-01", "endDate": "2025-12-31"},
        "windowStart": "2025-01-01"
    }"#;
    let dates = run_json(bookgen().arg("expand").write_stdin(input));
    assert_eq!(
        dates,
        serde_json::json!(["2025-01-01", "2025-02-01", "2025-03-01", "2025-04-01"])
    );
}

#[test]
fn expand_rejects_invalid_spec() {
    let input = r#"{"recurrence": {"pattern": "WEEKLY", "startDate": "2025-01-06"}, "windowStart": "2025-01-01"}"#;
    bookgen()
        .arg("expand")
        .write_stdin(input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse input JSON"));
}

// ─────────────────────────────────────────────────────────────────────────────
// check
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn check_returns_highest_precedence_conflict() {
    let conflict = run_json(bookgen().args(["check", "-i", &fixture("check_lunch.json")]));
    assert_eq!(conflict["kind"], "PROVIDER_DOUBLE_BOOKED");
    assert_eq!(conflict["entity"]["id"], "appt-1");
}

#[test]
fn check_all_lists_every_conflict() {
    let conflicts =
        run_json(bookgen().args(["check", "--all", "-i", &fixture("check_lunch.json")]));
    let kinds: Vec<&str> = conflicts
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["PROVIDER_DOUBLE_BOOKED", "OUTSIDE_WORKING_HOURS"]);
}

#[test]
fn check_clear_slot_prints_null() {
    let input = r#"{
        "candidate": {"providerId": "dr-a", "date": "2025-01-06", "startTime": "09:00", "endTime": "09:30"},
        "existing": {"schedules": [{"providerId": "dr-a", "dayOfWeek": 1, "startTime": "08:00", "endTime": "12:00"}]}
    }"#;
    bookgen()
        .arg("check")
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::diff("null\n"));
}

// ─────────────────────────────────────────────────────────────────────────────
// free / slots
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn free_intervals_respect_blocks_and_appointments() {
    let free = run_json(bookgen().args(["free", "-i", &fixture("availability.json")]));
    let ranges: Vec<(String, String)> = free
        .as_array()
        .unwrap()
        .iter()
        .map(|f| {
            (
                f["startTime"].as_str().unwrap().to_string(),
                f["endTime"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        ranges,
        vec![
            ("08:00".to_string(), "09:00".to_string()),
            ("10:00".to_string(), "12:00".to_string()),
            ("13:00".to_string(), "15:00".to_string()),
        ]
    );
}

#[test]
fn free_first_returns_single_interval() {
    let first = run_json(bookgen().args(["free", "--first", "-i", &fixture("availability.json")]));
    assert_eq!(first["startTime"], "08:00");
    assert_eq!(first["durationMinutes"], 60);
}

#[test]
fn slots_with_explicit_duration_and_step() {
    let slots = run_json(bookgen().args([
        "slots",
        "--duration",
        "60",
        "--step",
        "30",
        "-i",
        &fixture("availability.json"),
    ]));
    let starts: Vec<&str> = slots
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["startTime"].as_str().unwrap())
        .collect();
    assert_eq!(
        starts,
        vec!["08:00", "10:00", "10:30", "11:00", "13:00", "13:30", "14:00"]
    );
}

#[test]
fn slot_step_comes_from_environment() {
    let slots = run_json(
        bookgen()
            .env("BOOKGEN_SCHEDULING__SLOT_STEP_MINUTES", "60")
            .args(["slots", "--duration", "60", "-i", &fixture("availability.json")]),
    );
    assert_eq!(slots.as_array().unwrap().len(), 5);
}

#[test]
fn slot_step_comes_from_config_file() {
    let config_path = std::env::temp_dir().join("bookgen-test-slot-step.toml");
    std::fs::write(&config_path, "[scheduling]\nslot_step_minutes = 120\n").unwrap();

    let slots = run_json(bookgen().args([
        "--config",
        config_path.to_str().unwrap(),
        "slots",
        "--duration",
        "60",
        "-i",
        &fixture("availability.json"),
    ]));
    let starts: Vec<&str> = slots
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["startTime"].as_str().unwrap())
        .collect();
    assert_eq!(starts, vec!["08:00", "10:00", "14:00"]);

    let _ = std::fs::remove_file(&config_path);
}

#[test]
fn missing_config_file_is_an_error() {
    bookgen()
        .args(["--config", "/nonexistent/bookgen.toml", "template", "-i"])
        .arg(fixture("legacy_template.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

// ─────────────────────────────────────────────────────────────────────────────
// materialize
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn materialize_aborts_on_conflict() {
    let result = run_json(bookgen().args(["materialize", "-i", &fixture("series.json")]));
    assert_eq!(result["aborted"], true);
    assert_eq!(result["created"], serde_json::json!([]));
    assert_eq!(result["conflicts"][0]["date"], "2025-01-20");
    assert_eq!(result["conflicts"][0]["reason"]["type"], "CONFLICT");
}

#[test]
fn materialize_skip_conflicts_to_file() {
    let output_path = std::env::temp_dir().join("bookgen-test-materialize.json");
    let _ = std::fs::remove_file(&output_path);

    bookgen()
        .args(["materialize", "--skip-conflicts", "-i", &fixture("series.json"), "-o"])
        .arg(&output_path)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let content = std::fs::read_to_string(&output_path).expect("output file must exist");
    let result: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(result["aborted"], false);
    assert_eq!(result["created"].as_array().unwrap().len(), 4);
    assert!(result["created"]
        .as_array()
        .unwrap()
        .iter()
        .all(|o| o["status"] == "SCHEDULED"));

    let _ = std::fs::remove_file(&output_path);
}

// ─────────────────────────────────────────────────────────────────────────────
// cancel
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn cancel_as_of_cascades_to_future_occurrences() {
    let result = run_json(bookgen().args([
        "cancel",
        "--as-of",
        "2025-01-10",
        "-i",
        &fixture("cancel_series.json"),
    ]));
    assert_eq!(result["cancelledOccurrences"], 2);
    assert_eq!(result["series"]["status"], "CANCELLED");
    assert_eq!(result["series"]["occurrences"][0]["status"], "SCHEDULED");
    assert_eq!(result["series"]["occurrences"][2]["status"], "CANCELLED");
}

#[test]
fn cancel_with_bad_timezone_fails() {
    bookgen()
        .env("BOOKGEN_CLINIC__TIMEZONE", "Mars/Olympus")
        .args(["cancel", "-i", &fixture("cancel_series.json")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("clinic.timezone"));
}

// ─────────────────────────────────────────────────────────────────────────────
// template
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn template_normalizes_legacy_slots() {
    let template = run_json(bookgen().args(["template", "-i", &fixture("legacy_template.json")]));
    let blocks = template["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0]["startTime"], "08:00");
    assert_eq!(blocks[0]["label"], "New patients");
    assert_eq!(blocks[1]["isBlocked"], true);
    assert_eq!(blocks[2]["appointmentTypeIds"], serde_json::json!(["adjustment"]));
    assert!(template.get("slots").is_none());
}

#[test]
fn template_with_overlap_fails() {
    bookgen()
        .args(["template", "-i", &fixture("overlapping_template.json")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Overlapping schedule blocks"));
}

#[test]
fn missing_input_file_reports_path() {
    bookgen()
        .args(["expand", "-i", "/nonexistent/input.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}
