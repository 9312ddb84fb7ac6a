//! WASM bindings for booking-engine.
//!
//! Exposes recurrence expansion, conflict checks, free-interval resolution,
//! series materialization and template validation to the scheduling front end
//! via `wasm-bindgen`. Structured values cross the boundary as JSON strings in
//! the same camelCase shapes the library serializes; dates are `YYYY-MM-DD`.
//!
//! ## Build process
//!
//! ```sh
//! cargo build -p booking-engine-wasm --target wasm32-unknown-unknown --release
//! wasm-bindgen --target web --out-dir packages/booking-engine-js/wasm/ \
//!   target/wasm32-unknown-unknown/release/booking_engine_wasm.wasm
//! ```

use booking_engine::conflict::all_conflicts;
use booking_engine::{
    check_conflict, expand, find_free_intervals, materialize, AvailabilityRequest,
    BookingTemplate, Candidate, Commitments, RecurrenceSpec, RecurringAppointmentSeries,
};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_date(s: &str) -> Result<NaiveDate, JsValue> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| JsValue::from_str(&format!("Invalid date '{}': {}", s, e)))
}

/// Deserialize `json` into `T`. Validation errors from the library's typed
/// constructors surface here with `what` as the prefix.
fn from_json<T: DeserializeOwned>(json: &str, what: &str) -> Result<T, JsValue> {
    serde_json::from_str(json)
        .map_err(|e| JsValue::from_str(&format!("Invalid {} JSON: {}", what, e)))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// An empty string means "no commitments".
fn commitments(json: &str) -> Result<Commitments, JsValue> {
    if json.trim().is_empty() {
        return Ok(Commitments::default());
    }
    from_json(json, "commitments")
}

// ---------------------------------------------------------------------------
// WASM exports
// ---------------------------------------------------------------------------

/// Expand a recurrence spec into dates inside `[window_start, window_end]`.
///
/// Returns a JSON array of `YYYY-MM-DD` strings.
#[wasm_bindgen(js_name = "expandRecurrence")]
pub fn expand_recurrence(
    spec_json: &str,
    window_start: &str,
    window_end: &str,
) -> Result<String, JsValue> {
    let spec: RecurrenceSpec = from_json(spec_json, "recurrence spec")?;
    let dates = expand(&spec, parse_date(window_start)?, parse_date(window_end)?)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    to_json(&dates)
}

/// Check a proposed booking against existing commitments.
///
/// Returns `null` when the slot is clear, otherwise the first conflict by
/// precedence. With `all`, returns an array of every conflict instead.
#[wasm_bindgen(js_name = "checkConflict")]
pub fn check_conflict_js(
    candidate_json: &str,
    commitments_json: &str,
    all: bool,
) -> Result<String, JsValue> {
    let candidate: Candidate = from_json(candidate_json, "candidate")?;
    let existing = commitments(commitments_json)?;

    if all {
        to_json(&all_conflicts(&candidate, &existing))
    } else {
        to_json(&check_conflict(&candidate, &existing))
    }
}

/// Free intervals for one provider and date.
///
/// Returns a JSON array of `{startTime, endTime, durationMinutes}` objects.
#[wasm_bindgen(js_name = "findFreeIntervals")]
pub fn find_free_intervals_js(
    request_json: &str,
    commitments_json: &str,
) -> Result<String, JsValue> {
    let request: AvailabilityRequest = from_json(request_json, "availability request")?;
    let existing = commitments(commitments_json)?;
    to_json(&find_free_intervals(&request, &existing))
}

/// Materialize a series over `[window_start, window_end]`.
///
/// Returns `{created, conflicts, aborted}`. Nothing is persisted; the caller
/// saves `created` only when `aborted` is false.
#[wasm_bindgen(js_name = "materializeSeries")]
pub fn materialize_series(
    series_json: &str,
    window_start: &str,
    window_end: &str,
    skip_conflicts: bool,
    commitments_json: &str,
) -> Result<String, JsValue> {
    let series: RecurringAppointmentSeries = from_json(series_json, "series")?;
    let existing = commitments(commitments_json)?;
    let result = materialize(
        &series,
        parse_date(window_start)?,
        parse_date(window_end)?,
        skip_conflicts,
        &existing,
    )
    .map_err(|e| JsValue::from_str(&e.to_string()))?;
    to_json(&result)
}

/// Validate a booking template in either block or legacy-slot shape.
///
/// Returns the normalized template; overlapping or malformed blocks are an error.
#[wasm_bindgen(js_name = "validateTemplate")]
pub fn validate_template(template_json: &str) -> Result<String, JsValue> {
    let template: BookingTemplate = from_json(template_json, "template")?;
    to_json(&template)
}
