//! Recurring appointment series and their materialization into occurrences.
//!
//! [`materialize`] expands a series' recurrence over a window, checks each date
//! with the conflict detector and returns the occurrences to persist. It does no
//! I/O; committing the result is the caller's job (see
//! [`crate::service::SchedulingService`]).
//!
//! Occurrences are never deleted. Their lifecycle:
//!
//! ```text
//! PENDING -> SCHEDULED -> MODIFIED
//!    |          |  \         |
//!    |          |   +--> SKIPPED <--+
//!    +----------+--> CANCELLED
//! ```

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::calendar::{ClockTime, TimeRange};
use crate::conflict::{check_conflict, Candidate, Commitments, Conflict};
use crate::error::{BookingError, Result};
use crate::recurrence::{expand, RecurrenceSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeriesStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl SeriesStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SeriesStatus::Active => "ACTIVE",
            SeriesStatus::Paused => "PAUSED",
            SeriesStatus::Completed => "COMPLETED",
            SeriesStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SeriesStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccurrenceStatus {
    Pending,
    Scheduled,
    Modified,
    Skipped,
    Cancelled,
}

impl OccurrenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OccurrenceStatus::Pending => "PENDING",
            OccurrenceStatus::Scheduled => "SCHEDULED",
            OccurrenceStatus::Modified => "MODIFIED",
            OccurrenceStatus::Skipped => "SKIPPED",
            OccurrenceStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OccurrenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dated instance of a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    series_id: String,
    scheduled_date: NaiveDate,
    scheduled_time: ClockTime,
    duration_minutes: u32,
    status: OccurrenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skipped_reason: Option<String>,
    /// The generated date, kept once the occurrence has been moved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_date: Option<NaiveDate>,
}

impl Occurrence {
    pub fn pending(
        series_id: impl Into<String>,
        scheduled_date: NaiveDate,
        scheduled_time: ClockTime,
        duration_minutes: u32,
    ) -> Self {
        Self {
            series_id: series_id.into(),
            scheduled_date,
            scheduled_time,
            duration_minutes,
            status: OccurrenceStatus::Pending,
            skipped_reason: None,
            original_date: None,
        }
    }

    pub fn series_id(&self) -> &str {
        &self.series_id
    }

    pub fn scheduled_date(&self) -> NaiveDate {
        self.scheduled_date
    }

    pub fn scheduled_time(&self) -> ClockTime {
        self.scheduled_time
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn status(&self) -> OccurrenceStatus {
        self.status
    }

    pub fn skipped_reason(&self) -> Option<&str> {
        self.skipped_reason.as_deref()
    }

    pub fn original_date(&self) -> Option<NaiveDate> {
        self.original_date
    }

    fn transition(&mut self, allowed: &[OccurrenceStatus], to: OccurrenceStatus) -> Result<()> {
        if !allowed.contains(&self.status) {
            return Err(BookingError::InvalidTransition {
                entity: "occurrence",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// PENDING -> SCHEDULED.
    ///
    /// # Errors
    /// `BookingError::InvalidTransition` from any other state.
    pub fn schedule(&mut self) -> Result<()> {
        self.transition(&[OccurrenceStatus::Pending], OccurrenceStatus::Scheduled)
    }

    /// Move this date only. SCHEDULED or MODIFIED -> MODIFIED.
    ///
    /// # Errors
    /// `BookingError::InvalidTransition` from any other state.
    pub fn reschedule(&mut self, date: NaiveDate, time: ClockTime) -> Result<()> {
        self.transition(
            &[OccurrenceStatus::Scheduled, OccurrenceStatus::Modified],
            OccurrenceStatus::Modified,
        )?;
        self.original_date.get_or_insert(self.scheduled_date);
        self.scheduled_date = date;
        self.scheduled_time = time;
        Ok(())
    }

    /// Drop this date from the series.
    ///
    /// # Errors
    /// `BookingError::InvalidTransition` from SKIPPED or CANCELLED.
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(
            &[
                OccurrenceStatus::Pending,
                OccurrenceStatus::Scheduled,
                OccurrenceStatus::Modified,
            ],
            OccurrenceStatus::Skipped,
        )?;
        self.skipped_reason = Some(reason.into());
        Ok(())
    }

    /// PENDING or SCHEDULED -> CANCELLED.
    ///
    /// # Errors
    /// `BookingError::InvalidTransition` from any other state.
    pub fn cancel(&mut self) -> Result<()> {
        self.transition(
            &[OccurrenceStatus::Pending, OccurrenceStatus::Scheduled],
            OccurrenceStatus::Cancelled,
        )
    }
}

/// A recurring appointment definition and the occurrences it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringAppointmentSeries {
    pub id: String,
    pub patient_id: String,
    pub provider_id: String,
    pub appointment_type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chair_id: Option<String>,
    pub duration_minutes: u32,
    pub preferred_time: ClockTime,
    pub recurrence: RecurrenceSpec,
    #[serde(default)]
    status: SeriesStatus,
    #[serde(default)]
    occurrences: Vec<Occurrence>,
}

impl RecurringAppointmentSeries {
    /// A new ACTIVE series with no occurrences.
    ///
    /// # Errors
    /// Returns `BookingError::InvalidTime` if `duration_minutes` is zero or the
    /// appointment would run past midnight.
    pub fn new(
        id: impl Into<String>,
        patient_id: impl Into<String>,
        provider_id: impl Into<String>,
        appointment_type_id: impl Into<String>,
        duration_minutes: u32,
        preferred_time: ClockTime,
        recurrence: RecurrenceSpec,
    ) -> Result<Self> {
        TimeRange::starting_at(preferred_time, duration_minutes)?;
        Ok(Self {
            id: id.into(),
            patient_id: patient_id.into(),
            provider_id: provider_id.into(),
            appointment_type_id: appointment_type_id.into(),
            chair_id: None,
            duration_minutes,
            preferred_time,
            recurrence,
            status: SeriesStatus::Active,
            occurrences: Vec::new(),
        })
    }

    pub fn with_chair(mut self, chair_id: impl Into<String>) -> Self {
        self.chair_id = Some(chair_id.into());
        self
    }

    pub fn status(&self) -> SeriesStatus {
        self.status
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    pub fn occurrences_mut(&mut self) -> &mut [Occurrence] {
        &mut self.occurrences
    }

    /// Take ownership of freshly committed occurrences.
    pub fn absorb(&mut self, occurrences: impl IntoIterator<Item = Occurrence>) {
        self.occurrences.extend(occurrences);
        self.occurrences.sort_by_key(|o| (o.scheduled_date, o.scheduled_time));
    }

    fn transition(&mut self, allowed: &[SeriesStatus], to: SeriesStatus) -> Result<()> {
        if !allowed.contains(&self.status) {
            return Err(BookingError::InvalidTransition {
                entity: "series",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// # Errors
    /// `BookingError::InvalidTransition` unless ACTIVE.
    pub fn pause(&mut self) -> Result<()> {
        self.transition(&[SeriesStatus::Active], SeriesStatus::Paused)
    }

    /// # Errors
    /// `BookingError::InvalidTransition` unless PAUSED.
    pub fn resume(&mut self) -> Result<()> {
        self.transition(&[SeriesStatus::Paused], SeriesStatus::Active)
    }

    /// # Errors
    /// `BookingError::InvalidTransition` unless ACTIVE or PAUSED.
    pub fn complete(&mut self) -> Result<()> {
        self.transition(
            &[SeriesStatus::Active, SeriesStatus::Paused],
            SeriesStatus::Completed,
        )
    }

    /// Cancel the series and every PENDING or SCHEDULED occurrence on or after
    /// `as_of`. Earlier occurrences are history and stay as they are.
    ///
    /// Returns the number of occurrences cancelled.
    ///
    /// # Errors
    /// `BookingError::InvalidTransition` unless ACTIVE or PAUSED.
    pub fn cancel(&mut self, as_of: NaiveDate) -> Result<usize> {
        self.transition(
            &[SeriesStatus::Active, SeriesStatus::Paused],
            SeriesStatus::Cancelled,
        )?;

        let mut cancelled = 0;
        for occurrence in self.occurrences.iter_mut().filter(|o| {
            o.scheduled_date >= as_of
                && matches!(o.status, OccurrenceStatus::Pending | OccurrenceStatus::Scheduled)
        }) {
            occurrence.cancel()?;
            cancelled += 1;
        }
        Ok(cancelled)
    }

    /// Dates already claimed by a non-skipped occurrence, including the
    /// original dates of moved ones.
    fn claimed_dates(&self) -> BTreeSet<NaiveDate> {
        self.occurrences
            .iter()
            .filter(|o| o.status != OccurrenceStatus::Skipped)
            .flat_map(|o| std::iter::once(o.scheduled_date).chain(o.original_date))
            .collect()
    }
}

/// Why a candidate date produced no occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// The series already has an occurrence for this date.
    AlreadyMaterialized,
    Conflict(Conflict),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateConflict {
    pub date: NaiveDate,
    pub reason: SkipReason,
}

/// Outcome of one materialization run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Materialization {
    /// Occurrences to persist, all SCHEDULED. Empty when aborted.
    pub created: Vec<Occurrence>,
    pub conflicts: Vec<DateConflict>,
    /// True when a conflict stopped the run with `skip_conflicts` off.
    pub aborted: bool,
}

impl Materialization {
    pub fn conflict_dates(&self) -> Vec<NaiveDate> {
        self.conflicts.iter().map(|c| c.date).collect()
    }

    pub fn summary(&self) -> MaterializeSummary {
        MaterializeSummary {
            created: self.created.len(),
            skipped: self.conflicts.len(),
            conflict_dates: self.conflict_dates(),
            aborted: self.aborted,
        }
    }
}

/// Counts recorded in the audit trail for a bulk generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeSummary {
    pub created: usize,
    pub skipped: usize,
    pub conflict_dates: Vec<NaiveDate>,
    pub aborted: bool,
}

/// Expand `series` over `[window_start, window_end]` and check every date.
///
/// - Clear dates become SCHEDULED occurrences.
/// - Dates the series already owns are reported as `AlreadyMaterialized` and
///   never duplicated, so re-running a window creates nothing new.
/// - With `skip_conflicts`, conflicting dates are reported and skipped.
///   Without it, the first conflict aborts the run: nothing is created and the
///   conflicts found so far are returned.
///
/// # Errors
/// `BookingError::SeriesNotActive` for a series that is not ACTIVE, plus any
/// expansion or time-range error.
pub fn materialize(
    series: &RecurringAppointmentSeries,
    window_start: NaiveDate,
    window_end: NaiveDate,
    skip_conflicts: bool,
    existing: &Commitments,
) -> Result<Materialization> {
    if series.status != SeriesStatus::Active {
        return Err(BookingError::SeriesNotActive {
            id: series.id.clone(),
            status: series.status.to_string(),
        });
    }

    let time = TimeRange::starting_at(series.preferred_time, series.duration_minutes)?;
    let dates = expand(&series.recurrence, window_start, window_end)?;
    let claimed = series.claimed_dates();

    let mut result = Materialization::default();

    for date in dates {
        if claimed.contains(&date) {
            result.conflicts.push(DateConflict {
                date,
                reason: SkipReason::AlreadyMaterialized,
            });
            continue;
        }

        let candidate = Candidate {
            provider_id: series.provider_id.clone(),
            chair_id: series.chair_id.clone(),
            date,
            time,
        };

        match check_conflict(&candidate, existing) {
            None => {
                let mut occurrence = Occurrence::pending(
                    &series.id,
                    date,
                    series.preferred_time,
                    series.duration_minutes,
                );
                occurrence.schedule()?;
                result.created.push(occurrence);
            }
            Some(conflict) => {
                result.conflicts.push(DateConflict {
                    date,
                    reason: SkipReason::Conflict(conflict),
                });
                if !skip_conflicts {
                    warn!(series = %series.id, %date, "conflict aborted materialization");
                    result.created.clear();
                    result.aborted = true;
                    return Ok(result);
                }
            }
        }
    }

    debug!(
        series = %series.id,
        created = result.created.len(),
        skipped = result.conflicts.len(),
        "materialized series window"
    );
    Ok(result)
}
