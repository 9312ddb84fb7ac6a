//! Conflict detection for a proposed booking.
//!
//! A candidate is checked against committed appointments, the provider's
//! working hours and exception blocks, in a fixed precedence order:
//!
//! 1. `PROVIDER_DOUBLE_BOOKED`
//! 2. `CHAIR_DOUBLE_BOOKED` (only when the candidate names a chair)
//! 3. `OUTSIDE_WORKING_HOURS` (breaks and lunch count as outside)
//! 4. `EXCEPTION_BLOCK`
//!
//! Ranges are half-open, so an appointment ending at 10:00 does not conflict
//! with one starting at 10:00. Conflicts are returned as values; deciding
//! whether one is fatal is up to the caller.

use chrono::{NaiveDate, NaiveDateTime, TimeZone};
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};

use crate::blocks::AppliedBlock;
use crate::calendar::{overlaps, weekday_index, ClockTime, TimeRange};
use crate::error::{BookingError, Result};
use crate::schedule::{schedule_for, ProviderSchedule};

/// Upper bound on recurrence instances examined per exception block and day.
const EXCEPTION_INSTANCE_LIMIT: u16 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Confirmed,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Whether the appointment still holds its time slot.
    pub fn holds_slot(self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }
}

/// A committed appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chair_id: Option<String>,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub time: TimeRange,
    #[serde(default)]
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionStatus {
    Active,
    PendingApproval,
    Approved,
    Rejected,
    Cancelled,
}

impl ExceptionStatus {
    /// Only active and approved exceptions take time away.
    pub fn is_effective(self) -> bool {
        matches!(self, ExceptionStatus::Active | ExceptionStatus::Approved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionBlockType {
    Vacation,
    Training,
    Meeting,
    SickLeave,
    Personal,
    #[serde(other)]
    Other,
}

/// Unvalidated wire shape of an [`ExceptionBlock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDraft {
    pub id: String,
    pub provider_id: String,
    pub start_date_time: NaiveDateTime,
    pub end_date_time: NaiveDateTime,
    pub block_type: ExceptionBlockType,
    pub status: ExceptionStatus,
    /// RFC 5545 RRULE body, e.g. `FREQ=WEEKLY;BYDAY=FR`. The first instance is
    /// `startDateTime`; each instance lasts as long as the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<String>,
}

/// Ad hoc unavailability (time off, training), optionally repeating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ExceptionDraft", into = "ExceptionDraft")]
pub struct ExceptionBlock {
    draft: ExceptionDraft,
    rule: Option<RRuleSet>,
}

impl ExceptionBlock {
    /// # Errors
    /// Returns `BookingError::InvalidTime` if the block does not end after it
    /// starts, and `BookingError::InvalidRule` if the recurrence rule does not parse.
    pub fn new(draft: ExceptionDraft) -> Result<Self> {
        if draft.end_date_time <= draft.start_date_time {
            return Err(BookingError::InvalidTime(format!(
                "exception block {} ends at {} before it starts at {}",
                draft.id, draft.end_date_time, draft.start_date_time
            )));
        }

        let rule = match draft.recurrence_rule.as_deref() {
            None => None,
            Some(rule) if rule.trim().is_empty() => {
                return Err(BookingError::InvalidRule("empty RRULE string".to_string()));
            }
            Some(rule) => {
                // Wall-clock times are carried through UTC unchanged, which keeps
                // local times fixed across the year.
                let text = format!(
                    "DTSTART:{}Z\nRRULE:{}",
                    draft.start_date_time.format("%Y%m%dT%H%M%S"),
                    rule.trim()
                );
                let set: RRuleSet = text
                    .parse()
                    .map_err(|e| BookingError::InvalidRule(format!("{e}")))?;
                Some(set)
            }
        };

        Ok(Self { draft, rule })
    }

    pub fn id(&self) -> &str {
        &self.draft.id
    }

    pub fn provider_id(&self) -> &str {
        &self.draft.provider_id
    }

    pub fn status(&self) -> ExceptionStatus {
        self.draft.status
    }

    pub fn block_type(&self) -> ExceptionBlockType {
        self.draft.block_type
    }

    pub fn is_recurring(&self) -> bool {
        self.rule.is_some()
    }

    /// Instances of this block that touch `date`, as `[start, end)` pairs.
    pub fn occurrences_on(&self, date: NaiveDate) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        let day_start = ClockTime::MIDNIGHT.on(date);
        let day_end = ClockTime::END_OF_DAY.on(date);
        let duration = self.draft.end_date_time - self.draft.start_date_time;

        let instances: Vec<(NaiveDateTime, NaiveDateTime)> = match &self.rule {
            None => vec![(self.draft.start_date_time, self.draft.end_date_time)],
            Some(rule) => {
                let utc = rrule::Tz::UTC;
                rule.clone()
                    .after(utc.from_utc_datetime(&(day_start - duration)))
                    .before(utc.from_utc_datetime(&day_end))
                    .all(EXCEPTION_INSTANCE_LIMIT)
                    .dates
                    .into_iter()
                    .map(|dt| {
                        let start = dt.naive_utc();
                        (start, start + duration)
                    })
                    .collect()
            }
        };

        instances
            .into_iter()
            .filter(|(start, end)| overlaps(*start, *end, day_start, day_end))
            .collect()
    }
}

impl TryFrom<ExceptionDraft> for ExceptionBlock {
    type Error = BookingError;

    fn try_from(draft: ExceptionDraft) -> Result<Self> {
        ExceptionBlock::new(draft)
    }
}

impl From<ExceptionBlock> for ExceptionDraft {
    fn from(block: ExceptionBlock) -> Self {
        block.draft
    }
}

/// Everything already committed that a new booking must respect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitments {
    /// Provider working hours ("shifts").
    #[serde(default)]
    pub schedules: Vec<ProviderSchedule>,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub exception_blocks: Vec<ExceptionBlock>,
    /// Template blocks applied to providers. Only availability reads these.
    #[serde(default)]
    pub blocks: Vec<AppliedBlock>,
}

/// A proposed booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chair_id: Option<String>,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub time: TimeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    ProviderDoubleBooked,
    ChairDoubleBooked,
    OutsideWorkingHours,
    ExceptionBlock,
}

/// What the candidate ran into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConflictingEntity {
    Appointment { id: String },
    /// The provider's schedule for the weekday; `hours` is absent when no
    /// schedule applies on that date.
    #[serde(rename_all = "camelCase")]
    Schedule {
        provider_id: String,
        day_of_week: u8,
        hours: Option<TimeRange>,
    },
    ExceptionBlock { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub kind: ConflictKind,
    pub entity: ConflictingEntity,
    /// Minutes of the candidate affected: the overlap for double bookings and
    /// exception blocks, the uncovered minutes for working-hours conflicts.
    pub overlap_minutes: u32,
}

/// Check `candidate` against `existing` and return the first conflict in
/// precedence order, or `None` if the booking is clear.
pub fn check_conflict(candidate: &Candidate, existing: &Commitments) -> Option<Conflict> {
    conflicts_in_order(candidate, existing).next()
}

/// Every conflict for `candidate`, grouped in precedence order. Useful for
/// showing all reasons a slot is unavailable.
pub fn all_conflicts(candidate: &Candidate, existing: &Commitments) -> Vec<Conflict> {
    conflicts_in_order(candidate, existing).collect()
}

fn conflicts_in_order<'a>(
    candidate: &'a Candidate,
    existing: &'a Commitments,
) -> impl Iterator<Item = Conflict> + 'a {
    provider_conflicts(candidate, &existing.appointments)
        .chain(chair_conflicts(candidate, &existing.appointments))
        .chain(working_hours_conflict(candidate, &existing.schedules))
        .chain(exception_conflicts(candidate, &existing.exception_blocks))
}

fn overlap_minutes(a: &TimeRange, b: &TimeRange) -> u32 {
    let start = a.start().max(b.start());
    let end = a.end().min(b.end());
    end.minutes().saturating_sub(start.minutes())
}

fn same_slot<'a>(
    candidate: &'a Candidate,
    appointments: &'a [Appointment],
) -> impl Iterator<Item = &'a Appointment> + 'a {
    appointments.iter().filter(move |a| {
        a.status.holds_slot() && a.date == candidate.date && a.time.overlaps(&candidate.time)
    })
}

fn provider_conflicts<'a>(
    candidate: &'a Candidate,
    appointments: &'a [Appointment],
) -> impl Iterator<Item = Conflict> + 'a {
    same_slot(candidate, appointments)
        .filter(move |a| a.provider_id == candidate.provider_id)
        .map(move |a| Conflict {
            kind: ConflictKind::ProviderDoubleBooked,
            entity: ConflictingEntity::Appointment { id: a.id.clone() },
            overlap_minutes: overlap_minutes(&a.time, &candidate.time),
        })
}

fn chair_conflicts<'a>(
    candidate: &'a Candidate,
    appointments: &'a [Appointment],
) -> impl Iterator<Item = Conflict> + 'a {
    same_slot(candidate, appointments)
        .filter(move |a| candidate.chair_id.is_some() && a.chair_id == candidate.chair_id)
        .map(move |a| Conflict {
            kind: ConflictKind::ChairDoubleBooked,
            entity: ConflictingEntity::Appointment { id: a.id.clone() },
            overlap_minutes: overlap_minutes(&a.time, &candidate.time),
        })
}

fn working_hours_conflict(
    candidate: &Candidate,
    schedules: &[ProviderSchedule],
) -> Option<Conflict> {
    let schedule = schedule_for(schedules, &candidate.provider_id, candidate.date);
    let working = schedule.map(ProviderSchedule::working_intervals).unwrap_or_default();

    if working.iter().any(|range| range.contains(&candidate.time)) {
        return None;
    }

    let covered: u32 = working
        .iter()
        .map(|range| overlap_minutes(range, &candidate.time))
        .sum();

    Some(Conflict {
        kind: ConflictKind::OutsideWorkingHours,
        entity: ConflictingEntity::Schedule {
            provider_id: candidate.provider_id.clone(),
            day_of_week: weekday_index(candidate.date),
            hours: schedule.map(ProviderSchedule::hours),
        },
        overlap_minutes: candidate.time.duration_minutes() - covered,
    })
}

fn exception_conflicts<'a>(
    candidate: &'a Candidate,
    blocks: &'a [ExceptionBlock],
) -> impl Iterator<Item = Conflict> + 'a {
    let start = candidate.time.start().on(candidate.date);
    let end = candidate.time.end().on(candidate.date);
    let length = candidate.time.duration_minutes();

    blocks
        .iter()
        .filter(move |b| b.provider_id() == candidate.provider_id && b.status().is_effective())
        .filter_map(move |b| {
            let minutes = b
                .occurrences_on(candidate.date)
                .into_iter()
                .filter(|(s, e)| overlaps(*s, *e, start, end))
                .map(|(s, e)| (e.min(end) - s.max(start)).num_minutes())
                .max()?;
            Some(Conflict {
                kind: ConflictKind::ExceptionBlock,
                entity: ConflictingEntity::ExceptionBlock {
                    id: b.id().to_string(),
                },
                overlap_minutes: u32::try_from(minutes).map_or(length, |m| m.min(length)),
            })
        })
}

/// Exception-block time on `date` for `provider_id`, clipped to the day and
/// expressed as wall-clock ranges.
pub fn exception_ranges_on(
    blocks: &[ExceptionBlock],
    provider_id: &str,
    date: NaiveDate,
) -> Vec<TimeRange> {
    let day_start = ClockTime::MIDNIGHT.on(date);
    let day_end = ClockTime::END_OF_DAY.on(date);
    let minutes_into_day = |at: NaiveDateTime| {
        ClockTime::from_minutes(u32::try_from((at - day_start).num_minutes()).ok()?)
    };

    blocks
        .iter()
        .filter(|b| b.provider_id() == provider_id && b.status().is_effective())
        .flat_map(|b| b.occurrences_on(date))
        .filter_map(|(start, end)| {
            let from = if start <= day_start {
                ClockTime::MIDNIGHT
            } else {
                minutes_into_day(start)?
            };
            let to = if end >= day_end {
                ClockTime::END_OF_DAY
            } else {
                minutes_into_day(end)?
            };
            TimeRange::new(from, to).ok()
        })
        .collect()
}
