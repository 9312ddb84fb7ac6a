//! Free-interval resolution for one provider on one date.
//!
//! Starts from the provider's working hours for the weekday, removes breaks and
//! lunch, then removes everything that makes time unbookable: blocked schedule
//! blocks, blocks restricted to other appointment types, appointments and
//! exception blocks. What remains, split into maximal free intervals and
//! filtered by a minimum duration, is the provider's availability.
//!
//! The result is a snapshot of the commitments passed in; it goes stale as soon
//! as anything new is booked.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::blocks::blocks_for_date;
use crate::calendar::{ClockTime, TimeRange, MINUTES_PER_DAY};
use crate::conflict::{exception_ranges_on, Commitments};
use crate::schedule::{schedule_for, ProviderSchedule};

/// What the caller is looking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub provider_id: String,
    pub date: NaiveDate,
    pub minimum_duration_minutes: u32,
    /// When set, blocks restricted to other types are unavailable. When unset,
    /// only blocked ranges are removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_type_id: Option<String>,
}

/// A free interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeInterval {
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub duration_minutes: u32,
}

impl FreeInterval {
    fn new(start_time: ClockTime, end_time: ClockTime) -> Self {
        Self {
            start_time,
            end_time,
            duration_minutes: end_time.minutes() - start_time.minutes(),
        }
    }
}

/// Merge overlapping or adjacent busy ranges into a sorted, disjoint list.
fn merge_busy_periods(mut busy: Vec<TimeRange>) -> Vec<(ClockTime, ClockTime)> {
    busy.sort();

    let mut merged: Vec<(ClockTime, ClockTime)> = Vec::with_capacity(busy.len());
    for range in busy {
        if let Some(last) = merged.last_mut() {
            if range.start() <= last.1 {
                last.1 = last.1.max(range.end());
                continue;
            }
        }
        merged.push((range.start(), range.end()));
    }
    merged
}

/// Gaps between merged busy periods inside one working interval.
fn gaps_within(window: TimeRange, merged: &[(ClockTime, ClockTime)]) -> Vec<FreeInterval> {
    let mut free = Vec::new();
    let mut cursor = window.start();

    for &(busy_start, busy_end) in merged {
        if busy_end <= window.start() || busy_start >= window.end() {
            continue;
        }
        if cursor < busy_start {
            free.push(FreeInterval::new(cursor, busy_start));
        }
        cursor = cursor.max(busy_end);
    }

    if cursor < window.end() {
        free.push(FreeInterval::new(cursor, window.end()));
    }
    free
}

/// Free intervals of at least `request.minimum_duration_minutes`, sorted by
/// start time. An empty result means the provider is fully booked or off.
pub fn find_free_intervals(
    request: &AvailabilityRequest,
    existing: &Commitments,
) -> Vec<FreeInterval> {
    let working = schedule_for(&existing.schedules, &request.provider_id, request.date)
        .map(ProviderSchedule::working_intervals)
        .unwrap_or_default();
    if working.is_empty() {
        return Vec::new();
    }

    let type_id = request.appointment_type_id.as_deref();
    let mut busy: Vec<TimeRange> =
        blocks_for_date(&existing.blocks, &request.provider_id, request.date)
            .into_iter()
            .filter(|block| block.is_blocked || type_id.is_some_and(|id| !block.permits(Some(id))))
            .filter_map(|block| block.range().ok())
            .collect();

    busy.extend(
        existing
            .appointments
            .iter()
            .filter(|a| {
                a.provider_id == request.provider_id
                    && a.date == request.date
                    && a.status.holds_slot()
            })
            .map(|a| a.time),
    );

    busy.extend(exception_ranges_on(
        &existing.exception_blocks,
        &request.provider_id,
        request.date,
    ));

    let merged = merge_busy_periods(busy);

    let mut free: Vec<FreeInterval> = working
        .into_iter()
        .flat_map(|window| gaps_within(window, &merged))
        .filter(|interval| interval.duration_minutes >= request.minimum_duration_minutes)
        .collect();
    free.sort_by_key(|interval| interval.start_time);
    free
}

/// The earliest free interval meeting the request, if any.
pub fn first_free_interval(
    request: &AvailabilityRequest,
    existing: &Commitments,
) -> Option<FreeInterval> {
    find_free_intervals(request, existing).into_iter().next()
}

/// Split free intervals into bookable slots of `duration_minutes`, starting on
/// multiples of `step_minutes` past midnight.
///
/// A zero step is treated as back-to-back slots of the full duration. Durations
/// and steps longer than a day are capped at a day.
pub fn bookable_slots(
    free: &[FreeInterval],
    duration_minutes: u32,
    step_minutes: u32,
) -> Vec<TimeRange> {
    let day = u32::from(MINUTES_PER_DAY);
    let duration = duration_minutes.min(day);
    if duration == 0 {
        return Vec::new();
    }
    let step = if step_minutes == 0 { duration } else { step_minutes.min(day) };

    let mut slots = Vec::new();
    for interval in free {
        let mut start = interval.start_time.minutes().div_ceil(step) * step;
        while start + duration <= interval.end_time.minutes() {
            let Some(slot) = ClockTime::from_minutes(start)
                .and_then(|from| TimeRange::starting_at(from, duration).ok())
            else {
                break;
            };
            slots.push(slot);
            start += step;
        }
    }
    slots
}
