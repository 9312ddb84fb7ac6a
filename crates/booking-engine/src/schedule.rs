//! Per-provider, per-weekday working hours.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{subtract_ranges, weekday_index, ClockTime, TimeRange};
use crate::error::{BookingError, Result};

/// Unvalidated wire shape of a [`ProviderSchedule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDraft {
    pub provider_id: String,
    pub day_of_week: u8,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    #[serde(default = "default_working")]
    pub is_working_day: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breaks: Vec<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lunch: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_to: Option<NaiveDate>,
}

fn default_working() -> bool {
    true
}

impl ScheduleDraft {
    /// A working day with no breaks and no effective bounds.
    pub fn working(
        provider_id: impl Into<String>,
        day_of_week: u8,
        start_time: ClockTime,
        end_time: ClockTime,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            day_of_week,
            start_time,
            end_time,
            is_working_day: true,
            breaks: Vec::new(),
            lunch: None,
            effective_from: None,
            effective_to: None,
        }
    }
}

/// Working hours for one provider on one weekday, over an optional date range.
///
/// Breaks lie inside the working hours, and breaks and lunch never overlap one
/// another. A lunch window reaching past the working hours only matters where
/// it overlaps them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleDraft", into = "ScheduleDraft")]
pub struct ProviderSchedule {
    provider_id: String,
    day_of_week: u8,
    hours: TimeRange,
    is_working_day: bool,
    breaks: Vec<TimeRange>,
    lunch: Option<TimeRange>,
    effective_from: Option<NaiveDate>,
    effective_to: Option<NaiveDate>,
}

impl ProviderSchedule {
    /// # Errors
    /// Returns `BookingError::InvalidSchedule` listing every problem found.
    pub fn new(draft: ScheduleDraft) -> Result<Self> {
        let mut problems = Vec::new();

        if draft.day_of_week > 6 {
            problems.push(format!("dayOfWeek must be 0-6, got {}", draft.day_of_week));
        }

        let hours = match TimeRange::new(draft.start_time, draft.end_time) {
            Ok(hours) => Some(hours),
            Err(e) => {
                problems.push(e.to_string());
                None
            }
        };

        if let Some(hours) = hours {
            for b in &draft.breaks {
                if !hours.contains(b) {
                    problems.push(format!("break {b} is outside working hours {hours}"));
                }
            }
        }

        let mut pauses: Vec<&TimeRange> = draft.breaks.iter().chain(draft.lunch.iter()).collect();
        pauses.sort();
        for pair in pauses.windows(2) {
            if pair[0].overlaps(pair[1]) {
                problems.push(format!("{} overlaps {}", pair[0], pair[1]));
            }
        }

        if let (Some(from), Some(to)) = (draft.effective_from, draft.effective_to) {
            if to < from {
                problems.push(format!("effectiveTo {to} is before effectiveFrom {from}"));
            }
        }

        match hours {
            Some(hours) if problems.is_empty() => Ok(Self {
                provider_id: draft.provider_id,
                day_of_week: draft.day_of_week,
                hours,
                is_working_day: draft.is_working_day,
                breaks: draft.breaks,
                lunch: draft.lunch,
                effective_from: draft.effective_from,
                effective_to: draft.effective_to,
            }),
            _ => Err(BookingError::InvalidSchedule(problems)),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn day_of_week(&self) -> u8 {
        self.day_of_week
    }

    pub fn hours(&self) -> TimeRange {
        self.hours
    }

    pub fn is_working_day(&self) -> bool {
        self.is_working_day
    }

    pub fn breaks(&self) -> &[TimeRange] {
        &self.breaks
    }

    pub fn lunch(&self) -> Option<TimeRange> {
        self.lunch
    }

    /// True if this schedule governs `date`: same weekday and inside the
    /// effective bounds.
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        weekday_index(date) == self.day_of_week
            && self.effective_from.is_none_or(|from| from <= date)
            && self.effective_to.is_none_or(|to| date <= to)
    }

    /// Working hours minus breaks and lunch, sorted. Empty on days off.
    pub fn working_intervals(&self) -> Vec<TimeRange> {
        if !self.is_working_day {
            return Vec::new();
        }
        let pauses: Vec<TimeRange> = self.breaks.iter().chain(self.lunch.iter()).copied().collect();
        subtract_ranges(&[self.hours], &pauses)
    }
}

impl TryFrom<ScheduleDraft> for ProviderSchedule {
    type Error = BookingError;

    fn try_from(draft: ScheduleDraft) -> Result<Self> {
        ProviderSchedule::new(draft)
    }
}

impl From<ProviderSchedule> for ScheduleDraft {
    fn from(schedule: ProviderSchedule) -> Self {
        ScheduleDraft {
            provider_id: schedule.provider_id,
            day_of_week: schedule.day_of_week,
            start_time: schedule.hours.start(),
            end_time: schedule.hours.end(),
            is_working_day: schedule.is_working_day,
            breaks: schedule.breaks,
            lunch: schedule.lunch,
            effective_from: schedule.effective_from,
            effective_to: schedule.effective_to,
        }
    }
}

/// The schedule governing `provider_id` on `date`.
///
/// When several versions apply, the one with the latest `effectiveFrom` wins;
/// an unbounded start counts as the earliest.
pub fn schedule_for<'a>(
    schedules: &'a [ProviderSchedule],
    provider_id: &str,
    date: NaiveDate,
) -> Option<&'a ProviderSchedule> {
    schedules
        .iter()
        .filter(|s| s.provider_id == provider_id && s.applies_on(date))
        .max_by_key(|s| s.effective_from)
}
