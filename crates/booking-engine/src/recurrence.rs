//! Recurrence specs and their expansion into concrete calendar dates.
//!
//! A [`RecurrenceSpec`] can only be obtained through validation, either via
//! [`RecurrenceSpec::new`] or by deserializing a [`RecurrenceDraft`]; an
//! instance in hand always satisfies the invariants (a known anchor for its
//! pattern, exactly one termination bound, `endDate >= startDate`).
//!
//! [`expand`] is a pure function of its inputs: the same spec and window always
//! yield the same strictly ascending, duplicate-free list of dates.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::{
    clamped_day_of_month, resolve_nth_weekday_of_month, shift_month, start_of_week,
    weekday_from_index,
};
use crate::error::{BookingError, Result};

/// Largest accepted step multiplier.
pub const MAX_INTERVAL: u32 = 12;
/// Largest accepted occurrence cap. Keeps a single series expansion small.
pub const MAX_OCCURRENCES: u32 = 52;

/// How a series repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    /// Caller-supplied explicit date list.
    Custom,
}

impl RecurrencePattern {
    /// Weeks between consecutive week blocks for weekly patterns.
    ///
    /// BIWEEKLY means two weeks unless an interval above 1 overrides it.
    pub fn week_step(self, interval: u32) -> u32 {
        match self {
            RecurrencePattern::Biweekly if interval <= 1 => 2,
            _ => interval,
        }
    }
}

/// Where in the month a MONTHLY series lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthlyAnchor {
    /// Day 1-31, clamped to the length of short months.
    DayOfMonth(u32),
    /// The `week`-th `weekday` of the month, `-1` meaning the last one.
    NthWeekday { week: i32, weekday: Weekday },
}

/// The bound that makes a series finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Inclusive last date.
    EndDate(NaiveDate),
    MaxOccurrences(u32),
}

/// One reason a [`RecurrenceDraft`] was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecViolation {
    #[error("interval must be between 1 and 12, got {0}")]
    IntervalOutOfRange(u32),
    #[error("daysOfWeek must not be empty for weekly patterns")]
    MissingDaysOfWeek,
    #[error("weekday index must be between 0 and 6, got {0}")]
    WeekdayOutOfRange(u8),
    #[error("monthly pattern needs dayOfMonth or weekOfMonth")]
    MissingMonthlyAnchor,
    #[error("dayOfMonth and weekOfMonth are mutually exclusive")]
    ConflictingMonthlyAnchors,
    #[error("dayOfMonth must be between 1 and 31, got {0}")]
    DayOfMonthOutOfRange(u32),
    #[error("weekOfMonth must be one of -1, 1, 2, 3, 4, got {0}")]
    WeekOfMonthOutOfRange(i32),
    #[error("weekOfMonth needs exactly one weekday")]
    MissingAnchorWeekday,
    #[error("either endDate or maxOccurrences is required")]
    MissingTermination,
    #[error("endDate and maxOccurrences are mutually exclusive")]
    ConflictingTermination,
    #[error("maxOccurrences must be between 1 and 52, got {0}")]
    MaxOccurrencesOutOfRange(u32),
    #[error("endDate {end} is before startDate {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("custom pattern needs at least one date")]
    MissingCustomDates,
}

/// Unvalidated wire shape of a recurrence spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceDraft {
    pub pattern: RecurrencePattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_of_month: Option<i32>,
    /// Weekday paired with `week_of_month`. A single-entry `days_of_week` is
    /// accepted in its place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_occurrences: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_dates: Vec<NaiveDate>,
}

impl RecurrenceDraft {
    /// A draft with only the pattern and start date set.
    pub fn new(pattern: RecurrencePattern, start_date: NaiveDate) -> Self {
        Self {
            pattern,
            interval: None,
            start_date,
            days_of_week: Vec::new(),
            day_of_month: None,
            week_of_month: None,
            weekday: None,
            end_date: None,
            max_occurrences: None,
            custom_dates: Vec::new(),
        }
    }
}

/// A validated recurrence rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecurrenceDraft", into = "RecurrenceDraft")]
pub struct RecurrenceSpec {
    pattern: RecurrencePattern,
    interval: u32,
    start_date: NaiveDate,
    days_of_week: BTreeSet<u8>,
    monthly_anchor: Option<MonthlyAnchor>,
    custom_dates: Vec<NaiveDate>,
    termination: Termination,
}

impl RecurrenceSpec {
    /// Validate a draft.
    ///
    /// # Errors
    /// Returns `BookingError::InvalidRecurrenceSpec` carrying every violation
    /// found in the draft.
    pub fn new(draft: RecurrenceDraft) -> Result<Self> {
        let mut violations = Vec::new();

        let interval = draft.interval.unwrap_or(1);
        if !(1..=MAX_INTERVAL).contains(&interval) {
            violations.push(SpecViolation::IntervalOutOfRange(interval));
        }

        for &day in &draft.days_of_week {
            if day > 6 {
                violations.push(SpecViolation::WeekdayOutOfRange(day));
            }
        }
        let days_of_week: BTreeSet<u8> =
            draft.days_of_week.iter().copied().filter(|d| *d <= 6).collect();

        if matches!(
            draft.pattern,
            RecurrencePattern::Weekly | RecurrencePattern::Biweekly
        ) && draft.days_of_week.is_empty()
        {
            violations.push(SpecViolation::MissingDaysOfWeek);
        }

        let monthly_anchor = if draft.pattern == RecurrencePattern::Monthly {
            monthly_anchor(&draft, &mut violations)
        } else {
            None
        };

        let mut custom_dates = draft.custom_dates.clone();
        custom_dates.sort_unstable();
        custom_dates.dedup();
        if draft.pattern == RecurrencePattern::Custom && custom_dates.is_empty() {
            violations.push(SpecViolation::MissingCustomDates);
        }

        let termination = match (draft.end_date, draft.max_occurrences) {
            (Some(_), Some(_)) => {
                violations.push(SpecViolation::ConflictingTermination);
                None
            }
            (None, None) => {
                violations.push(SpecViolation::MissingTermination);
                None
            }
            (Some(end), None) => {
                if end < draft.start_date {
                    violations.push(SpecViolation::EndBeforeStart {
                        start: draft.start_date,
                        end,
                    });
                }
                Some(Termination::EndDate(end))
            }
            (None, Some(max)) => {
                if !(1..=MAX_OCCURRENCES).contains(&max) {
                    violations.push(SpecViolation::MaxOccurrencesOutOfRange(max));
                }
                Some(Termination::MaxOccurrences(max))
            }
        };

        match termination {
            Some(termination) if violations.is_empty() => Ok(Self {
                pattern: draft.pattern,
                interval,
                start_date: draft.start_date,
                days_of_week,
                monthly_anchor,
                custom_dates,
                termination,
            }),
            _ => Err(BookingError::InvalidRecurrenceSpec(violations)),
        }
    }

    pub fn pattern(&self) -> RecurrencePattern {
        self.pattern
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn days_of_week(&self) -> &BTreeSet<u8> {
        &self.days_of_week
    }

    pub fn monthly_anchor(&self) -> Option<MonthlyAnchor> {
        self.monthly_anchor
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// The inclusive end date, if the series is date-bounded.
    pub fn end_date(&self) -> Option<NaiveDate> {
        match self.termination {
            Termination::EndDate(end) => Some(end),
            Termination::MaxOccurrences(_) => None,
        }
    }
}

fn monthly_anchor(
    draft: &RecurrenceDraft,
    violations: &mut Vec<SpecViolation>,
) -> Option<MonthlyAnchor> {
    match (draft.day_of_month, draft.week_of_month) {
        (Some(_), Some(_)) => {
            violations.push(SpecViolation::ConflictingMonthlyAnchors);
            None
        }
        (None, None) => {
            violations.push(SpecViolation::MissingMonthlyAnchor);
            None
        }
        (Some(day), None) => {
            if (1..=31).contains(&day) {
                Some(MonthlyAnchor::DayOfMonth(day))
            } else {
                violations.push(SpecViolation::DayOfMonthOutOfRange(day));
                None
            }
        }
        (None, Some(week)) => {
            if !matches!(week, -1 | 1..=4) {
                violations.push(SpecViolation::WeekOfMonthOutOfRange(week));
            }
            let weekday_index = match (draft.weekday, draft.days_of_week.as_slice()) {
                (Some(day), _) => Some(day),
                (None, [day]) => Some(*day),
                _ => None,
            };
            match weekday_index.map(|i| (i, weekday_from_index(i))) {
                Some((_, Some(weekday))) => Some(MonthlyAnchor::NthWeekday { week, weekday }),
                Some((i, None)) => {
                    if draft.weekday.is_some() {
                        violations.push(SpecViolation::WeekdayOutOfRange(i));
                    }
                    None
                }
                None => {
                    violations.push(SpecViolation::MissingAnchorWeekday);
                    None
                }
            }
        }
    }
}

impl TryFrom<RecurrenceDraft> for RecurrenceSpec {
    type Error = BookingError;

    fn try_from(draft: RecurrenceDraft) -> Result<Self> {
        RecurrenceSpec::new(draft)
    }
}

impl From<RecurrenceSpec> for RecurrenceDraft {
    fn from(spec: RecurrenceSpec) -> Self {
        let mut draft = RecurrenceDraft::new(spec.pattern, spec.start_date);
        draft.interval = Some(spec.interval);
        draft.days_of_week = spec.days_of_week.into_iter().collect();
        match spec.monthly_anchor {
            Some(MonthlyAnchor::DayOfMonth(day)) => draft.day_of_month = Some(day),
            Some(MonthlyAnchor::NthWeekday { week, weekday }) => {
                draft.week_of_month = Some(week);
                draft.weekday = Some(weekday.num_days_from_sunday() as u8);
            }
            None => {}
        }
        match spec.termination {
            Termination::EndDate(end) => draft.end_date = Some(end),
            Termination::MaxOccurrences(max) => draft.max_occurrences = Some(max),
        }
        draft.custom_dates = spec.custom_dates;
        draft
    }
}

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

/// Bookkeeping shared by every pattern generator.
struct Collector {
    start_date: NaiveDate,
    window_start: NaiveDate,
    horizon: NaiveDate,
    limit: Option<usize>,
    generated: usize,
    dates: Vec<NaiveDate>,
}

impl Collector {
    /// Offer the next candidate. Candidates must arrive strictly ascending.
    fn offer(&mut self, date: NaiveDate) -> ControlFlow<()> {
        if date > self.horizon {
            return ControlFlow::Break(());
        }
        if date < self.start_date {
            return ControlFlow::Continue(());
        }

        self.generated += 1;
        if date >= self.window_start {
            self.dates.push(date);
        }

        match self.limit {
            Some(limit) if self.generated >= limit => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    }
}

/// Expand `spec` into the dates falling inside `[window_start, window_end]`.
///
/// Expansion stops at the first of: a date past `endDate`, `maxOccurrences`
/// dates generated, or a date past `window_end`. Occurrences are counted from
/// the series' `startDate`, so dates before `window_start` still use up
/// `maxOccurrences` even though they are not returned.
///
/// # Errors
/// Returns `BookingError::InvalidDateSpec` if a monthly weekday anchor cannot be
/// resolved for some month.
pub fn expand(
    spec: &RecurrenceSpec,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Result<Vec<NaiveDate>> {
    if window_end < window_start {
        return Ok(Vec::new());
    }

    let (horizon, limit) = match spec.termination {
        Termination::EndDate(end) => (end.min(window_end), None),
        Termination::MaxOccurrences(max) => (window_end, Some(max as usize)),
    };

    let mut collector = Collector {
        start_date: spec.start_date,
        window_start,
        horizon,
        limit,
        generated: 0,
        dates: Vec::new(),
    };

    match spec.pattern {
        RecurrencePattern::Daily => expand_daily(spec, &mut collector),
        RecurrencePattern::Weekly | RecurrencePattern::Biweekly => {
            expand_weekly(spec, &mut collector)
        }
        RecurrencePattern::Monthly => expand_monthly(spec, &mut collector)?,
        RecurrencePattern::Custom => {
            for &date in &spec.custom_dates {
                if collector.offer(date).is_break() {
                    break;
                }
            }
        }
    }

    Ok(collector.dates)
}

/// Expand the whole series, bounded only by its own termination.
///
/// # Errors
/// Same as [`expand`].
pub fn expand_all(spec: &RecurrenceSpec) -> Result<Vec<NaiveDate>> {
    expand(spec, spec.start_date, NaiveDate::MAX)
}

fn expand_daily(spec: &RecurrenceSpec, collector: &mut Collector) {
    let step = Days::new(u64::from(spec.interval));
    let mut date = spec.start_date;
    while collector.offer(date).is_continue() {
        match date.checked_add_days(step) {
            Some(next) => date = next,
            None => break,
        }
    }
}

fn expand_weekly(spec: &RecurrenceSpec, collector: &mut Collector) {
    let step = Days::new(u64::from(spec.pattern.week_step(spec.interval)) * 7);
    let mut week = start_of_week(spec.start_date);

    loop {
        for &day in &spec.days_of_week {
            let Some(date) = week.checked_add_days(Days::new(u64::from(day))) else {
                return;
            };
            if collector.offer(date).is_break() {
                return;
            }
        }
        match week.checked_add_days(step) {
            Some(next) => week = next,
            None => return,
        }
    }
}

fn expand_monthly(spec: &RecurrenceSpec, collector: &mut Collector) -> Result<()> {
    let Some(anchor) = spec.monthly_anchor else {
        return Ok(());
    };
    let (first_year, first_month) = (spec.start_date.year(), spec.start_date.month());

    for step in 0u32.. {
        let Some((year, month)) = step
            .checked_mul(spec.interval)
            .and_then(|months| shift_month(first_year, first_month, months))
        else {
            break;
        };

        let date = match anchor {
            MonthlyAnchor::DayOfMonth(day) => match clamped_day_of_month(year, month, day) {
                Some(date) => date,
                None => break,
            },
            MonthlyAnchor::NthWeekday { week, weekday } => {
                resolve_nth_weekday_of_month(year, month, weekday, week)?
            }
        };

        if collector.offer(date).is_break() {
            break;
        }
    }
    Ok(())
}

