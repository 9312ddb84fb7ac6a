//! Calendar and clock arithmetic.
//!
//! Everything here works on already-localized values: dates are calendar days
//! in the clinic's time zone and times are wall-clock `HH:mm`. Nothing in this
//! module converts between zones.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};
use crate::recurrence::RecurrencePattern;

/// Minutes in a day. `24:00` is accepted as an end-of-day marker.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

// ---------------------------------------------------------------------------
// Weekdays
// ---------------------------------------------------------------------------

/// Weekday index of `date`, 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Inverse of [`weekday_index`]. Returns `None` for indices above 6.
pub fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// The Sunday on or before `date`.
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(weekday_index(date)))
}

// ---------------------------------------------------------------------------
// Months
// ---------------------------------------------------------------------------

/// Number of days in the given month, or `None` if the month is out of range.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    u32::try_from((next - first).num_days()).ok()
}

/// Shift a (year, month) pair by `months` whole months.
pub fn shift_month(year: i32, month: u32, months: u32) -> Option<(i32, u32)> {
    let zero_based = i64::from(year) * 12 + i64::from(month) - 1 + i64::from(months);
    let year = i32::try_from(zero_based.div_euclid(12)).ok()?;
    let month = u32::try_from(zero_based.rem_euclid(12)).ok()? + 1;
    Some((year, month))
}

/// `day` in the given month, clamped to the month's last day.
///
/// Day 31 in February yields Feb 28 (Feb 29 in leap years). Months are never
/// skipped because the anchor day is missing.
pub fn clamped_day_of_month(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last))
}

/// Resolve the `n`-th `weekday` of a month. Negative `n` counts from the end,
/// so `-1` is the last occurrence.
///
/// # Errors
/// Returns `BookingError::InvalidDateSpec` when `n` is zero, the month is out of
/// range, or the month does not contain that many occurrences of `weekday`.
pub fn resolve_nth_weekday_of_month(
    year: i32,
    month: u32,
    weekday: Weekday,
    n: i32,
) -> Result<NaiveDate> {
    let unresolvable = || {
        BookingError::InvalidDateSpec(format!(
            "no occurrence {n} of {weekday} in {year}-{month:02}"
        ))
    };

    if n == 0 {
        return Err(unresolvable());
    }

    let last_day = days_in_month(year, month).ok_or_else(unresolvable)?;

    if n > 0 {
        let n = u8::try_from(n).map_err(|_| unresolvable())?;
        return NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
            .ok_or_else(unresolvable);
    }

    let last = NaiveDate::from_ymd_opt(year, month, last_day).ok_or_else(unresolvable)?;
    let back_to_weekday =
        (7 + last.weekday().num_days_from_sunday() - weekday.num_days_from_sunday()) % 7;
    let weeks_back = u32::try_from(-i64::from(n) - 1).map_err(|_| unresolvable())?;
    let offset = weeks_back
        .checked_mul(7)
        .and_then(|w| w.checked_add(back_to_weekday))
        .ok_or_else(unresolvable)?;

    if offset >= last_day {
        return Err(unresolvable());
    }
    NaiveDate::from_ymd_opt(year, month, last_day - offset).ok_or_else(unresolvable)
}

/// Step `date` forward by one recurrence unit.
///
/// DAILY moves `interval` days, WEEKLY `interval` weeks and BIWEEKLY two weeks
/// (or `interval` weeks when an interval above 1 is given). MONTHLY keeps the
/// day-of-month of `date`, clamped to the target month's length. CUSTOM
/// patterns have no step and return `None`, as does any overflow.
pub fn add_interval(
    date: NaiveDate,
    pattern: RecurrencePattern,
    interval: u32,
) -> Option<NaiveDate> {
    match pattern {
        RecurrencePattern::Daily => date.checked_add_days(Days::new(u64::from(interval))),
        RecurrencePattern::Weekly | RecurrencePattern::Biweekly => {
            let weeks = pattern.week_step(interval);
            date.checked_add_days(Days::new(u64::from(weeks) * 7))
        }
        RecurrencePattern::Monthly => {
            let (year, month) = shift_month(date.year(), date.month(), interval)?;
            clamped_day_of_month(year, month, date.day())
        }
        RecurrencePattern::Custom => None,
    }
}

// ---------------------------------------------------------------------------
// Clock times
// ---------------------------------------------------------------------------

/// A wall-clock time of day, stored as minutes since midnight.
///
/// Serialized as a 24-hour `"HH:mm"` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime(0);
    pub const END_OF_DAY: ClockTime = ClockTime(MINUTES_PER_DAY);

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        let total = hour.checked_mul(60)?.checked_add(minute)?;
        Self::from_minutes(total)
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        u16::try_from(minutes)
            .ok()
            .filter(|m| *m <= MINUTES_PER_DAY)
            .map(ClockTime)
    }

    pub fn minutes(self) -> u32 {
        u32::from(self.0)
    }

    pub fn hour(self) -> u32 {
        self.minutes() / 60
    }

    pub fn minute(self) -> u32 {
        self.minutes() % 60
    }

    /// Add `minutes`, failing past `24:00`.
    pub fn plus_minutes(self, minutes: u32) -> Option<Self> {
        Self::from_minutes(self.minutes().checked_add(minutes)?)
    }

    /// Combine with a date. `24:00` lands on midnight of the following day.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(self.0))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BookingError::InvalidTime(format!("expected HH:mm, got '{s}'"));

        let (hours, minutes) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hours.is_empty()
            || hours.len() > 2
            || minutes.len() != 2
            || !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let hour: u32 = hours.parse().map_err(|_| invalid())?;
        let minute: u32 = minutes.parse().map_err(|_| invalid())?;
        ClockTime::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = BookingError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Time ranges
// ---------------------------------------------------------------------------

/// Half-open interval test: `[a, b)` and `[c, d)` overlap iff `a < d && c < b`.
///
/// Touching endpoints do not overlap.
pub fn overlaps<T: PartialOrd>(a: T, b: T, c: T, d: T) -> bool {
    a < d && c < b
}

/// A half-open `[start, end)` range of wall-clock time with `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeRange", into = "RawTimeRange")]
pub struct TimeRange {
    start: ClockTime,
    end: ClockTime,
}

/// Wire shape of a [`TimeRange`]: `{"startTime": "HH:mm", "endTime": "HH:mm"}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTimeRange {
    pub start_time: ClockTime,
    pub end_time: ClockTime,
}

impl TimeRange {
    /// # Errors
    /// Returns `BookingError::InvalidTime` unless `end` is strictly after `start`.
    pub fn new(start: ClockTime, end: ClockTime) -> Result<Self> {
        if end <= start {
            return Err(BookingError::InvalidTime(format!(
                "end time {end} must be after start time {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// A range of `duration_minutes` starting at `start`.
    ///
    /// # Errors
    /// Fails for a zero duration or one that runs past `24:00`.
    pub fn starting_at(start: ClockTime, duration_minutes: u32) -> Result<Self> {
        let end = start.plus_minutes(duration_minutes).ok_or_else(|| {
            BookingError::InvalidTime(format!(
                "{duration_minutes} minutes from {start} runs past the end of the day"
            ))
        })?;
        Self::new(start, end)
    }

    pub fn start(&self) -> ClockTime {
        self.start
    }

    pub fn end(&self) -> ClockTime {
        self.end
    }

    pub fn duration_minutes(&self) -> u32 {
        self.end.minutes() - self.start.minutes()
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    /// True if `other` lies entirely inside this range.
    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_time(&self, time: ClockTime) -> bool {
        self.start <= time && time < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl TryFrom<RawTimeRange> for TimeRange {
    type Error = BookingError;

    fn try_from(raw: RawTimeRange) -> Result<Self> {
        TimeRange::new(raw.start_time, raw.end_time)
    }
}

impl From<TimeRange> for RawTimeRange {
    fn from(range: TimeRange) -> Self {
        RawTimeRange {
            start_time: range.start,
            end_time: range.end,
        }
    }
}

/// Remove every range in `cuts` from `base`, returning the sorted remainder.
///
/// Pieces of zero length are dropped.
pub fn subtract_ranges(base: &[TimeRange], cuts: &[TimeRange]) -> Vec<TimeRange> {
    let mut remaining: Vec<TimeRange> = base.to_vec();

    for cut in cuts {
        remaining = remaining
            .into_iter()
            .flat_map(|piece| {
                if !piece.overlaps(cut) {
                    return vec![piece];
                }
                let mut parts = Vec::with_capacity(2);
                if piece.start < cut.start {
                    parts.push(TimeRange { start: piece.start, end: cut.start });
                }
                if cut.end < piece.end {
                    parts.push(TimeRange { start: cut.end, end: piece.end });
                }
                parts
            })
            .collect();
    }

    remaining.sort();
    remaining
}
