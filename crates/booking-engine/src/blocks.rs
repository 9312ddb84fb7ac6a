//! Schedule blocks, booking templates and template application.
//!
//! A [`ScheduleBlock`] is one colored range inside a weekly template: either
//! bookable (optionally restricted to a set of appointment types) or blocked.
//! Blocks on the same weekday never share a minute, whether blocked or not.
//!
//! Older templates store "slots" in a different shape ([`LegacySlot`]). Both
//! shapes are accepted at the boundary via [`TemplateEntry`] and normalized to
//! `ScheduleBlock` when a [`BookingTemplate`] is built; nothing past that point
//! sees the legacy shape.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar::{weekday_index, ClockTime, TimeRange};
use crate::error::{BookingError, Result};

/// A reusable time range inside a weekly template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBlock {
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u8,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    /// Appointment types allowed in this block. Empty means any type.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub appointment_type_ids: BTreeSet<String>,
    /// Unavailable time (lunch, meeting, closed). Overrides `appointment_type_ids`.
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chair_id: Option<String>,
}

impl ScheduleBlock {
    /// An open block accepting any appointment type.
    pub fn open(day_of_week: u8, start_time: ClockTime, end_time: ClockTime) -> Self {
        Self {
            day_of_week,
            start_time,
            end_time,
            appointment_type_ids: BTreeSet::new(),
            is_blocked: false,
            label: None,
            color: None,
            chair_id: None,
        }
    }

    /// A blocked (unavailable) range.
    pub fn blocked(day_of_week: u8, start_time: ClockTime, end_time: ClockTime) -> Self {
        Self {
            is_blocked: true,
            ..Self::open(day_of_week, start_time, end_time)
        }
    }

    /// Restrict the block to the given appointment types.
    pub fn for_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.appointment_type_ids = types.into_iter().map(Into::into).collect();
        self
    }

    /// # Errors
    /// Returns `BookingError::InvalidTime` if `end_time` is not after `start_time`.
    pub fn range(&self) -> Result<TimeRange> {
        TimeRange::new(self.start_time, self.end_time)
    }

    /// Whether an appointment of `appointment_type_id` may be booked here.
    ///
    /// Blocked ranges accept nothing. With no type given, only unrestricted
    /// blocks count as open.
    pub fn permits(&self, appointment_type_id: Option<&str>) -> bool {
        if self.is_blocked {
            return false;
        }
        if self.appointment_type_ids.is_empty() {
            return true;
        }
        appointment_type_id.is_some_and(|id| self.appointment_type_ids.contains(id))
    }
}

/// Two blocks claiming the same minute of the same weekday.
///
/// `first` and `second` are indices into the block lists being compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockOverlap {
    pub day_of_week: u8,
    pub first: usize,
    pub first_range: TimeRange,
    pub second: usize,
    pub second_range: TimeRange,
}

impl fmt::Display for BlockOverlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "day {}: block #{} ({}) overlaps block #{} ({})",
            self.day_of_week, self.first, self.first_range, self.second, self.second_range
        )
    }
}

/// Check a weekly block set.
///
/// # Errors
/// Returns `BookingError::InvalidBlock` for the first block with a bad weekday or
/// time range, otherwise `BookingError::Overlap` listing every overlapping pair.
pub fn validate_blocks(blocks: &[ScheduleBlock]) -> Result<()> {
    let ranges = block_ranges(blocks)?;

    let mut overlaps = Vec::new();
    for (i, (day_a, range_a)) in ranges.iter().enumerate() {
        for (j, (day_b, range_b)) in ranges.iter().enumerate().skip(i + 1) {
            if day_a == day_b && range_a.overlaps(range_b) {
                overlaps.push(BlockOverlap {
                    day_of_week: *day_a,
                    first: i,
                    first_range: *range_a,
                    second: j,
                    second_range: *range_b,
                });
            }
        }
    }

    if overlaps.is_empty() {
        Ok(())
    } else {
        Err(BookingError::Overlap(overlaps))
    }
}

fn block_ranges(blocks: &[ScheduleBlock]) -> Result<Vec<(u8, TimeRange)>> {
    blocks
        .iter()
        .enumerate()
        .map(|(index, block)| {
            if block.day_of_week > 6 {
                return Err(BookingError::InvalidBlock {
                    index,
                    message: format!("dayOfWeek must be 0-6, got {}", block.day_of_week),
                });
            }
            let range = block.range().map_err(|e| BookingError::InvalidBlock {
                index,
                message: e.to_string(),
            })?;
            Ok((block.day_of_week, range))
        })
        .collect()
}

/// True if a non-blocked block on `day_of_week` contains `time` and accepts
/// `appointment_type_id`.
pub fn is_open_at(
    blocks: &[ScheduleBlock],
    day_of_week: u8,
    time: ClockTime,
    appointment_type_id: &str,
) -> bool {
    blocks.iter().any(|block| {
        block.day_of_week == day_of_week
            && block.start_time <= time
            && time < block.end_time
            && block.permits(Some(appointment_type_id))
    })
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Slot shape written by older template editors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySlot {
    pub day: u8,
    pub start: ClockTime,
    pub end: ClockTime,
    #[serde(default)]
    pub appointment_type_id: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl From<LegacySlot> for ScheduleBlock {
    fn from(slot: LegacySlot) -> Self {
        let block = if slot.available {
            ScheduleBlock::open(slot.day, slot.start, slot.end)
        } else {
            ScheduleBlock::blocked(slot.day, slot.start, slot.end)
        };
        block.for_types(slot.appointment_type_id)
    }
}

/// Either template entry shape, as found in stored templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateEntry {
    Block(ScheduleBlock),
    LegacySlot(LegacySlot),
}

impl From<TemplateEntry> for ScheduleBlock {
    fn from(entry: TemplateEntry) -> Self {
        match entry {
            TemplateEntry::Block(block) => block,
            TemplateEntry::LegacySlot(slot) => slot.into(),
        }
    }
}

/// Unvalidated wire shape of a template. Legacy payloads call the list `slots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDraft {
    pub id: String,
    pub name: String,
    #[serde(alias = "slots")]
    pub blocks: Vec<TemplateEntry>,
}

/// A named weekly block set. Always valid: blocks are normalized and
/// non-overlapping. Edits replace the template whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TemplateDraft", into = "TemplateDraft")]
pub struct BookingTemplate {
    id: String,
    name: String,
    blocks: Vec<ScheduleBlock>,
}

impl BookingTemplate {
    /// # Errors
    /// Fails with the same errors as [`validate_blocks`].
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        entries: impl IntoIterator<Item = TemplateEntry>,
    ) -> Result<Self> {
        let mut blocks: Vec<ScheduleBlock> =
            entries.into_iter().map(ScheduleBlock::from).collect();
        validate_blocks(&blocks)?;
        blocks.sort_by_key(|b| (b.day_of_week, b.start_time));
        Ok(Self {
            id: id.into(),
            name: name.into(),
            blocks,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blocks(&self) -> &[ScheduleBlock] {
        &self.blocks
    }
}

impl TryFrom<TemplateDraft> for BookingTemplate {
    type Error = BookingError;

    fn try_from(draft: TemplateDraft) -> Result<Self> {
        BookingTemplate::new(draft.id, draft.name, draft.blocks)
    }
}

impl From<BookingTemplate> for TemplateDraft {
    fn from(template: BookingTemplate) -> Self {
        TemplateDraft {
            id: template.id,
            name: template.name,
            blocks: template.blocks.into_iter().map(TemplateEntry::Block).collect(),
        }
    }
}

/// A block in force for one provider over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedBlock {
    pub provider_id: String,
    /// Template the block was copied from, kept for the audit trail only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub effective_from: NaiveDate,
    /// Inclusive. `None` means open-ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_to: Option<NaiveDate>,
    pub block: ScheduleBlock,
}

impl AppliedBlock {
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.is_none_or(|to| date <= to)
    }

    fn period_intersects(&self, from: NaiveDate, to: Option<NaiveDate>) -> bool {
        to.is_none_or(|to| self.effective_from <= to)
            && self.effective_to.is_none_or(|own_to| from <= own_to)
    }
}

/// Result of applying a template to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateApplication {
    /// The provider's complete applied-block set after the change.
    pub blocks: Vec<AppliedBlock>,
    /// Number of blocks copied from the template.
    pub added: usize,
    /// Existing blocks that were cut back or removed to make room.
    pub superseded: Vec<AppliedBlock>,
}

/// Apply `template` to `provider_id` for `[effective_from, effective_to]`.
///
/// `existing` is the provider's current applied-block set; blocks for other
/// providers pass through untouched. With `override_existing`, the provider's
/// blocks whose periods intersect the new one are trimmed to the days outside
/// it. Without it, any same-weekday time clash with such a block is an error.
///
/// # Errors
/// Returns `BookingError::InvalidDateSpec` for an inverted period and
/// `BookingError::Overlap` for clashes when not overriding. In the overlap
/// report `first` indexes `existing` and `second` indexes the template blocks.
pub fn apply_template(
    template: &BookingTemplate,
    provider_id: &str,
    effective_from: NaiveDate,
    effective_to: Option<NaiveDate>,
    existing: &[AppliedBlock],
    override_existing: bool,
) -> Result<TemplateApplication> {
    if effective_to.is_some_and(|to| to < effective_from) {
        return Err(BookingError::InvalidDateSpec(format!(
            "template period ends before it starts ({effective_from} .. {effective_to:?})"
        )));
    }

    let mut kept = Vec::with_capacity(existing.len() + template.blocks.len());
    let mut superseded = Vec::new();
    let mut clashes = Vec::new();

    for (i, applied) in existing.iter().enumerate() {
        let affected = applied.provider_id == provider_id
            && applied.period_intersects(effective_from, effective_to);
        if !affected {
            kept.push(applied.clone());
            continue;
        }

        if override_existing {
            kept.extend(trim_outside(applied, effective_from, effective_to));
            superseded.push(applied.clone());
            continue;
        }

        let applied_range = applied.block.range()?;
        for (j, block) in template.blocks.iter().enumerate() {
            let range = block.range()?;
            if block.day_of_week == applied.block.day_of_week && range.overlaps(&applied_range) {
                clashes.push(BlockOverlap {
                    day_of_week: block.day_of_week,
                    first: i,
                    first_range: applied_range,
                    second: j,
                    second_range: range,
                });
            }
        }
        kept.push(applied.clone());
    }

    if !clashes.is_empty() {
        return Err(BookingError::Overlap(clashes));
    }

    kept.extend(template.blocks.iter().map(|block| AppliedBlock {
        provider_id: provider_id.to_string(),
        template_id: Some(template.id.clone()),
        effective_from,
        effective_to,
        block: block.clone(),
    }));

    Ok(TemplateApplication {
        blocks: kept,
        added: template.blocks.len(),
        superseded,
    })
}

/// The parts of `applied`'s period lying before `from` or after `to`.
fn trim_outside(
    applied: &AppliedBlock,
    from: NaiveDate,
    to: Option<NaiveDate>,
) -> Vec<AppliedBlock> {
    let mut pieces = Vec::new();

    if applied.effective_from < from {
        if let Some(day_before) = from.checked_sub_days(Days::new(1)) {
            pieces.push(AppliedBlock {
                effective_to: Some(day_before),
                ..applied.clone()
            });
        }
    }

    if let Some(to) = to {
        let runs_past = applied.effective_to.is_none_or(|own_to| own_to > to);
        if let (true, Some(day_after)) = (runs_past, to.checked_add_days(Days::new(1))) {
            pieces.push(AppliedBlock {
                effective_from: day_after,
                ..applied.clone()
            });
        }
    }

    pieces
}

/// Blocks in force for `provider_id` on `date`, in start-time order.
pub fn blocks_for_date<'a>(
    applied: &'a [AppliedBlock],
    provider_id: &str,
    date: NaiveDate,
) -> Vec<&'a ScheduleBlock> {
    let day = weekday_index(date);
    let mut blocks: Vec<&ScheduleBlock> = applied
        .iter()
        .filter(|a| {
            a.provider_id == provider_id && a.block.day_of_week == day && a.is_effective_on(date)
        })
        .map(|a| &a.block)
        .collect();
    blocks.sort_by_key(|b| b.start_time);
    blocks
}
