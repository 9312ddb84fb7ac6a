//! Tests for schedule blocks, templates and template application.

use booking_engine::blocks::{
    blocks_for_date, AppliedBlock, LegacySlot, TemplateEntry,
};
use booking_engine::calendar::ClockTime;
use booking_engine::{
    apply_template, is_open_at, validate_blocks, BookingError, BookingTemplate, ScheduleBlock,
};
use chrono::NaiveDate;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn t(s: &str) -> ClockTime {
    s.parse().unwrap()
}

fn open(day: u8, start: &str, end: &str) -> ScheduleBlock {
    ScheduleBlock::open(day, t(start), t(end))
}

fn blocked(day: u8, start: &str, end: &str) -> ScheduleBlock {
    ScheduleBlock::blocked(day, t(start), t(end))
}

fn template(id: &str, blocks: Vec<ScheduleBlock>) -> BookingTemplate {
    BookingTemplate::new(id, id, blocks.into_iter().map(TemplateEntry::Block)).unwrap()
}

// ── validate_blocks ──────────────────────────────────────────────────────────

#[test]
fn disjoint_blocks_are_valid() {
    let blocks = vec![
        open(1, "08:00", "12:00"),
        blocked(1, "12:00", "13:00"),
        open(1, "13:00", "17:00"),
        open(2, "08:00", "12:00"),
    ];
    assert!(validate_blocks(&blocks).is_ok());
}

#[test]
fn overlapping_blocks_same_day_rejected() {
    let blocks = vec![open(1, "08:00", "12:00"), blocked(1, "11:30", "13:00")];

    let err = validate_blocks(&blocks).unwrap_err();
    let BookingError::Overlap(pairs) = err else {
        panic!("expected Overlap, got {err:?}");
    };
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].day_of_week, 1);
    assert_eq!((pairs[0].first, pairs[0].second), (0, 1));
}

#[test]
fn same_times_on_different_days_are_fine() {
    let blocks = vec![open(1, "08:00", "12:00"), open(3, "08:00", "12:00")];
    assert!(validate_blocks(&blocks).is_ok());
}

#[test]
fn every_overlapping_pair_reported() {
    let blocks = vec![
        open(2, "08:00", "10:00"),
        open(2, "09:00", "11:00"),
        open(2, "09:30", "09:45"),
    ];
    let Err(BookingError::Overlap(pairs)) = validate_blocks(&blocks) else {
        panic!("expected Overlap");
    };
    assert_eq!(pairs.len(), 3);
}

#[test]
fn inverted_block_is_invalid() {
    let blocks = vec![open(1, "08:00", "09:00"), open(1, "12:00", "11:00")];
    let err = validate_blocks(&blocks).unwrap_err();
    assert!(matches!(err, BookingError::InvalidBlock { index: 1, .. }));
}

#[test]
fn weekday_out_of_range_is_invalid() {
    let err = validate_blocks(&[open(7, "08:00", "09:00")]).unwrap_err();
    assert!(matches!(err, BookingError::InvalidBlock { index: 0, .. }));
}

// ── is_open_at ───────────────────────────────────────────────────────────────

#[test]
fn open_block_accepts_any_type() {
    let blocks = vec![open(1, "08:00", "12:00")];
    assert!(is_open_at(&blocks, 1, t("08:00"), "cleaning"));
    assert!(is_open_at(&blocks, 1, t("11:59"), "adjustment"));
    assert!(!is_open_at(&blocks, 1, t("12:00"), "cleaning"), "end is exclusive");
    assert!(!is_open_at(&blocks, 2, t("09:00"), "cleaning"), "wrong weekday");
}

#[test]
fn restricted_block_accepts_listed_types_only() {
    let blocks = vec![open(1, "08:00", "12:00").for_types(["new-patient", "consult"])];
    assert!(is_open_at(&blocks, 1, t("09:00"), "consult"));
    assert!(!is_open_at(&blocks, 1, t("09:00"), "adjustment"));
}

#[test]
fn blocked_block_ignores_type_list() {
    let blocks = vec![blocked(1, "12:00", "13:00").for_types(["consult"])];
    assert!(!is_open_at(&blocks, 1, t("12:30"), "consult"));
}

#[test]
fn permits_without_type_only_for_unrestricted() {
    assert!(open(1, "08:00", "09:00").permits(None));
    assert!(!open(1, "08:00", "09:00").for_types(["consult"]).permits(None));
    assert!(!blocked(1, "08:00", "09:00").permits(None));
}

// ── Templates ────────────────────────────────────────────────────────────────

#[test]
fn template_accepts_both_entry_shapes() {
    let json = r##"{
        "id": "tpl-1",
        "name": "Ortho Monday",
        "blocks": [
            {"dayOfWeek": 1, "startTime": "13:00", "endTime": "17:00",
             "appointmentTypeIds": ["adjustment"], "color": "#4caf50"},
            {"day": 1, "start": "08:00", "end": "12:00", "appointmentTypeId": "consult"},
            {"day": 1, "start": "12:00", "end": "13:00", "available": false}
        ]
    }"##;

    let template: BookingTemplate = serde_json::from_str(json).unwrap();

    let blocks = template.blocks();
    assert_eq!(blocks.len(), 3);
    // Sorted by weekday and start time after normalization
    assert_eq!(blocks[0].start_time, t("08:00"));
    assert!(blocks[0].appointment_type_ids.contains("consult"));
    assert!(blocks[1].is_blocked);
    assert_eq!(blocks[2].color.as_deref(), Some("#4caf50"));
}

#[test]
fn legacy_slots_key_is_accepted() {
    let json = r#"{
        "id": "tpl-legacy",
        "name": "Old format",
        "slots": [{"day": 2, "start": "09:00", "end": "10:00"}]
    }"#;
    let template: BookingTemplate = serde_json::from_str(json).unwrap();
    assert_eq!(template.blocks(), &[open(2, "09:00", "10:00")]);
}

#[test]
fn legacy_slot_normalizes_to_block() {
    let slot = LegacySlot {
        day: 4,
        start: t("14:00"),
        end: t("15:00"),
        appointment_type_id: Some("xray".to_string()),
        available: true,
    };
    let block = ScheduleBlock::from(slot);
    assert_eq!(block, open(4, "14:00", "15:00").for_types(["xray"]));
}

#[test]
fn template_with_overlap_fails_to_deserialize() {
    let json = r#"{
        "id": "tpl-bad",
        "name": "Overlapping",
        "blocks": [
            {"dayOfWeek": 1, "startTime": "08:00", "endTime": "12:00"},
            {"day": 1, "start": "11:00", "end": "13:00"}
        ]
    }"#;
    let err = serde_json::from_str::<BookingTemplate>(json).unwrap_err();
    assert!(err.to_string().contains("Overlapping schedule blocks"));
}

#[test]
fn template_serializes_in_block_shape_only() {
    let tpl = template("tpl-1", vec![open(1, "08:00", "09:00")]);
    let json = serde_json::to_value(&tpl).unwrap();
    assert_eq!(json["blocks"][0]["dayOfWeek"], 1);
    assert!(json["blocks"][0].get("day").is_none());
}

// ── Template application ─────────────────────────────────────────────────────

fn applied(
    provider: &str,
    from: NaiveDate,
    to: Option<NaiveDate>,
    block: ScheduleBlock,
) -> AppliedBlock {
    AppliedBlock {
        provider_id: provider.to_string(),
        template_id: None,
        effective_from: from,
        effective_to: to,
        block,
    }
}

#[test]
fn apply_to_empty_provider_copies_blocks() {
    let tpl = template("tpl-1", vec![open(1, "08:00", "12:00"), open(2, "08:00", "12:00")]);

    let result = apply_template(&tpl, "dr-a", date(2025, 1, 1), None, &[], false).unwrap();

    assert_eq!(result.added, 2);
    assert!(result.superseded.is_empty());
    assert_eq!(result.blocks.len(), 2);
    assert!(result
        .blocks
        .iter()
        .all(|b| b.provider_id == "dr-a" && b.template_id.as_deref() == Some("tpl-1")));
}

#[test]
fn clash_without_override_is_overlap_error() {
    let existing = vec![applied("dr-a", date(2025, 1, 1), None, open(1, "09:00", "10:00"))];
    let tpl = template("tpl-2", vec![open(1, "08:00", "12:00")]);

    let err = apply_template(&tpl, "dr-a", date(2025, 3, 1), None, &existing, false).unwrap_err();
    assert!(matches!(err, BookingError::Overlap(_)));
}

#[test]
fn no_clash_for_other_provider_or_period() {
    let existing = vec![
        applied("dr-b", date(2025, 1, 1), None, open(1, "09:00", "10:00")),
        applied(
            "dr-a",
            date(2025, 1, 1),
            Some(date(2025, 1, 31)),
            open(1, "09:00", "10:00"),
        ),
    ];
    let tpl = template("tpl-2", vec![open(1, "08:00", "12:00")]);

    let result = apply_template(&tpl, "dr-a", date(2025, 3, 1), None, &existing, false).unwrap();
    assert_eq!(result.blocks.len(), 3);
}

#[test]
fn override_trims_existing_to_outside_period() {
    let existing = vec![applied("dr-a", date(2025, 1, 1), None, open(1, "09:00", "10:00"))];
    let tpl = template("tpl-2", vec![open(1, "08:00", "12:00")]);

    let result = apply_template(
        &tpl,
        "dr-a",
        date(2025, 3, 1),
        Some(date(2025, 3, 31)),
        &existing,
        true,
    )
    .unwrap();

    assert_eq!(result.superseded, existing);
    // Jan 1 - Feb 28 piece, Apr 1 onward piece, plus the new block
    assert_eq!(result.blocks.len(), 3);
    assert_eq!(result.blocks[0].effective_to, Some(date(2025, 2, 28)));
    assert_eq!(result.blocks[1].effective_from, date(2025, 4, 1));
    assert_eq!(result.blocks[1].effective_to, None);
}

#[test]
fn inverted_period_rejected() {
    let tpl = template("tpl-1", vec![open(1, "08:00", "12:00")]);
    let err = apply_template(
        &tpl,
        "dr-a",
        date(2025, 3, 1),
        Some(date(2025, 2, 1)),
        &[],
        false,
    )
    .unwrap_err();
    assert!(matches!(err, BookingError::InvalidDateSpec(_)));
}

#[test]
fn blocks_for_date_filters_weekday_provider_and_period() {
    let applied_blocks = vec![
        applied("dr-a", date(2025, 1, 1), None, open(1, "13:00", "17:00")),
        applied("dr-a", date(2025, 1, 1), None, open(1, "08:00", "12:00")),
        applied("dr-a", date(2025, 1, 1), None, open(2, "08:00", "12:00")),
        applied("dr-b", date(2025, 1, 1), None, open(1, "08:00", "12:00")),
        applied(
            "dr-a",
            date(2025, 1, 1),
            Some(date(2025, 1, 5)),
            blocked(1, "12:00", "13:00"),
        ),
    ];

    // 2025-01-13 is a Monday after the expired block.
    let blocks = blocks_for_date(&applied_blocks, "dr-a", date(2025, 1, 13));

    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].start_time, t("08:00"));
    assert_eq!(blocks[1].start_time, t("13:00"));
}
