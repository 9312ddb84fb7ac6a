use std::hint::black_box;

use booking_engine::{expand, RecurrenceDraft, RecurrencePattern, RecurrenceSpec};
use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, Criterion};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn weekly_spec() -> RecurrenceSpec {
    let mut draft = RecurrenceDraft::new(RecurrencePattern::Weekly, date(2025, 1, 6));
    draft.days_of_week = vec![1, 3, 5];
    draft.end_date = Some(date(2027, 12, 31));
    RecurrenceSpec::new(draft).unwrap()
}

fn monthly_spec() -> RecurrenceSpec {
    let mut draft = RecurrenceDraft::new(RecurrencePattern::Monthly, date(2025, 1, 1));
    draft.week_of_month = Some(-1);
    draft.weekday = Some(5);
    draft.end_date = Some(date(2030, 12, 31));
    RecurrenceSpec::new(draft).unwrap()
}

fn bench_expand(c: &mut Criterion) {
    let weekly = weekly_spec();
    let monthly = monthly_spec();
    let (from, to) = (date(2025, 1, 1), date(2030, 12, 31));

    c.bench_function("expand_weekly_three_days", |b| {
        b.iter(|| expand(black_box(&weekly), from, to))
    });
    c.bench_function("expand_monthly_last_friday", |b| {
        b.iter(|| expand(black_box(&monthly), from, to))
    });
}

criterion_group!(benches, bench_expand);
criterion_main!(benches);
