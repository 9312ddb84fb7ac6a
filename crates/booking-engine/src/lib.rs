//! # booking-engine
//!
//! Recurrence expansion, conflict detection and availability for provider
//! booking templates and recurring appointments.
//!
//! Every function here is pure: inputs are plain values supplied by the
//! caller, nothing is read from or written to storage, and nothing is cached
//! between calls. Persistence and audit logging stay with the host application
//! behind the traits in [`service`].
//!
//! ## Modules
//!
//! - [`calendar`] — Weekday indexing, Nth-weekday resolution, interval stepping, `HH:mm` times
//! - [`recurrence`] — Validated recurrence specs → ordered calendar dates
//! - [`blocks`] — Schedule blocks, booking templates, template application
//! - [`schedule`] — Per-weekday provider working hours with breaks and lunch
//! - [`conflict`] — Classify why a proposed booking cannot go ahead
//! - [`availability`] — Free intervals and bookable slots for a provider and date
//! - [`materializer`] — Recurring series → occurrences, occurrence lifecycle
//! - [`service`] — Store/audit seams and the service that drives them
//! - [`error`] — Error types

pub mod availability;
pub mod blocks;
pub mod calendar;
pub mod conflict;
pub mod error;
pub mod materializer;
pub mod recurrence;
pub mod schedule;
pub mod service;

pub use availability::{bookable_slots, find_free_intervals, AvailabilityRequest, FreeInterval};
pub use blocks::{apply_template, is_open_at, validate_blocks, BookingTemplate, ScheduleBlock};
pub use calendar::{add_interval, overlaps, resolve_nth_weekday_of_month, ClockTime, TimeRange};
pub use conflict::{check_conflict, Candidate, Commitments, Conflict, ConflictKind};
pub use error::BookingError;
pub use materializer::{materialize, Materialization, Occurrence, RecurringAppointmentSeries};
pub use recurrence::{expand, RecurrenceDraft, RecurrencePattern, RecurrenceSpec};
pub use schedule::ProviderSchedule;
