//! Error types for booking-engine operations.

use std::fmt::Display;

use thiserror::Error;

use crate::blocks::BlockOverlap;
use crate::recurrence::SpecViolation;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookingError {
    /// The recurrence spec breaks one or more invariants. Every violation found
    /// is reported, not just the first.
    #[error("Invalid recurrence spec: {}", join(.0))]
    InvalidRecurrenceSpec(Vec<SpecViolation>),

    /// A calendar anchor that cannot be resolved (e.g. the 5th Monday of a
    /// month that only has four).
    #[error("Invalid date spec: {0}")]
    InvalidDateSpec(String),

    #[error("Overlapping schedule blocks: {}", join(.0))]
    Overlap(Vec<BlockOverlap>),

    #[error("Invalid schedule block #{index}: {message}")]
    InvalidBlock { index: usize, message: String },

    #[error("Invalid provider schedule: {}", .0.join("; "))]
    InvalidSchedule(Vec<String>),

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// The RRULE attached to an exception block could not be parsed.
    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Series {id} is {status}, only ACTIVE series can be materialized")]
    SeriesNotActive { id: String, status: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Persistence error: {0}")]
    Persistence(String),
}

fn join<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, BookingError>;
