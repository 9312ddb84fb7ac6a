//! The impure shell around the pure core.
//!
//! Persistence, clinic lookup and audit logging belong to the host application.
//! They are reached through [`SchedulingStore`] and [`AuditSink`]; the service
//! loads what the core needs, runs it, and hands the result back in one
//! [`SchedulingStore::save_series`] call so the store can commit it as a single
//! unit of work.

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::availability::{find_free_intervals, AvailabilityRequest, FreeInterval};
use crate::blocks::{apply_template, AppliedBlock, BookingTemplate, TemplateApplication};
use crate::conflict::Commitments;
use crate::error::{BookingError, Result};
use crate::materializer::{materialize, Materialization, Occurrence, RecurringAppointmentSeries};

/// The clinic a request runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicContext {
    pub clinic_id: String,
    pub timezone: Tz,
}

impl ClinicContext {
    /// # Errors
    /// Returns `BookingError::InvalidTimezone` if `timezone` is not an IANA name.
    pub fn new(clinic_id: impl Into<String>, timezone: &str) -> Result<Self> {
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| BookingError::InvalidTimezone(timezone.to_string()))?;
        Ok(Self {
            clinic_id: clinic_id.into(),
            timezone,
        })
    }

    /// Today's calendar date in the clinic's time zone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    SeriesMaterialized,
    SeriesCancelled,
    TemplateApplied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub clinic_id: String,
    pub action: AuditAction,
    pub entity_id: String,
    pub summary: serde_json::Value,
}

/// Receives one event per state-changing operation.
pub trait AuditSink {
    fn record(&mut self, event: AuditEvent);
}

/// Audit sink that writes events to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&mut self, event: AuditEvent) {
        info!(
            clinic = %event.clinic_id,
            action = ?event.action,
            entity = %event.entity_id,
            summary = %event.summary,
            "audit"
        );
    }
}

/// Host-side data access.
///
/// Lookups that miss return `BookingError::NotFound`; the service passes such
/// errors through unchanged.
pub trait SchedulingStore {
    fn clinic_context(&self) -> Result<ClinicContext>;

    fn find_series(&self, series_id: &str) -> Result<RecurringAppointmentSeries>;

    fn find_template(&self, template_id: &str) -> Result<BookingTemplate>;

    /// Schedules, appointments, exception blocks and applied blocks for
    /// `provider_id` touching `[from, to]`.
    fn commitments(&self, provider_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Commitments>;

    fn applied_blocks(&self, provider_id: &str) -> Result<Vec<AppliedBlock>>;

    /// Persist `series` together with `new_occurrences` in one transaction.
    ///
    /// Implementations must reject the write if another booking claimed one of
    /// the slots since the conflict check (for instance with a unique
    /// constraint on provider, date and time), returning
    /// `BookingError::Persistence`.
    fn save_series(
        &mut self,
        series: &RecurringAppointmentSeries,
        new_occurrences: &[Occurrence],
    ) -> Result<()>;

    /// Replace the provider's applied-block set in one transaction.
    fn replace_applied_blocks(&mut self, provider_id: &str, blocks: &[AppliedBlock]) -> Result<()>;
}

pub struct SchedulingService<S, A> {
    store: S,
    audit: A,
}

impl<S: SchedulingStore, A: AuditSink> SchedulingService<S, A> {
    pub fn new(store: S, audit: A) -> Self {
        Self { store, audit }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    /// Materialize a stored series over a window and persist the result.
    ///
    /// Aborted runs persist nothing but are still audited.
    ///
    /// # Errors
    /// Store errors pass through; core errors as for [`materialize`].
    pub fn generate_occurrences(
        &mut self,
        series_id: &str,
        window_start: NaiveDate,
        window_end: NaiveDate,
        skip_conflicts: bool,
    ) -> Result<Materialization> {
        let context = self.store.clinic_context()?;
        let mut series = self.store.find_series(series_id)?;
        let commitments = self
            .store
            .commitments(&series.provider_id, window_start, window_end)?;

        let result = materialize(&series, window_start, window_end, skip_conflicts, &commitments)?;

        if !result.aborted && !result.created.is_empty() {
            series.absorb(result.created.iter().cloned());
            self.store.save_series(&series, &result.created)?;
        }

        debug!(series = %series_id, aborted = result.aborted, "occurrence generation finished");
        self.record(&context, AuditAction::SeriesMaterialized, series_id, &result.summary())?;
        Ok(result)
    }

    /// Cancel a stored series as of `as_of` (default: today in the clinic's
    /// time zone). Returns the number of occurrences cancelled.
    ///
    /// # Errors
    /// Store errors pass through; `BookingError::InvalidTransition` if the
    /// series is already completed or cancelled.
    pub fn cancel_series(&mut self, series_id: &str, as_of: Option<NaiveDate>) -> Result<usize> {
        let context = self.store.clinic_context()?;
        let mut series = self.store.find_series(series_id)?;
        let as_of = as_of.unwrap_or_else(|| context.today());

        let cancelled = series.cancel(as_of)?;
        self.store.save_series(&series, &[])?;

        self.record(
            &context,
            AuditAction::SeriesCancelled,
            series_id,
            &serde_json::json!({ "asOf": as_of.to_string(), "cancelledOccurrences": cancelled }),
        )?;
        Ok(cancelled)
    }

    /// Apply a stored template to a provider and persist the new block set.
    ///
    /// # Errors
    /// Store errors pass through; template errors as for [`apply_template`].
    pub fn apply_template(
        &mut self,
        template_id: &str,
        provider_id: &str,
        effective_from: NaiveDate,
        effective_to: Option<NaiveDate>,
        override_existing: bool,
    ) -> Result<TemplateApplication> {
        let context = self.store.clinic_context()?;
        let template = self.store.find_template(template_id)?;
        let existing = self.store.applied_blocks(provider_id)?;

        let application = apply_template(
            &template,
            provider_id,
            effective_from,
            effective_to,
            &existing,
            override_existing,
        )?;
        self.store
            .replace_applied_blocks(provider_id, &application.blocks)?;

        self.record(
            &context,
            AuditAction::TemplateApplied,
            provider_id,
            &serde_json::json!({
                "templateId": template_id,
                "effectiveFrom": effective_from.to_string(),
                "effectiveTo": effective_to.map(|d| d.to_string()),
                "added": application.added,
                "superseded": application.superseded.len(),
            }),
        )?;
        Ok(application)
    }

    /// Free intervals for a provider on one date, from current commitments.
    ///
    /// # Errors
    /// Store errors pass through.
    pub fn free_intervals(&self, request: &AvailabilityRequest) -> Result<Vec<FreeInterval>> {
        let commitments = self
            .store
            .commitments(&request.provider_id, request.date, request.date)?;
        Ok(find_free_intervals(request, &commitments))
    }

    fn record<T: Serialize>(
        &mut self,
        context: &ClinicContext,
        action: AuditAction,
        entity_id: &str,
        summary: &T,
    ) -> Result<()> {
        let summary =
            serde_json::to_value(summary).map_err(|e| BookingError::Persistence(e.to_string()))?;
        self.audit.record(AuditEvent {
            clinic_id: context.clinic_id.clone(),
            action,
            entity_id: entity_id.to_string(),
            summary,
        });
        Ok(())
    }
}
