//! `bookgen` CLI: expand recurrences, check conflicts and resolve availability
//! from JSON on the command line.
//!
//! ## Usage
//!
//! ```sh
//! # Dates of a recurrence inside a window (stdin → stdout)
//! echo '{"recurrence": {...}, "windowStart": "2025-01-01"}' | bookgen expand
//!
//! # First conflict for a proposed booking, or every conflict with --all
//! bookgen check -i candidate.json --all
//!
//! # Free intervals and bookable slots for a provider on one date
//! bookgen free -i request.json
//! bookgen slots -i request.json --duration 30 --step 15
//!
//! # Materialize a series over a window, skipping conflicting dates
//! bookgen materialize -i series.json --skip-conflicts -o result.json
//!
//! # Cancel a series as of today in the clinic's time zone
//! bookgen cancel -i series.json
//!
//! # Validate and normalize a booking template (legacy slot shape accepted)
//! bookgen template -i template.json
//! ```
//!
//! Settings come from `bookgen.toml` (or `--config`), then environment
//! variables prefixed `BOOKGEN_` with nested keys joined by `__`.

mod config;

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use booking_engine::availability::first_free_interval;
use booking_engine::conflict::all_conflicts;
use booking_engine::{
    bookable_slots, check_conflict, expand, find_free_intervals, materialize, AvailabilityRequest,
    BookingTemplate, Candidate, Commitments, RecurrenceSpec, RecurringAppointmentSeries,
};
use chrono::{Days, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Settings;

#[derive(Parser)]
#[command(
    name = "bookgen",
    version,
    about = "Recurring appointment and availability engine"
)]
struct Cli {
    /// Configuration file (defaults to ./bookgen.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Io {
    /// Input JSON file (reads from stdin if omitted)
    #[arg(short, long)]
    input: Option<String>,
    /// Output file (writes to stdout if omitted)
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a recurrence spec into dates
    Expand {
        #[command(flatten)]
        io: Io,
    },
    /// Check a proposed booking against existing commitments
    Check {
        #[command(flatten)]
        io: Io,
        /// List every conflict instead of the first by precedence
        #[arg(long)]
        all: bool,
    },
    /// Free intervals for a provider on one date
    Free {
        #[command(flatten)]
        io: Io,
        /// Return only the earliest qualifying interval
        #[arg(long)]
        first: bool,
    },
    /// Bookable slots for a provider on one date
    Slots {
        #[command(flatten)]
        io: Io,
        /// Slot length in minutes (defaults to the request's minimum duration)
        #[arg(long)]
        duration: Option<u32>,
        /// Start-time granularity in minutes (defaults to scheduling.slot_step_minutes)
        #[arg(long)]
        step: Option<u32>,
    },
    /// Materialize a recurring series over a window
    Materialize {
        #[command(flatten)]
        io: Io,
        /// Skip conflicting dates instead of aborting the whole run
        #[arg(long)]
        skip_conflicts: bool,
    },
    /// Cancel a series and its future occurrences
    Cancel {
        #[command(flatten)]
        io: Io,
        /// Cancellation date (defaults to today in the clinic's time zone)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Validate and normalize a booking template
    Template {
        #[command(flatten)]
        io: Io,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpandInput {
    recurrence: RecurrenceSpec,
    window_start: NaiveDate,
    #[serde(default)]
    window_end: Option<NaiveDate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckInput {
    candidate: Candidate,
    #[serde(default)]
    existing: Commitments,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityInput {
    request: AvailabilityRequest,
    #[serde(default)]
    existing: Commitments,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaterializeInput {
    series: RecurringAppointmentSeries,
    window_start: NaiveDate,
    #[serde(default)]
    window_end: Option<NaiveDate>,
    #[serde(default)]
    existing: Commitments,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelOutput {
    as_of: NaiveDate,
    cancelled_occurrences: usize,
    series: RecurringAppointmentSeries,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_tracing(&settings.logging.level);
    debug!(clinic = %settings.clinic.id, timezone = %settings.clinic.timezone, "settings loaded");

    match cli.command {
        Commands::Expand { io } => {
            let input: ExpandInput = read_json(&io)?;
            let window_end = window_end(&settings, input.window_start, input.window_end)?;
            let dates = expand(&input.recurrence, input.window_start, window_end)
                .context("Failed to expand recurrence")?;
            write_json(&io, &dates)?;
        }
        Commands::Check { io, all } => {
            let input: CheckInput = read_json(&io)?;
            if all {
                write_json(&io, &all_conflicts(&input.candidate, &input.existing))?;
            } else {
                write_json(&io, &check_conflict(&input.candidate, &input.existing))?;
            }
        }
        Commands::Free { io, first } => {
            let input: AvailabilityInput = read_json(&io)?;
            if first {
                write_json(&io, &first_free_interval(&input.request, &input.existing))?;
            } else {
                write_json(&io, &find_free_intervals(&input.request, &input.existing))?;
            }
        }
        Commands::Slots { io, duration, step } => {
            let input: AvailabilityInput = read_json(&io)?;
            let duration = duration.unwrap_or(input.request.minimum_duration_minutes);
            let step = step.unwrap_or(settings.scheduling.slot_step_minutes);
            if duration == 0 {
                anyhow::bail!(
                    "Slot duration must be positive (use --duration or minimumDurationMinutes)"
                );
            }
            let mut request = input.request;
            request.minimum_duration_minutes = request.minimum_duration_minutes.max(duration);
            let free = find_free_intervals(&request, &input.existing);
            write_json(&io, &bookable_slots(&free, duration, step))?;
        }
        Commands::Materialize { io, skip_conflicts } => {
            let input: MaterializeInput = read_json(&io)?;
            let window_end = window_end(&settings, input.window_start, input.window_end)?;
            let result = materialize(
                &input.series,
                input.window_start,
                window_end,
                skip_conflicts,
                &input.existing,
            )
            .context("Failed to materialize series")?;
            info!(
                series = %input.series.id,
                created = result.created.len(),
                conflicts = result.conflicts.len(),
                aborted = result.aborted,
                "materialized"
            );
            write_json(&io, &result)?;
        }
        Commands::Cancel { io, as_of } => {
            let mut series: RecurringAppointmentSeries = read_json(&io)?;
            let as_of = match as_of {
                Some(date) => date,
                None => settings.clinic_context()?.today(),
            };
            let cancelled_occurrences = series
                .cancel(as_of)
                .with_context(|| format!("Failed to cancel series {}", series.id))?;
            info!(series = %series.id, %as_of, cancelled_occurrences, "cancelled");
            write_json(
                &io,
                &CancelOutput {
                    as_of,
                    cancelled_occurrences,
                    series,
                },
            )?;
        }
        Commands::Template { io } => {
            let template: BookingTemplate = read_json(&io)?;
            write_json(&io, &template)?;
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .init();
}

fn window_end(settings: &Settings, start: NaiveDate, end: Option<NaiveDate>) -> Result<NaiveDate> {
    match end {
        Some(end) => Ok(end),
        None => start
            .checked_add_days(Days::new(settings.scheduling.default_window_days))
            .context("Default window runs past the supported date range"),
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(io: &Io) -> Result<T> {
    let raw = read_input(io.input.as_deref())?;
    serde_json::from_str(&raw).context("Failed to parse input JSON")
}

fn write_json<T: Serialize>(io: &Io, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    json.push('\n');
    write_output(io.output.as_deref(), &json)
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&str>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
