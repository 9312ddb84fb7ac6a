use std::path::Path;

use anyhow::{Context, Result};
use booking_engine::service::ClinicContext;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub clinic: ClinicConfig,
    pub scheduling: SchedulingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClinicConfig {
    pub id: String,
    /// IANA zone name. "Today" for series cancellation is taken in this zone.
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulingConfig {
    /// Start-time granularity for bookable slots.
    pub slot_step_minutes: u32,
    /// Window length used when `windowEnd` is omitted.
    pub default_window_days: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// Load defaults, then `bookgen.toml` (or `path`), then `BOOKGEN_*`
    /// environment variables, with `.env` applied to the environment first.
    ///
    /// ## Errors
    /// Fails if an explicit `path` is missing, a source does not parse, or the
    /// merged result does not deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("bookgen").required(false),
        };

        Config::builder()
            .set_default("clinic.id", "default")?
            .set_default("clinic.timezone", "UTC")?
            .set_default("scheduling.slot_step_minutes", 15)?
            .set_default("scheduling.default_window_days", 90)?
            .set_default("logging.level", "warn")?
            .add_source(file)
            .add_source(
                Environment::with_prefix("BOOKGEN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")
    }

    /// ## Errors
    /// Fails if `clinic.timezone` is not a known IANA zone.
    pub fn clinic_context(&self) -> Result<ClinicContext> {
        ClinicContext::new(&self.clinic.id, &self.clinic.timezone)
            .context("Invalid clinic.timezone in configuration")
    }
}
