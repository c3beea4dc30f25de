//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use pickup_core::admission::AdmissionSettings;
use pickup_core::slots::{parse_hhmm, BusinessHours, SlotSettings};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub cors_origin: String,
    pub slots: SlotSettings,
    pub admission_max_attempts: u32,
    pub admission_backoff: Duration,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            log_level: Level::INFO,
            cors_origin: "http://localhost:3000".to_string(),
            slots: SlotSettings::default(),
            admission_max_attempts: 3,
            admission_backoff: Duration::from_millis(25),
            bootstrap_admin: None,
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn parse_time(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u32>, ConfigError> {
    lookup(name)
        .map(|raw| {
            parse_hhmm(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(name.to_string(), format!("'{}' is not an HH:MM time", raw))
            })
        })
        .transpose()
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        // --- Load Server and Database Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", defaults.bind_address)?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;
        let cors_origin = lookup("CORS_ORIGIN").unwrap_or(defaults.cors_origin);

        // --- Load Slot Settings ---
        let slot_minutes: u32 = parse_or(&lookup, "SLOT_MINUTES", defaults.slots.slot_minutes)?;
        if slot_minutes == 0 {
            return Err(ConfigError::InvalidValue(
                "SLOT_MINUTES".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let business_hours = match (parse_time(&lookup, "OPEN_TIME")?, parse_time(&lookup, "CLOSE_TIME")?) {
            (Some(open_minute), Some(close_minute)) if open_minute < close_minute => Some(BusinessHours {
                open_minute,
                close_minute,
            }),
            (None, None) => None,
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidValue(
                    "OPEN_TIME".to_string(),
                    "must be earlier than CLOSE_TIME".to_string(),
                ))
            }
            (Some(_), None) => return Err(ConfigError::MissingVar("CLOSE_TIME".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingVar("OPEN_TIME".to_string())),
        };
        let slots = SlotSettings {
            prep_buffer_minutes: parse_or(
                &lookup,
                "PREP_BUFFER_MINUTES",
                defaults.slots.prep_buffer_minutes,
            )?,
            slot_minutes,
            window_hours: parse_or(&lookup, "WINDOW_HOURS", defaults.slots.window_hours)?,
            slot_limit: parse_or(&lookup, "SLOT_LIMIT", defaults.slots.slot_limit)?,
            business_hours,
        };

        // --- Load Admission Retry Settings ---
        let admission_max_attempts: u32 =
            parse_or(&lookup, "ADMISSION_MAX_ATTEMPTS", defaults.admission_max_attempts)?;
        if admission_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "ADMISSION_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let admission_backoff = Duration::from_millis(parse_or(
            &lookup,
            "ADMISSION_BACKOFF_MS",
            defaults.admission_backoff.as_millis() as u64,
        )?);

        let bootstrap_admin = match (lookup("BOOTSTRAP_ADMIN_EMAIL"), lookup("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingVar("BOOTSTRAP_ADMIN_PASSWORD".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingVar("BOOTSTRAP_ADMIN_EMAIL".to_string())),
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            slots,
            admission_max_attempts,
            admission_backoff,
            bootstrap_admin,
        })
    }

    pub fn admission_settings(&self) -> AdmissionSettings {
        AdmissionSettings {
            slots: self.slots.clone(),
            max_attempts: self.admission_max_attempts,
            backoff: self.admission_backoff,
        }
    }
}
