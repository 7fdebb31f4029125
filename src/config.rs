use std::env;

use chrono::Duration;

use crate::error::AppError;

/// Policy constants live here so one coherent set applies everywhere;
/// windows and penalties must never be mixed from different sources.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub sweep_interval_secs: u64,
    pub visibility_window_secs: i64,
    pub online_ttl_secs: i64,
    pub penalty_minutes: i64,
    pub watchdog_minutes: i64,
    pub commission_rate: f64,
    pub payment_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            sweep_interval_secs: 5,
            visibility_window_secs: 60,
            online_ttl_secs: 60,
            penalty_minutes: 5,
            watchdog_minutes: 15,
            commission_rate: 0.15,
            payment_timeout_secs: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            sweep_interval_secs: parse_or_default(
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
            visibility_window_secs: parse_or_default(
                "VISIBILITY_WINDOW_SECS",
                defaults.visibility_window_secs,
            )?,
            online_ttl_secs: parse_or_default("ONLINE_TTL_SECS", defaults.online_ttl_secs)?,
            penalty_minutes: parse_or_default("PENALTY_MINUTES", defaults.penalty_minutes)?,
            watchdog_minutes: parse_or_default("WATCHDOG_MINUTES", defaults.watchdog_minutes)?,
            commission_rate: parse_or_default("COMMISSION_RATE", defaults.commission_rate)?,
            payment_timeout_secs: parse_or_default(
                "PAYMENT_TIMEOUT_SECS",
                defaults.payment_timeout_secs,
            )?,
        })
    }

    pub fn visibility_window(&self) -> Duration {
        Duration::seconds(self.visibility_window_secs)
    }

    pub fn online_ttl(&self) -> Duration {
        Duration::seconds(self.online_ttl_secs)
    }

    pub fn penalty(&self) -> Duration {
        Duration::minutes(self.penalty_minutes)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::minutes(self.watchdog_minutes)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
