use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub default_slot_capacity: u32,
    pub event_buffer_size: usize,
    pub max_range_days: i64,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub suggestion_limit: usize,
    pub suggestion_horizon_days: i64,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            default_slot_capacity: 10,
            event_buffer_size: 1024,
            max_range_days: 92,
            default_page_size: 20,
            max_page_size: 100,
            suggestion_limit: 5,
            suggestion_horizon_days: 7,
            request_timeout: Duration::from_millis(5000),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let timeout_ms: u64 = parse_or_default("REQUEST_TIMEOUT_MS", 5000)?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            default_slot_capacity: parse_or_default(
                "DEFAULT_SLOT_CAPACITY",
                defaults.default_slot_capacity,
            )?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            max_range_days: parse_or_default("MAX_RANGE_DAYS", defaults.max_range_days)?,
            default_page_size: parse_or_default("DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: parse_or_default("MAX_PAGE_SIZE", defaults.max_page_size)?,
            suggestion_limit: parse_or_default("SUGGESTION_LIMIT", defaults.suggestion_limit)?,
            suggestion_horizon_days: parse_or_default(
                "SUGGESTION_HORIZON_DAYS",
                defaults.suggestion_horizon_days,
            )?,
            request_timeout: Duration::from_millis(timeout_ms),
        })
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
