use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    /// 0 disables the lockout entirely (unlimited PIN retries).
    pub max_pin_attempts: u32,
    pub reconcile_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            max_pin_attempts: parse_or_default("MAX_PIN_ATTEMPTS", 0)?,
            reconcile_interval_secs: parse_or_default("RECONCILE_INTERVAL_SECS", 60)?,
        })
    }

    pub fn pin_attempt_limit(&self) -> Option<u32> {
        if self.max_pin_attempts == 0 {
            None
        } else {
            Some(self.max_pin_attempts)
        }
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
