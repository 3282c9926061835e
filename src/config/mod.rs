use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::store::IsolationLevel;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

// Container for every setting the service reads at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub reservation: ReservationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub spots_ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ReservationConfig {
    pub isolation_level: IsolationLevel,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed_or("PORT", 8000)?,
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "spot_reservation=debug,tower_http=debug".to_string()),
                log_format: parsed_or("LOG_FORMAT", LogFormat::Pretty)?,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                pool_size: parsed_or("DB_POOL_SIZE", 20)?,
                acquire_timeout_seconds: parsed_or("DB_ACQUIRE_TIMEOUT_SECONDS", 5)?,
            },
            redis: RedisConfig {
                url: required("REDIS_URL")?,
                spots_ttl_seconds: parsed_or("SPOTS_CACHE_TTL_SECONDS", 60)?,
            },
            reservation: ReservationConfig {
                isolation_level: parsed_or(
                    "RESERVATION_ISOLATION_LEVEL",
                    IsolationLevel::ReadCommitted,
                )?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_accepts_known_names() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn config_error_names_the_variable() {
        let err = ConfigError::Invalid { name: "PORT", value: "abc".to_string() };
        assert_eq!(err.to_string(), "PORT has an invalid value \"abc\"");
        assert_eq!(ConfigError::Missing("DATABASE_URL").to_string(), "DATABASE_URL must be set");
    }
}
