use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use chrono_tz::Tz;

use crate::error::ConfigError;

/// Process configuration. Unlike the teacher's TOML-file config, this one is
/// entirely environment-driven (SPEC_FULL.md §6 names the env vars as the
/// external interface, with no config file in scope).
#[derive(Debug, Clone)]
pub struct Config {
    pub timezone: String,
    pub database_path: PathBuf,
    pub default_captures_path: PathBuf,
    pub default_videos_path: PathBuf,
    pub default_capture_pattern: String,
    pub host: String,
    pub port: u16,
    pub ffmpeg_timeout_secs: u64,
    pub log_level: String,
    pub worker_pool_size: usize,
    pub scheduler_tick_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn load_config() -> Result<Config> {
    let port: u16 = env_or("PORT", "8080")
        .parse()
        .map_err(|_| ConfigError::Validation("PORT must be a valid port number".to_string()))?;

    let ffmpeg_timeout_secs: u64 = env_or("FFMPEG_TIMEOUT", "30")
        .parse()
        .map_err(|_| ConfigError::Validation("FFMPEG_TIMEOUT must be an integer number of seconds".to_string()))?;

    Ok(Config {
        timezone: env_or("TZ", "UTC"),
        database_path: PathBuf::from(env_or("DATABASE_PATH", "./data/timelapsed.db")),
        default_captures_path: PathBuf::from(env_or("DEFAULT_CAPTURES_PATH", "/captures")),
        default_videos_path: PathBuf::from(env_or("DEFAULT_VIDEOS_PATH", "/timelapses")),
        default_capture_pattern: env_or("DEFAULT_CAPTURE_PATTERN", "{job_name}_{num:06d}_{timestamp}"),
        host: env_or("HOST", "0.0.0.0"),
        port,
        ffmpeg_timeout_secs,
        log_level: env_or("LOG_LEVEL", "info"),
        worker_pool_size: env_or("WORKER_POOL_SIZE", "5")
            .parse()
            .map_err(|_| ConfigError::Validation("WORKER_POOL_SIZE must be a positive integer".to_string()))?,
        scheduler_tick_secs: env_or("SCHEDULER_TICK_SECS", "10")
            .parse()
            .map_err(|_| ConfigError::Validation("SCHEDULER_TICK_SECS must be a positive integer".to_string()))?,
    })
}

impl Config {
    /// The configured `TZ` as a parsed zone, used by `job_state` to evaluate
    /// daily windows in wall-clock local time. Falls back to UTC if the
    /// string is somehow invalid at this point — `validate_config` is
    /// expected to have already rejected that at startup.
    pub fn tz(&self) -> Tz {
        Tz::from_str(&self.timezone).unwrap_or(chrono_tz::UTC)
    }
}

pub fn validate_config(config: &Config) -> Result<()> {
    config
        .timezone
        .parse::<Tz>()
        .map_err(|_| ConfigError::Validation(format!("unknown timezone '{}'", config.timezone)))?;

    if config.ffmpeg_timeout_secs == 0 {
        return Err(ConfigError::Validation("FFMPEG_TIMEOUT must be greater than 0".to_string()).into());
    }

    if config.worker_pool_size == 0 {
        return Err(ConfigError::Validation("WORKER_POOL_SIZE must be greater than 0".to_string()).into());
    }

    if config.scheduler_tick_secs == 0 {
        return Err(ConfigError::Validation("SCHEDULER_TICK_SECS must be greater than 0".to_string()).into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_timezone() {
        let mut config = load_config().unwrap();
        config.timezone = "Not/AZone".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn default_config_validates() {
        let config = load_config().unwrap();
        assert!(validate_config(&config).is_ok());
    }
}
