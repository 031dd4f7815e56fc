//! # Configuration
//!
//! Agent settings read from the environment.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `SHMBRIDGE_POLL_INTERVAL_US` | Sleep between polls, in microseconds | `1000` |
//! | `SHMBRIDGE_LOG_FORMAT` | `pretty` or `json` | `pretty` |
//! | `SHMBRIDGE_LOG_FILE` | Optional log file, rolled daily | unset |
//!
//! Unset variables take their default; set but malformed ones are errors.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LogFormat;

pub const POLL_INTERVAL_ENV: &str = "SHMBRIDGE_POLL_INTERVAL_US";
pub const LOG_FORMAT_ENV: &str = "SHMBRIDGE_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "SHMBRIDGE_LOG_FILE";

/// Default sleep between agent polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(1000);

/// Settings for an agent host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings
{
    /// Sleep between polls when the agent is not in yield mode
    pub poll_interval: Duration,
    pub log_format: LogFormat,
    pub log_file: Option<PathBuf>,
}

impl Default for AgentSettings
{
    fn default() -> Self
    {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            log_format: LogFormat::default(),
            log_file: None,
        }
    }
}

impl AgentSettings
{
    /// Read settings from the process environment.
    ///
    /// ## Errors
    ///
    /// - `InvalidValue`: a variable is set but cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError>
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup` instead of the process environment.
    ///
    /// ## Errors
    ///
    /// - `InvalidValue`: a variable is set but cannot be parsed
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(raw) = lookup(POLL_INTERVAL_ENV) {
            let micros: u64 = raw.trim().parse().map_err(|err| ConfigError::invalid(POLL_INTERVAL_ENV, &raw, err))?;
            if micros == 0 {
                return Err(ConfigError::invalid(POLL_INTERVAL_ENV, &raw, "must be at least 1"));
            }
            settings.poll_interval = Duration::from_micros(micros);
        }
        if let Some(raw) = lookup(LOG_FORMAT_ENV) {
            settings.log_format = raw.parse().map_err(|err: String| ConfigError::invalid(LOG_FORMAT_ENV, &raw, err))?;
        }
        settings.log_file = lookup(LOG_FILE_ENV).filter(|path| !path.is_empty()).map(PathBuf::from);

        Ok(settings)
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError
{
    /// A variable is set to something that cannot be used
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue
    {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError
{
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self
    {
        ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn from(vars: &[(&str, &str)]) -> Result<AgentSettings, ConfigError>
    {
        AgentSettings::from_lookup(|key| {
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_string())
        })
    }

    #[test]
    fn test_defaults()
    {
        let settings = from(&[]).unwrap();
        assert_eq!(settings, AgentSettings::default());
        assert_eq!(settings.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_overrides()
    {
        let settings = from(&[
            (POLL_INTERVAL_ENV, "250"),
            (LOG_FORMAT_ENV, "json"),
            (LOG_FILE_ENV, "agent.log"),
        ])
        .unwrap();
        assert_eq!(settings.poll_interval, Duration::from_micros(250));
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.log_file, Some(PathBuf::from("agent.log")));
    }

    #[test]
    fn test_invalid_values()
    {
        for vars in [
            [(POLL_INTERVAL_ENV, "soon")],
            [(POLL_INTERVAL_ENV, "0")],
            [(POLL_INTERVAL_ENV, "-5")],
            [(LOG_FORMAT_ENV, "yaml")],
        ] {
            let err = from(&vars).unwrap_err();
            let ConfigError::InvalidValue { key, .. } = &err;
            assert_eq!(*key, vars[0].0);
            assert!(err.to_string().contains(vars[0].1));
        }
    }
}
