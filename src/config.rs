//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Per-job runtime settings, shared by every job the registry creates.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Pace of the execution task: at most one unit of work per tick.
    pub tick_interval: Duration,
    /// Upper bound on each half of a control signal round trip (send, then ack).
    pub signal_timeout: Duration,
    /// Capacity of a job's control channel.
    pub signal_buffer: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            signal_timeout: Duration::from_secs(2),
            signal_buffer: 8,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// HTTP port.
    pub port: u16,
    /// Maximum number of live jobs (0 = unlimited).
    pub max_jobs: usize,
    /// Settings handed to every job.
    pub jobs: JobSettings,
    /// Directory for rolling log files. Logs go to stdout when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3333,
            max_jobs: 0,
            jobs: JobSettings::default(),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `JOBCTL_*` environment variables.
    pub fn from_env() -> crate::error::Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok())?)
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let tick_ms: u64 = parse_or(&lookup, "JOBCTL_TICK_MS", 1000)?;
        let signal_timeout_ms: u64 = parse_or(&lookup, "JOBCTL_SIGNAL_TIMEOUT_MS", 2000)?;
        let signal_buffer: usize =
            parse_or(&lookup, "JOBCTL_SIGNAL_BUFFER", defaults.jobs.signal_buffer)?;

        non_zero("JOBCTL_TICK_MS", tick_ms)?;
        non_zero("JOBCTL_SIGNAL_TIMEOUT_MS", signal_timeout_ms)?;
        non_zero("JOBCTL_SIGNAL_BUFFER", signal_buffer as u64)?;

        Ok(Self {
            host: lookup("JOBCTL_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "JOBCTL_PORT", defaults.port)?,
            max_jobs: parse_or(&lookup, "JOBCTL_MAX_JOBS", defaults.max_jobs)?,
            jobs: JobSettings {
                tick_interval: Duration::from_millis(tick_ms),
                signal_timeout: Duration::from_millis(signal_timeout_ms),
                signal_buffer,
            },
            log_dir: lookup("JOBCTL_LOG_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

fn non_zero(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.port, 3333);
        assert_eq!(config.max_jobs, 0);
        assert_eq!(config.jobs.tick_interval, Duration::from_secs(1));
        assert_eq!(config.jobs.signal_buffer, 8);
        assert!(config.log_dir.is_none());
        assert_eq!(config.bind_addr(), "0.0.0.0:3333");
    }

    #[test]
    fn overrides_are_applied() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("JOBCTL_HOST", "127.0.0.1"),
            ("JOBCTL_PORT", "8080"),
            ("JOBCTL_MAX_JOBS", "4"),
            ("JOBCTL_TICK_MS", "250"),
            ("JOBCTL_SIGNAL_TIMEOUT_MS", "500"),
            ("JOBCTL_LOG_DIR", "/var/log/jobctl"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.max_jobs, 4);
        assert_eq!(config.jobs.tick_interval, Duration::from_millis(250));
        assert_eq!(config.jobs.signal_timeout, Duration::from_millis(500));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/jobctl")));
    }

    #[test]
    fn unparsable_value_is_rejected() {
        let err = ServerConfig::from_lookup(lookup_from(&[("JOBCTL_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "JOBCTL_PORT"));
    }

    #[test]
    fn zero_tick_is_rejected() {
        let err = ServerConfig::from_lookup(lookup_from(&[("JOBCTL_TICK_MS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "JOBCTL_TICK_MS"));
    }
}
