//! Server configuration.
//!
//! One typed structure, built and validated once at startup from either a
//! string-keyed map (the process environment in production) or a YAML
//! document.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}")]
    Invalid { key: String, value: String },
    #[error("{0}")]
    Validation(String),
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Initial capacity of each session's read buffer
    pub read_buffer_size: usize,
    /// Interval between leaks of rate-limited endpoint buckets
    pub leak_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Upper bound on request line plus headers
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
    /// 0 leaves handlers unbounded
    pub handler_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub hours_to_keep: u64,
    pub flush_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            read_buffer_size: 4096,
            leak_interval_ms: 100,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 16 * 1024,
            max_body_bytes: 1024 * 1024,
            handler_timeout_ms: 0,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            hours_to_keep: 24,
            flush_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Reads the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Builds a config from `KEY -> value` pairs; missing keys keep their defaults.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut cfg = Config::default();

        if let Some(addr) = vars.get("LISTEN") {
            cfg.server.listen_addr = addr.clone();
        }
        set(vars, "READ_BUFFER_SIZE", &mut cfg.server.read_buffer_size)?;
        set(vars, "LEAK_INTERVAL_MS", &mut cfg.server.leak_interval_ms)?;
        set(vars, "MAX_HEADER_BYTES", &mut cfg.limits.max_header_bytes)?;
        set(vars, "MAX_BODY_BYTES", &mut cfg.limits.max_body_bytes)?;
        set(vars, "HANDLER_TIMEOUT_MS", &mut cfg.limits.handler_timeout_ms)?;
        set(vars, "METRICS_HOURS_TO_KEEP", &mut cfg.metrics.hours_to_keep)?;
        set(vars, "METRICS_FLUSH_INTERVAL_MS", &mut cfg.metrics.flush_interval_ms)?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(source)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        SocketAddr::from_str(&self.server.listen_addr).map_err(|_| ConfigError::Invalid {
            key: "LISTEN".to_string(),
            value: self.server.listen_addr.clone(),
        })?;

        let non_zero = [
            ("read_buffer_size", self.server.read_buffer_size as u64),
            ("leak_interval_ms", self.server.leak_interval_ms),
            ("max_header_bytes", self.limits.max_header_bytes as u64),
            ("flush_interval_ms", self.metrics.flush_interval_ms),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be greater than zero")));
            }
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> &str {
        &self.server.listen_addr
    }

    pub fn leak_interval(&self) -> Duration {
        Duration::from_millis(self.server.leak_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.metrics.flush_interval_ms)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        match self.limits.handler_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

fn set<T: FromStr>(vars: &HashMap<String, String>, key: &str, slot: &mut T) -> Result<(), ConfigError> {
    if let Some(raw) = vars.get(key) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}
