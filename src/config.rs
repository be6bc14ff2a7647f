//! Configuration management for NoAPI.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `NOAPI_*` environment variables. Environment values that are not plain
//! decimal digits are ignored and the previous value is kept.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use tracing::warn;

use crate::error::{NoapiError, Result};
use crate::ratelimit::RateLimiterConfig;

/// Main configuration for the NoAPI service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoapiConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Reason list configuration
    #[serde(default)]
    pub reasons: ReasonsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Socket address the HTTP server binds to.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8000
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum requests per client within the window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Trailing window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Block duration in seconds once a client exceeds the limit
    #[serde(default = "default_block_duration_secs")]
    pub block_duration_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            block_duration_secs: default_block_duration_secs(),
        }
    }
}

impl RateLimitingConfig {
    /// Validate and convert into the limiter's configuration.
    pub fn to_limiter_config(&self) -> Result<RateLimiterConfig> {
        RateLimiterConfig::new(
            self.max_requests,
            self.window_secs as f64,
            self.block_duration_secs as f64,
        )
    }
}

fn default_max_requests() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    10
}

fn default_block_duration_secs() -> u64 {
    60
}

/// Reason list configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonsConfig {
    /// Path to a JSON array of reason strings
    #[serde(default = "default_reasons_path")]
    pub path: String,

    /// Chance that a request is answered with a grudging yes
    #[serde(default = "default_sigh_probability")]
    pub sigh_probability: f64,
}

impl Default for ReasonsConfig {
    fn default() -> Self {
        Self {
            path: default_reasons_path(),
            sigh_probability: default_sigh_probability(),
        }
    }
}

fn default_reasons_path() -> String {
    "reasons.json".to_string()
}

fn default_sigh_probability() -> f64 {
    0.01
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Environment variable names.
pub const ENV_PORT: &str = "NOAPI_PORT";
pub const ENV_MAX_REQUESTS: &str = "NOAPI_MAX_REQUESTS";
pub const ENV_TIME_WINDOW: &str = "NOAPI_TIME_WINDOW";
pub const ENV_BLOCK_DURATION: &str = "NOAPI_BLOCK_DURATION";
pub const ENV_REASONS_FILE: &str = "NOAPI_REASONS_FILE";

impl NoapiConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| NoapiError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply overrides using `lookup` to resolve variable names.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Port 0 is a valid request for an ephemeral port.
        override_digits(&lookup, ENV_PORT, &mut self.server.port, true);
        override_digits(
            &lookup,
            ENV_MAX_REQUESTS,
            &mut self.rate_limiting.max_requests,
            false,
        );
        override_digits(
            &lookup,
            ENV_TIME_WINDOW,
            &mut self.rate_limiting.window_secs,
            false,
        );
        override_digits(
            &lookup,
            ENV_BLOCK_DURATION,
            &mut self.rate_limiting.block_duration_secs,
            false,
        );

        if let Some(path) = lookup(ENV_REASONS_FILE).filter(|p| !p.trim().is_empty()) {
            self.reasons.path = path;
        }
    }
}

/// Replace `target` with the variable's value if it is a plain decimal number.
///
/// Only ASCII digits are accepted: no sign, whitespace or decimal point.
/// Zero is accepted only when `allow_zero` is set.
fn override_digits<F, T>(lookup: &F, name: &str, target: &mut T, allow_zero: bool)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Default + PartialEq + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return;
    };

    let parsed = if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        raw.parse::<T>().ok()
    } else {
        None
    };

    match parsed {
        Some(value) if allow_zero || value != T::default() => *target = value,
        _ => warn!(
            variable = name,
            value = %raw,
            fallback = %target,
            "Ignoring invalid environment value"
        ),
    }
}
