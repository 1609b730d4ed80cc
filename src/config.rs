//! Configuration for optimizers and dispatchers.
//!
//! Settings can be built in code with the builder-style setters or loaded
//! from TOML with the following resolution order:
//! 1. explicit path (if provided)
//! 2. `~/.request-optimizer/config.toml` (user)
//! 3. `/etc/request-optimizer/config.toml` (system)
//!
//! When no file exists in the default locations the built-in defaults are
//! used. Durations are expressed in milliseconds.
//!
//! ```toml
//! [optimizer]
//! max_retries = 3
//! cache_expiry_ms = 300000
//! max_concurrent = 5
//! log_prefix = "[api]"
//!
//! [dispatcher]
//! base_url = "https://api.example.com"
//! timeout_ms = 10000
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};
use crate::retry::RetryPolicy;

/// Top-level settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

impl Settings {
    /// Load settings from the standard locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => {
                let content = fs::read_to_string(&path).map_err(|e| {
                    OptimizerError::Configuration(format!(
                        "failed to read config file {path:?}: {e}"
                    ))
                })?;
                Self::from_toml_str(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate settings from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content).map_err(|e| {
            OptimizerError::Configuration(format!("failed to parse config: {e}"))
        })?;
        settings.optimizer.validate()?;
        Ok(settings)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(OptimizerError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".request-optimizer").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/request-optimizer/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

/// Instance-wide optimizer settings.
///
/// ```rust
/// # use request_optimizer::OptimizerConfig;
/// # use std::time::Duration;
/// let config = OptimizerConfig::new()
///     .max_retries(5)
///     .cache_expiry(Duration::from_secs(60))
///     .max_concurrent(8);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Retries after the first attempt. Default: 3.
    pub max_retries: u32,
    /// Delay before the first retry. Default: 1000 ms.
    pub base_delay_ms: u64,
    /// Cap on any single retry delay. Default: 8000 ms.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive retry delays. Default: 2.
    pub backoff_factor: f64,
    /// Add up to one second of random jitter to retry delays. Default: true.
    pub jitter: bool,
    /// Lifetime of cached responses. Default: 5 minutes.
    pub cache_expiry_ms: u64,
    /// Cache successful responses. Default: true.
    pub enable_cache: bool,
    /// Maximum number of cached responses. Default: 100.
    pub max_cache_size: usize,
    /// Maximum simultaneously dispatched operations. Default: 5.
    pub max_concurrent: usize,
    /// Per-attempt timeout. Default: 10 s.
    pub default_timeout_ms: u64,
    /// Emit call lifecycle events. Default: true.
    pub enable_logging: bool,
    /// Attached to every lifecycle event as the `optimizer` field.
    pub log_prefix: String,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
            backoff_factor: 2.0,
            jitter: true,
            cache_expiry_ms: 5 * 60 * 1_000,
            enable_cache: true,
            max_cache_size: 100,
            max_concurrent: 5,
            default_timeout_ms: 10_000,
            enable_logging: true,
            log_prefix: "[api-optimizer]".to_string(),
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = millis(delay);
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = millis(delay);
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    pub fn cache_expiry(mut self, ttl: Duration) -> Self {
        self.cache_expiry_ms = millis(ttl);
        self
    }

    pub fn enable_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }

    pub fn max_cache_size(mut self, n: usize) -> Self {
        self.max_cache_size = n;
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = millis(timeout);
        self
    }

    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    pub fn log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_prefix = prefix.into();
        self
    }

    /// Parse a bare optimizer table (no `[optimizer]` header).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: OptimizerConfig = toml::from_str(content).map_err(|e| {
            OptimizerError::Configuration(format!("failed to parse optimizer config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn cache_expiry_duration(&self) -> Duration {
        Duration::from_millis(self.cache_expiry_ms)
    }

    pub fn default_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Retry policy derived from the instance-wide settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            timeout: self.default_timeout_duration(),
            jitter: self.jitter,
        }
    }

    /// Reject settings the optimizer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_cache_size == 0 {
            return Err(OptimizerError::Configuration(
                "max_cache_size must be at least 1".into(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(OptimizerError::Configuration(
                "max_concurrent must be at least 1".into(),
            ));
        }
        if !(self.backoff_factor >= 1.0 && self.backoff_factor.is_finite()) {
            return Err(OptimizerError::Configuration(format!(
                "backoff_factor must be a finite number >= 1, got {}",
                self.backoff_factor
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(OptimizerError::Configuration(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        if self.default_timeout_ms == 0 {
            return Err(OptimizerError::Configuration(
                "default_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Per-call overrides layered over an [`OptimizerConfig`].
///
/// Unset fields fall back to the optimizer's settings.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Parameters that distinguish this call from others with the same
    /// identity. Part of the cache key.
    pub params: Option<serde_json::Value>,
    pub enable_cache: Option<bool>,
    pub cache_expiry: Option<Duration>,
    pub max_retries: Option<u32>,
    pub base_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub backoff_factor: Option<f64>,
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn enable_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = Some(enabled);
        self
    }

    pub fn cache_expiry(mut self, ttl: Duration) -> Self {
        self.cache_expiry = Some(ttl);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = Some(factor);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn resolve(&self, base: &OptimizerConfig) -> ResolvedCall {
        let defaults = base.retry_policy();
        ResolvedCall {
            enable_cache: self.enable_cache.unwrap_or(base.enable_cache),
            cache_expiry: self
                .cache_expiry
                .unwrap_or_else(|| base.cache_expiry_duration()),
            retry: RetryPolicy {
                max_retries: self.max_retries.unwrap_or(defaults.max_retries),
                base_delay: self.base_delay.unwrap_or(defaults.base_delay),
                max_delay: self.max_delay.unwrap_or(defaults.max_delay),
                backoff_factor: self.backoff_factor.unwrap_or(defaults.backoff_factor),
                timeout: self.timeout.unwrap_or(defaults.timeout),
                jitter: defaults.jitter,
            },
        }
    }
}

/// Effective settings for one call.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedCall {
    pub enable_cache: bool,
    pub cache_expiry: Duration,
    pub retry: RetryPolicy,
}

/// Settings for the enhanced request dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Prefix for relative request URLs.
    pub base_url: String,
    /// Default request timeout. Default: 10 s.
    pub timeout_ms: u64,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Lifetime of cached responses. Default: 5 minutes.
    pub cache_time_ms: u64,
    /// Maximum number of cached responses. Default: 1000.
    pub cache_capacity: u64,
    /// Reported as `X-App-Version`.
    pub app_version: String,
    /// Reported as `X-Platform`.
    pub platform: String,
    /// Reported as `X-Version`.
    pub system_version: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_ms: 10_000,
            headers,
            cache_time_ms: 5 * 60 * 1_000,
            cache_capacity: 1_000,
            app_version: "1.0.0".to_string(),
            platform: std::env::consts::OS.to_string(),
            system_version: String::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = millis(timeout);
        self
    }

    pub fn cache_time(mut self, ttl: Duration) -> Self {
        self.cache_time_ms = millis(ttl);
        self
    }

    pub fn cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_time_duration(&self) -> Duration {
        Duration::from_millis(self.cache_time_ms)
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
