use crate::errors::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "CTLBRIDGE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormatName,

    /// Write daily-rotated files here instead of stderr
    #[serde(default)]
    pub directory: Option<String>,

    #[serde(default = "default_prefix")]
    pub file_prefix: String,

    #[serde(default = "default_false")]
    pub span_events: bool,

    /// Extra filter directives, e.g. "ctlbridge=trace"
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatName {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_capacity")]
    pub initial_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Callbacks running longer than this are logged as warnings
    #[serde(default = "default_slow_ms")]
    pub slow_callback_ms: u64,

    #[serde(default = "default_track")]
    pub track_performance: bool,
}

impl DispatchConfig {
    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        BridgeConfig::from_env().dispatch
    }

    pub fn slow_callback(&self) -> Duration {
        Duration::from_millis(self.slow_callback_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormatName::default(),
            directory: None,
            file_prefix: default_prefix(),
            span_events: false,
            filter: None,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_capacity(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            slow_callback_ms: default_slow_ms(),
            track_performance: default_track(),
        }
    }
}

impl BridgeConfig {
    /// Load from a TOML file, then apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> BridgeResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> BridgeResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// CTLBRIDGE_LOG_LEVEL, CTLBRIDGE_LOG_JSON, CTLBRIDGE_LOG_DIR,
    /// CTLBRIDGE_SLOW_CALLBACK_MS
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(format!("{}_{}", ENV_PREFIX, key)).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if lookup("LOG_JSON").is_some() {
            self.logging.format = LogFormatName::Json;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.directory = Some(dir);
        }
        if let Some(ms) = lookup("SLOW_CALLBACK_MS").and_then(|v| v.parse().ok()) {
            self.dispatch.slow_callback_ms = ms;
        }
    }

    pub fn validate(&self) -> BridgeResult<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(BridgeError::Config(format!("unknown log level '{}'", other))),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_prefix() -> String {
    "ctlbridge".to_string()
}

fn default_capacity() -> usize {
    64
}

fn default_slow_ms() -> u64 {
    100
}

fn default_track() -> bool {
    cfg!(debug_assertions)
}

fn default_false() -> bool {
    false
}
