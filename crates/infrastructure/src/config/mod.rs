//! Proxy-layer configuration: structs, parsing, and validation.
//!
//! Split across sub-modules:
//! - `alg`: the proxy section (session limits, queue depth, module list)
//! - this file: the top-level config, log settings, and `ConfigError`

mod alg;

pub use alg::{AlgSection, ModuleConfig};

use std::path::Path;

use domain::module::entity::ModuleInfo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::MAX_MODULES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml_ng::Error),

    #[error("invalid config at {field}: {message}")]
    Validation { field: String, message: String },
}

pub(crate) fn check_limit(field: &str, actual: usize, limit: usize) -> Result<(), ConfigError> {
    if actual > limit {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: format!("{actual} entries exceed the limit of {limit}"),
        });
    }
    Ok(())
}

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub gateway: GatewayInfo,

    #[serde(default)]
    pub alg: AlgSection,
}

impl GatewayConfig {
    /// Load config from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config after deserialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_limit("alg.modules", self.alg.modules.len(), MAX_MODULES)?;

        for (idx, module_cfg) in self.alg.modules.iter().enumerate() {
            module_cfg.validate(idx)?;
        }

        // Duplicate (transport, name) pairs would be rejected again at
        // registration time; catching them here names the config line.
        for (i, module_cfg) in self.alg.modules.iter().enumerate() {
            if self.alg.modules[i + 1..]
                .iter()
                .any(|other| other.name == module_cfg.name && other.transport == module_cfg.transport)
            {
                return Err(ConfigError::Validation {
                    field: format!("alg.modules[{i}]"),
                    message: format!("duplicate module {}/{}", module_cfg.transport, module_cfg.name),
                });
            }
        }

        Ok(())
    }

    /// Convert all enabled module configs to domain descriptors.
    pub fn module_infos(&self) -> Result<Vec<ModuleInfo>, ConfigError> {
        self.alg
            .modules
            .iter()
            .filter(|cfg| cfg.enabled)
            .map(ModuleConfig::to_module_info)
            .collect()
    }
}

// ── Gateway info ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayInfo {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}
fn default_log_format() -> LogFormat {
    LogFormat::Json
}

// ── Log level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "invalid log level '{s}': expected error|warn|info|debug|trace"
            )),
        }
    }
}

// ── Log format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            _ => Err(format!("invalid log format '{s}': expected json|text")),
        }
    }
}
