use domain::common::entity::{ModuleName, Transport};
use domain::module::entity::ModuleInfo;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_SESSIONS, DEFAULT_PINHOLE_QUEUE_DEPTH};

use super::ConfigError;

/// Proxy-layer section of the gateway config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlgSection {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cap on concurrent proxy sessions (0 = unlimited).
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Depth of the pinhole command queue.
    #[serde(default = "default_queue_depth")]
    pub pinhole_queue_depth: usize,

    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

impl Default for AlgSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_sessions: DEFAULT_MAX_SESSIONS,
            pinhole_queue_depth: DEFAULT_PINHOLE_QUEUE_DEPTH,
            modules: Vec::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}
fn default_queue_depth() -> usize {
    DEFAULT_PINHOLE_QUEUE_DEPTH
}

/// One configured proxy module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    pub name: String,

    /// Human-readable name. Defaults to `name`.
    #[serde(default)]
    pub title: Option<String>,

    pub transport: String,

    /// Control port the protocol listens on (0 for companion modules
    /// only reached through pinholes).
    pub port: u16,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ModuleConfig {
    pub fn validate(&self, idx: usize) -> Result<(), ConfigError> {
        let prefix = format!("alg.modules[{idx}]");

        ModuleName::new(&self.name)
            .validate()
            .map_err(|message| ConfigError::Validation {
                field: format!("{prefix}.name"),
                message: message.to_string(),
            })?;

        parse_transport(&self.transport).map_err(|message| ConfigError::Validation {
            field: format!("{prefix}.transport"),
            message,
        })?;

        Ok(())
    }

    pub fn to_module_info(&self) -> Result<ModuleInfo, ConfigError> {
        let transport = parse_transport(&self.transport).map_err(|message| {
            ConfigError::Validation {
                field: "alg.modules".to_string(),
                message,
            }
        })?;
        Ok(ModuleInfo {
            name: ModuleName::new(&self.name),
            title: self.title.clone().unwrap_or_else(|| self.name.clone()),
            transport,
            port: self.port,
        })
    }
}

fn parse_transport(s: &str) -> Result<Transport, String> {
    match s.to_lowercase().as_str() {
        "tcp" => Ok(Transport::Tcp),
        "udp" => Ok(Transport::Udp),
        _ => Err(format!("invalid transport '{s}': expected tcp|udp")),
    }
}
