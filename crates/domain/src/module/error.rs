use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("duplicate module: {transport}/{name}")]
    Duplicate { transport: String, name: String },

    #[error("module not found: {name}")]
    NotFound { name: String },

    #[error("module being removed: {name}")]
    BeingRemoved { name: String },

    #[error("module {name} failed to initialize: {reason}")]
    InitFailed { name: String, reason: String },

    #[error("module hook failed: {reason}")]
    HookFailed { reason: String },

    #[error("invalid module descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("stale module handle")]
    StaleHandle,
}

impl From<ModuleError> for DomainError {
    fn from(e: ModuleError) -> Self {
        match e {
            ModuleError::Duplicate { transport, name } => {
                DomainError::DuplicateModule(format!("{transport}/{name}"))
            }
            ModuleError::NotFound { name } => DomainError::ModuleNotFound(name),
            ModuleError::BeingRemoved { name } => DomainError::ModuleBeingRemoved(name),
            ModuleError::HookFailed { reason } => DomainError::ModuleHookFailure(reason),
            other => DomainError::InvalidConfig(other.to_string()),
        }
    }
}
