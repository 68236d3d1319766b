use thiserror::Error;

/// Top-level error for the proxy layer.
///
/// Subdomain errors (`ModuleError`, `SessionError`, `DispatchError`)
/// convert into this for callers that sit above a single subdomain.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("duplicate module: {0}")]
    DuplicateModule(String),

    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("module being removed: {0}")]
    ModuleBeingRemoved(String),

    #[error("session not found")]
    SessionNotFound,

    #[error("transport checksum mismatch")]
    ChecksumMismatch,

    #[error("module hook failed: {0}")]
    ModuleHookFailure(String),

    #[error("pinhole install failed: {0}")]
    PinholeInstallFailure(String),

    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
