use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("binding {0} already has a session")]
    AlreadyAttached(u64),

    #[error("session table full: {0} sessions")]
    TableFull(usize),
}

impl From<SessionError> for DomainError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound => DomainError::SessionNotFound,
            SessionError::TableFull(n) => {
                DomainError::AllocationFailure(format!("session table full: {n} sessions"))
            }
            other => DomainError::AllocationFailure(other.to_string()),
        }
    }
}
