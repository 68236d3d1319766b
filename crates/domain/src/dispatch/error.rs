use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The segment's transport checksum does not verify against the
    /// translated header. The segment was not modified.
    #[error("transport checksum mismatch")]
    ChecksumMismatch,
}

impl From<DispatchError> for DomainError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::ChecksumMismatch => DomainError::ChecksumMismatch,
        }
    }
}
