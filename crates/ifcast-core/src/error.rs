//! Domain-specific error types following panic-free policy.

use crate::InterfaceId;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    /// Interface capacity must be a positive number of bits per second.
    #[error("Invalid capacity for {interface}: {value} (expected a positive bits-per-second value)")]
    InvalidCapacity { interface: InterfaceId, value: f64 },

    /// A rate token did not match any recognized unit form.
    #[error("Unparsable rate token: {token:?}")]
    UnparsableRate { token: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
