//! crates/hypervisor/src/error.rs
//!
//! Error types for the hypervisor capability set.

use std::io;

use thiserror::Error;

/// Result type for hypervisor operations.
pub type HypervisorResult<T> = Result<T, HypervisorError>;

/// Everything that can go wrong talking to the hypervisor.
#[derive(Debug, Error)]
pub enum HypervisorError {
    /// The named domain does not exist.
    #[error("domain {0:?} not found")]
    DomainNotFound(String),
    /// The hypervisor refused to start the backup job.
    #[error("backup job start refused for domain {domain:?}: {reason}")]
    JobStartFailed {
        /// The domain the job was requested for.
        domain: String,
        /// The hypervisor-reported reason.
        reason: String,
    },
    /// A backup job was already active for this domain.
    #[error("a backup job is already active for domain {0:?}")]
    JobAlreadyActive(String),
    /// No backup job was active to stop.
    #[error("no active backup job for domain {0:?}")]
    NoActiveJob(String),
    /// The domain configuration XML could not be parsed or rewritten.
    #[error("domain configuration error: {0}")]
    Config(String),
    /// `defineDomain` was rejected by the hypervisor.
    #[error("domain definition rejected: {0}")]
    DefineRejected(String),
    /// An I/O error occurred talking to the hypervisor's transport.
    #[error("hypervisor I/O error: {0}")]
    Io(
        #[from]
        #[source]
        io::Error,
    ),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_not_found_message() {
        let err = HypervisorError::DomainNotFound("win11".to_string());
        assert!(err.to_string().contains("win11"));
    }
}
