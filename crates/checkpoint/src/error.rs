//! crates/checkpoint/src/error.rs
//!
//! Error types for checkpoint chain assignment and persistence.

use thiserror::Error;

/// Result type for checkpoint-chain operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Errors produced while assigning, persisting, or validating a checkpoint
/// chain. Every variant is fatal to the run: no worker starts until
/// checkpoint assignment succeeds.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The hypervisor reports a checkpoint whose name does not match the
    /// `<prefix>.<n>` pattern. The utility refuses to continue rather than
    /// guess whether it is safe to layer onto an unrelated chain.
    #[error("domain {domain} has a foreign checkpoint {name} not matching prefix {prefix:?}")]
    Foreign {
        /// The domain the foreign checkpoint was found on.
        domain: String,
        /// The foreign checkpoint's name.
        name: String,
        /// The expected chain prefix.
        prefix: String,
    },
    /// Incremental or differential backup was requested but no prior chain
    /// exists to extend.
    #[error("no existing checkpoints found for mode requiring a prior chain")]
    NoCheckpointsFound,
    /// The chain file exists but could not be parsed as a JSON array of
    /// strings.
    #[error("failed to read checkpoint chain file {path}: {source}")]
    ReadCheckpointsError {
        /// The chain file path.
        path: String,
        /// The underlying I/O or JSON error.
        #[source]
        source: ChainIoError,
    },
    /// Writing the updated chain file failed.
    #[error("failed to save checkpoint chain file {path}: {source}")]
    SaveCheckpointError {
        /// The chain file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Re-declaring the chain's checkpoints to the hypervisor failed.
    #[error("failed to redefine checkpoints for domain {domain}: {source}")]
    RedefineCheckpointError {
        /// The domain being redefined.
        domain: String,
        /// The underlying hypervisor error.
        #[source]
        source: hypervisor::HypervisorError,
    },
    /// Dropping the hypervisor's checkpoints ahead of a `full` backup
    /// failed.
    #[error("failed to remove existing checkpoints for domain {domain}: {source}")]
    RemoveCheckpointError {
        /// The domain being cleared.
        domain: String,
        /// The underlying hypervisor error.
        #[source]
        source: hypervisor::HypervisorError,
    },
    /// The hypervisor call backing foreign-checkpoint detection failed.
    #[error("failed to query checkpoints for domain {domain}: {source}")]
    QueryCheckpointError {
        /// The domain being queried.
        domain: String,
        /// The underlying hypervisor error.
        #[source]
        source: hypervisor::HypervisorError,
    },
    /// Recording the newly assigned checkpoint at the hypervisor failed.
    #[error("failed to record checkpoint for domain {domain}: {source}")]
    RecordCheckpointError {
        /// The domain the checkpoint was being recorded against.
        domain: String,
        /// The underlying hypervisor error.
        #[source]
        source: hypervisor::HypervisorError,
    },
}

/// The union of I/O and JSON parse failures reading a chain file, nested
/// inside [`CheckpointError::ReadCheckpointsError`].
#[derive(Debug, Error)]
pub enum ChainIoError {
    /// The chain file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The chain file's contents were not a valid JSON array of strings.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_error_displays_domain_and_prefix() {
        let err = CheckpointError::Foreign {
            domain: "web01".into(),
            name: "snapshot-x".into(),
            prefix: "web01".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("web01"));
        assert!(rendered.contains("snapshot-x"));
    }

    #[test]
    fn no_checkpoints_found_has_fixed_message() {
        assert_eq!(
            CheckpointError::NoCheckpointsFound.to_string(),
            "no existing checkpoints found for mode requiring a prior chain"
        );
    }
}
