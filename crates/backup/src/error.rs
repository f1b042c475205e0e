//! crates/backup/src/error.rs
//!
//! Error types for the per-disk backup pipeline.

use thiserror::Error;

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Errors produced while backing up one disk. Fatal to the disk's worker;
/// the orchestrator logs the failure and continues with other workers.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Extent enumeration failed.
    #[error("extent enumeration failed for disk {disk}: {source}")]
    DiskBackupFailed {
        /// The disk target being backed up.
        disk: String,
        /// The underlying extent error.
        #[source]
        source: extents::ExtentError,
    },
    /// Reading from or writing to the NBD transport failed mid-pipeline.
    #[error("nbd transfer failed for disk {disk}: {source}")]
    Transport {
        /// The disk target being backed up.
        disk: String,
        /// The underlying transport error.
        #[source]
        source: nbd_transport::TransportError,
    },
    /// Composing a frame failed.
    #[error("stream framing failed for disk {disk}: {source}")]
    Stream {
        /// The disk target being backed up.
        disk: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Writing or finalizing the output sink failed (an I/O exception
    /// distinct from a malformed-stream condition).
    #[error("output sink write failed for disk {disk}: {source}")]
    DiskBackupWriterException {
        /// The disk target being backed up.
        disk: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The hypervisor refused to start or confirm the backup job.
    #[error("backup job failed to start for domain {domain}: {source}")]
    JobStart {
        /// The domain the job was requested for.
        domain: String,
        /// The underlying hypervisor error.
        #[source]
        source: hypervisor::HypervisorError,
    },
    /// Checkpoint assignment or persistence failed.
    #[error("checkpoint handling failed: {0}")]
    Checkpoint(
        #[from]
        #[source]
        checkpoint::CheckpointError,
    ),
    /// The output sink rejected the write (disk full, permission denied,
    /// zip writer failure, ...).
    #[error("output error for disk {disk}: {source}")]
    Output {
        /// The disk target being backed up.
        disk: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// An offline backup's local or remote NBD server failed to start.
    #[error("failed to start nbd server for disk {disk}: {reason}")]
    NbdServerStartFailed {
        /// The disk target the server was meant to expose.
        disk: String,
        /// A human-readable reason.
        reason: String,
    },
    /// An offline incremental/differential request carried no parent
    /// checkpoint to derive the dirty-bitmap context name from.
    #[error("disk {disk} requested an offline incremental/differential backup with no parent checkpoint")]
    MissingParentCheckpoint {
        /// The disk target being backed up.
        disk: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nbd_server_start_failed_displays_disk_and_reason() {
        let err = BackupError::NbdServerStartFailed { disk: "vda".into(), reason: "port in use".into() };
        let rendered = err.to_string();
        assert!(rendered.contains("vda"));
        assert!(rendered.contains("port in use"));
    }
}
