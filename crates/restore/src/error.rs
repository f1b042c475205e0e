//! crates/restore/src/error.rs
//!
//! Error types for the per-disk restore pipeline and the domain-level
//! configuration/chain-discovery helpers layered around it.

use thiserror::Error;

/// Result type for restore operations.
pub type RestoreResult<T> = Result<T, RestoreError>;

/// Errors produced while restoring one disk or discovering/replaying its
/// chain of stream files. Fatal to the current disk; the orchestrator logs
/// the failure and continues with other workers.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// The restore target already exists; restore never overwrites.
    #[error("restore target {path} already exists")]
    TargetExists {
        /// The path that would have been overwritten.
        path: String,
    },
    /// No base (`full` or `copy`) stream file was found for this disk.
    #[error("no full or copy base file found for disk {disk} in {input_dir}")]
    NoBaseFound {
        /// The disk target being restored.
        disk: String,
        /// The input directory searched.
        input_dir: String,
    },
    /// Both a `full` and a `copy` base file matched this disk; restore
    /// cannot pick a chain root unambiguously.
    #[error("disk {disk} has both a full and a copy base file in {input_dir}; remove one to disambiguate")]
    AmbiguousBase {
        /// The disk target being restored.
        disk: String,
        /// The input directory searched.
        input_dir: String,
    },
    /// A chain file failed to parse as a well-formed stream container.
    #[error("malformed stream file {path}: {source}")]
    Stream {
        /// The stream file path.
        path: String,
        /// The underlying format error.
        #[source]
        source: stream::StreamFormatError,
    },
    /// Writing a restored region to the NBD transport failed.
    #[error("nbd write failed for disk {disk}: {source}")]
    Transport {
        /// The disk target being restored.
        disk: String,
        /// The underlying transport error.
        #[source]
        source: nbd_transport::TransportError,
    },
    /// The cumulative bytes written while replaying a chain file did not
    /// equal that file's metadata `data_size`.
    #[error("size mismatch restoring disk {disk} from {file}: expected {expected} bytes, wrote {actual}")]
    SizeMismatch {
        /// The disk target being restored.
        disk: String,
        /// The chain file being replayed.
        file: String,
        /// The `data_size` recorded in the file's Meta frame.
        expected: u64,
        /// The number of bytes actually written while replaying it.
        actual: u64,
    },
    /// The image creator collaborator failed to allocate the target image.
    #[error("failed to create restore target for disk {disk}: {reason}")]
    ImageCreateFailed {
        /// The disk target being restored.
        disk: String,
        /// A human-readable reason reported by the image creator.
        reason: String,
    },
    /// A restore-side local or remote NBD server failed to start.
    #[error("failed to start restore-side nbd server for disk {disk}: {reason}")]
    NbdServerStartFailed {
        /// The disk target being restored.
        disk: String,
        /// A human-readable reason.
        reason: String,
    },
    /// An I/O error occurred reading a chain file, qcow sidecar, or domain
    /// configuration file.
    #[error("I/O error restoring disk {disk}: {source}")]
    Io {
        /// The disk target being restored, or the domain name for
        /// domain-level operations.
        disk: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The domain configuration adjustment or definition failed at the
    /// hypervisor boundary.
    #[error("domain configuration error: {0}")]
    Hypervisor(
        #[from]
        #[source]
        hypervisor::HypervisorError,
    ),
    /// No domain configuration (`vmconfig.*.xml`) file was found in the
    /// input directory.
    #[error("no domain configuration file found in {0}")]
    NoDomainConfigFound(String),
    /// The compression trailer did not describe the Data frames it was
    /// read alongside: either it had fewer entries than Data frames, or an
    /// entry's sub-chunk sizes did not sum to its frame's on-disk length.
    #[error("compression trailer mismatch restoring disk {disk} from {file}: {reason}")]
    TrailerMismatch {
        /// The disk target being restored.
        disk: String,
        /// The chain file being replayed.
        file: String,
        /// What about the trailer didn't line up.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_mismatch_displays_disk_and_counts() {
        let err = RestoreError::SizeMismatch { disk: "vda".into(), file: "vda.full.data".into(), expected: 100, actual: 50 };
        let rendered = err.to_string();
        assert!(rendered.contains("vda"));
        assert!(rendered.contains("100"));
        assert!(rendered.contains("50"));
    }
}
