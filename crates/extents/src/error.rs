//! crates/extents/src/error.rs
//!
//! Error types for extent enumeration.

use thiserror::Error;

/// Result type for extent-handler operations.
pub type ExtentResult<T> = Result<T, ExtentError>;

/// Errors produced while enumerating a disk's allocated/dirty regions.
#[derive(Debug, Error)]
pub enum ExtentError {
    /// The merged extent sequence did not cover `[0, disk_size)` with no
    /// gaps or overlaps.
    #[error("extents do not cover the full disk: covered {covered} of {disk_size} bytes")]
    Coverage {
        /// Total bytes actually covered by the returned extents.
        covered: u64,
        /// The disk's full virtual size.
        disk_size: u64,
    },
    /// The NBD transport failed while querying block status.
    #[error("nbd block-status query failed: {0}")]
    Nbd(
        #[from]
        #[source]
        nbd_transport::TransportError,
    ),
    /// The image-inspection tool fallback failed or produced unparsable
    /// output.
    #[error("image inspection tool failed: {0}")]
    Tool(String),
    /// The image-inspection tool's JSON output could not be parsed.
    #[error("invalid image inspection tool output: {0}")]
    Json(
        #[from]
        #[source]
        serde_json::Error,
    ),
    /// An I/O error occurred invoking the fallback tool.
    #[error("I/O error: {0}")]
    Io(
        #[from]
        #[source]
        std::io::Error,
    ),
}
