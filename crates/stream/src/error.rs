//! crates/stream/src/error.rs
//!
//! Error types for the stream container codec.

use std::io;

use thiserror::Error;

/// Result type for stream codec operations.
pub type StreamResult<T> = Result<T, StreamFormatError>;

/// Errors produced while reading or writing a stream container.
#[derive(Debug, Error)]
pub enum StreamFormatError {
    /// I/O error occurred while reading or writing the stream.
    #[error("I/O error: {0}")]
    Io(
        #[from]
        #[source]
        io::Error,
    ),
    /// The 8-byte frame tag did not match any known [`crate::FrameKind`].
    #[error("unrecognized frame tag {0:?}")]
    UnknownTag([u8; 8]),
    /// The `start` or `length` field was not valid 16-digit hexadecimal.
    #[error("malformed frame field: {0}")]
    MalformedField(String),
    /// A `\n` delimiter was expected but not found after a header field.
    #[error("missing field delimiter in frame header")]
    MissingDelimiter,
    /// The `TERM` marker did not follow a Data or Meta payload.
    #[error("missing TERM marker after {0:?} payload")]
    MissingTerm(crate::FrameKind),
    /// The metadata JSON failed to parse or was missing a mandatory key.
    #[error("invalid stream metadata: {0}")]
    InvalidMetadata(#[source] serde_json::Error),
    /// The compression trailer JSON failed to parse.
    #[error("invalid compression trailer: {0}")]
    InvalidTrailer(#[source] serde_json::Error),
    /// The file did not start with a Meta frame at offset 0.
    #[error("stream does not begin with a Meta frame")]
    MissingLeadingMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let err: StreamFormatError = io_err.into();
        assert!(matches!(err, StreamFormatError::Io(_)));
    }

    #[test]
    fn unknown_tag_message() {
        let err = StreamFormatError::UnknownTag(*b"XXXXXXXX");
        assert!(err.to_string().contains("unrecognized frame tag"));
    }
}
