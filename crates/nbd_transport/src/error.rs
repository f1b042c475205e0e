//! crates/nbd_transport/src/error.rs
//!
//! [`TransportError`], the single error type every handshake and
//! transmission-phase operation in this crate returns.

use std::io;

/// The crate-local result alias.
pub type TransportResult<T> = Result<T, TransportError>;

/// Everything that can go wrong talking to an NBD server.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying socket failed.
    #[error("nbd transport i/o error: {0}")]
    Io(#[from] #[source] io::Error),

    /// The server's handshake or reply did not match the fixed-newstyle
    /// protocol this crate speaks (bad magic, unexpected option reply type,
    /// truncated structured reply chunk, ...).
    #[error("nbd protocol violation: {0}")]
    Protocol(String),

    /// The server rejected `NBD_OPT_GO`/`NBD_OPT_EXPORT_NAME` for the
    /// requested export name.
    #[error("nbd export {export:?} not found or rejected (code {code:#x})")]
    ExportRejected {
        /// The export name that was requested.
        export: String,
        /// The `NBD_REP_ERR_*` code the server returned.
        code: u32,
    },

    /// `NBD_OPT_SET_META_CONTEXT` negotiation did not yield an id for the
    /// requested context (e.g. `qemu:dirty-bitmap:<name>` for a bitmap that
    /// does not exist on the server).
    #[error("nbd server did not grant metadata context {context:?}")]
    MetaContextUnavailable {
        /// The metadata context namespace string that was requested.
        context: String,
    },

    /// A read or write request exceeded the export's negotiated
    /// `max_request_size` (or the hard NBD wire-protocol 32-bit length
    /// field) and was rejected before being sent.
    #[error("request length {requested} exceeds max request size {max}")]
    RequestTooLarge {
        /// The length the caller asked to transfer.
        requested: u64,
        /// The negotiated maximum.
        max: u32,
    },

    /// The server replied to a transmission-phase command with a non-zero
    /// error code.
    #[error("nbd command {command} failed with server error code {code}")]
    CommandFailed {
        /// The NBD command type (`NBD_CMD_READ`, `NBD_CMD_WRITE`, ...).
        command: &'static str,
        /// The `error` field from the server's simple or structured reply.
        code: u32,
    },

    /// TLS negotiation (`NBD_OPT_STARTTLS`) failed.
    #[cfg(feature = "tls")]
    #[error("nbd tls negotiation failed: {0}")]
    Tls(String),
}
