#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `nbd_transport` is an NBD (Network Block Device) client: it dials a
//! Unix socket or TCP endpoint, runs the fixed-newstyle handshake, and
//! exposes the transmission-phase commands the backup and restore engines
//! need — `pread`, `pwrite`, `block_status`, `size`, `max_request_size`,
//! `disconnect`.
//!
//! # Design
//!
//! [`endpoint::NbdEndpoint`] names where to dial. [`connect::connect`]
//! (and, behind the `tls` feature, [`connect::connect_tls`]) dials it and
//! drives [`handshake::negotiate`], which exchanges the initial magic
//! pair, client flags, and then `NBD_OPT_SET_META_CONTEXT` (for any
//! requested metadata context, e.g. a `qemu:dirty-bitmap:<checkpoint>`
//! context) followed by `NBD_OPT_GO`. The result, [`handshake::NegotiatedExport`],
//! is handed to [`transport::NbdTransport`], which owns the connection for
//! the rest of its life and speaks the simple-reply (`READ`/`WRITE`) and
//! structured-reply (`BLOCK_STATUS`) transmission phase.
//!
//! # Invariants
//!
//! - (N1) Every request carries a unique cookie; a reply whose handle does
//!   not match the outstanding request is a protocol violation.
//! - (N2) `pread`/`pwrite`/`block_status` reject lengths exceeding the
//!   negotiated `max_request_size` before writing anything to the wire.
//! - (N3) `block_status` only returns descriptors for the context it was
//!   asked about; chunks for other negotiated contexts are read (to keep
//!   the stream in sync) and discarded.
//!
//! # Errors
//!
//! All fallible operations return [`TransportError`]. A missing or
//! rejected metadata context surfaces as
//! [`TransportError::MetaContextUnavailable`] so callers (the extent
//! query layer) can decide whether to fall back to a full scan.
//!
//! # Examples
//!
//! ```no_run
//! use nbd_transport::{connect, NbdEndpoint};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = NbdEndpoint::unix("/run/vmbackup/vda.sock");
//! let mut transport = connect(&endpoint, "vda", &["qemu:dirty-bitmap:cpt1"])?;
//! let first_block = transport.pread(0, 4096)?;
//! assert_eq!(first_block.len(), 4096);
//! # Ok(())
//! # }
//! ```
//!
//! # See also
//!
//! - `extents` for the `block_status`-driven extent query built on top of
//!   this crate.
//! - `backup`/`restore` for the callers that drive `pread`/`pwrite`.

mod connect;
mod endpoint;
mod error;
pub mod fake_server;
mod handshake;
mod proto;
mod transport;

pub use connect::{connect, Stream};
#[cfg(feature = "tls")]
pub use connect::connect_tls;
pub use endpoint::NbdEndpoint;
pub use error::{TransportError, TransportResult};
pub use fake_server::{FakeNbdServer, FakeStatusRegion};
pub use handshake::NegotiatedExport;
pub use transport::{NbdTransport, StatusDescriptor, DEFAULT_MAX_REQUEST_SIZE};
