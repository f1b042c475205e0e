//! crates/nbd_transport/src/endpoint.rs
//!
//! [`NbdEndpoint`]: where to dial an NBD export.

use std::path::PathBuf;

/// A dialable NBD export, as either a Unix domain socket (the common case
/// for an export an `nbdkit`/`qemu-nbd` process publishes on the same
/// host as the hypervisor) or a host/port pair, optionally wrapped in TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NbdEndpoint {
    /// A Unix domain socket path.
    Unix(PathBuf),
    /// A TCP host/port, with optional `NBD_OPT_STARTTLS` upgrade.
    Tcp {
        /// Hostname or address to dial.
        host: String,
        /// TCP port.
        port: u16,
        /// Whether to negotiate TLS immediately after the handshake flags
        /// are exchanged, before any other option.
        tls: bool,
    },
}

impl NbdEndpoint {
    /// A Unix socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix(path.into())
    }

    /// A plaintext TCP endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp { host: host.into(), port, tls: false }
    }

    /// A TLS-wrapped TCP endpoint.
    #[must_use]
    pub fn tcp_tls(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp { host: host.into(), port, tls: true }
    }

    /// Whether this endpoint requests a TLS upgrade.
    #[must_use]
    pub const fn wants_tls(&self) -> bool {
        matches!(self, Self::Tcp { tls: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_endpoint_does_not_want_tls() {
        assert!(!NbdEndpoint::unix("/run/nbd.sock").wants_tls());
    }

    #[test]
    fn tcp_tls_endpoint_wants_tls() {
        let endpoint = NbdEndpoint::tcp_tls("example.invalid", 10809);
        assert!(endpoint.wants_tls());
    }

    #[test]
    fn plain_tcp_endpoint_does_not_want_tls() {
        assert!(!NbdEndpoint::tcp("example.invalid", 10809).wants_tls());
    }
}
