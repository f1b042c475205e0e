//! crates/nbd_transport/src/connect.rs
//!
//! Dials an [`NbdEndpoint`], runs the handshake, and returns a ready
//! [`NbdTransport`].

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use crate::endpoint::NbdEndpoint;
use crate::error::{TransportError, TransportResult};
use crate::handshake::negotiate;
use crate::transport::NbdTransport;

/// Any full-duplex byte stream this crate can run the NBD protocol over.
pub trait Stream: Read + Write + Send {}
impl<T: Read + Write + Send> Stream for T {}

fn tcp_connect(host: &str, port: u16) -> TransportResult<std::net::TcpStream> {
    use socket2::{Domain, Socket, Type};
    use std::net::{SocketAddr, ToSocketAddrs};

    let addr: SocketAddr = (host, port)
        .to_socket_addrs()
        .map_err(TransportError::Io)?
        .next()
        .ok_or_else(|| TransportError::Protocol(format!("could not resolve {host}:{port}")))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None).map_err(TransportError::Io)?;
    socket.set_nodelay(true).map_err(TransportError::Io)?;
    socket.connect(&addr.into()).map_err(TransportError::Io)?;
    Ok(socket.into())
}

/// Dials `endpoint` and negotiates `export_name`/`meta_contexts`. TLS
/// endpoints require the `tls` feature and [`connect_tls`].
pub fn connect(
    endpoint: &NbdEndpoint,
    export_name: &str,
    meta_contexts: &[&str],
) -> TransportResult<NbdTransport<Box<dyn Stream>>> {
    if endpoint.wants_tls() {
        return Err(TransportError::Protocol(
            "endpoint requests TLS; use nbd_transport::connect_tls".to_string(),
        ));
    }

    let mut stream: Box<dyn Stream> = match endpoint {
        NbdEndpoint::Unix(path) => Box::new(UnixStream::connect(path).map_err(TransportError::Io)?),
        NbdEndpoint::Tcp { host, port, .. } => Box::new(tcp_connect(host, *port)?),
    };

    let negotiated = negotiate(&mut stream, export_name, meta_contexts)?;
    Ok(NbdTransport::new(stream, negotiated))
}

#[cfg(feature = "tls")]
pub use tls::connect_tls;

#[cfg(feature = "tls")]
mod tls {
    use std::sync::Arc;

    use super::{tcp_connect, NbdEndpoint, Stream, TransportError, TransportResult};
    use crate::handshake::{negotiate_after_flags, negotiate_starttls, read_server_preamble, send_client_flags};
    use crate::transport::NbdTransport;

    /// Dials a TLS [`NbdEndpoint::Tcp`] endpoint, performing
    /// `NBD_OPT_STARTTLS` before continuing the handshake inside the TLS
    /// session. The caller supplies `tls_config` (trust roots, client
    /// certificates, ...); this crate does not pick defaults for trust.
    pub fn connect_tls(
        endpoint: &NbdEndpoint,
        export_name: &str,
        meta_contexts: &[&str],
        tls_config: Arc<rustls::ClientConfig>,
    ) -> TransportResult<NbdTransport<Box<dyn Stream>>> {
        let NbdEndpoint::Tcp { host, port, tls } = endpoint else {
            return Err(TransportError::Protocol("connect_tls requires a Tcp endpoint".to_string()));
        };
        if !tls {
            return Err(TransportError::Protocol("endpoint does not request TLS".to_string()));
        }

        let mut tcp = tcp_connect(host, *port)?;
        let handshake_flags = read_server_preamble(&mut tcp)?;
        send_client_flags(&mut tcp, handshake_flags)?;
        negotiate_starttls(&mut tcp)?;

        let server_name = rustls::pki_types::ServerName::try_from(host.clone())
            .map_err(|err| TransportError::Tls(err.to_string()))?;
        let client_connection =
            rustls::ClientConnection::new(tls_config, server_name).map_err(|err| TransportError::Tls(err.to_string()))?;
        let mut tls_stream = rustls::StreamOwned::new(client_connection, tcp);

        let negotiated = negotiate_after_flags(&mut tls_stream, export_name, meta_contexts)?;
        Ok(NbdTransport::new(Box::new(tls_stream), negotiated))
    }
}
