//! crates/nbd_transport/src/handshake.rs
//!
//! The fixed-newstyle handshake and option-haggling phase: negotiates the
//! export's size and transmission flags via `NBD_OPT_GO`, and any requested
//! metadata contexts via `NBD_OPT_SET_META_CONTEXT`.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use crate::error::{TransportError, TransportResult};
use crate::proto::*;

/// What the handshake negotiated: the export's size, its transmission
/// flags, and the server-assigned id of each metadata context the caller
/// requested (and the server granted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedExport {
    /// The export's size in bytes.
    pub size: u64,
    /// The `NBD_FLAG_*` transmission flags the server advertised.
    pub transmission_flags: u16,
    /// Metadata context name -> server-assigned context id, for every
    /// context the caller requested that the server actually granted.
    pub meta_context_ids: HashMap<String, u32>,
}

impl NegotiatedExport {
    /// Whether the server advertised `NBD_CMD_BLOCK_STATUS` support.
    #[must_use]
    pub const fn supports_block_status(&self) -> bool {
        self.transmission_flags & NBD_FLAG_SEND_BLOCK_STATUS != 0
    }
}

fn read_u16(r: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

fn send_option(stream: &mut impl Write, option: u32, data: &[u8]) -> io::Result<()> {
    stream.write_all(&IHAVEOPT.to_be_bytes())?;
    stream.write_all(&option.to_be_bytes())?;
    stream.write_all(&(data.len() as u32).to_be_bytes())?;
    stream.write_all(data)
}

struct OptionReplyHeader {
    option: u32,
    reply_type: u32,
    length: u32,
}

fn read_option_reply_header(stream: &mut impl Read) -> TransportResult<OptionReplyHeader> {
    let magic = read_u64(stream)?;
    if magic != OPTION_REPLY_MAGIC {
        return Err(TransportError::Protocol(format!("bad option reply magic {magic:#x}")));
    }
    let option = read_u32(stream)?;
    let reply_type = read_u32(stream)?;
    let length = read_u32(stream)?;
    Ok(OptionReplyHeader { option, reply_type, length })
}

fn skip(stream: &mut impl Read, len: u32) -> io::Result<()> {
    let mut remaining = u64::from(len);
    let mut buf = [0u8; 256];
    while remaining > 0 {
        let take = remaining.min(buf.len() as u64) as usize;
        stream.read_exact(&mut buf[..take])?;
        remaining -= take as u64;
    }
    Ok(())
}

/// Performs the magic exchange, sends the client handshake flags, then
/// negotiates `meta_contexts` (if any) followed by `NBD_OPT_GO` for
/// `export_name`.
pub fn negotiate<S: Read + Write>(
    stream: &mut S,
    export_name: &str,
    meta_contexts: &[&str],
) -> TransportResult<NegotiatedExport> {
    let handshake_flags = read_server_preamble(stream)?;
    send_client_flags(stream, handshake_flags)?;
    negotiate_after_flags(stream, export_name, meta_contexts)
}

/// Reads the server's initial magic pair and handshake flags. The first
/// step of every connection, TLS or not.
pub fn read_server_preamble<S: Read>(stream: &mut S) -> TransportResult<u16> {
    let server_magic = read_u64(stream)?;
    if server_magic != NBDMAGIC {
        return Err(TransportError::Protocol(format!("bad server magic {server_magic:#x}")));
    }
    let opt_magic = read_u64(stream)?;
    if opt_magic != IHAVEOPT {
        return Err(TransportError::Protocol(format!("bad IHAVEOPT magic {opt_magic:#x}")));
    }
    let handshake_flags = read_u16(stream)?;
    if handshake_flags & NBD_FLAG_FIXED_NEWSTYLE == 0 {
        return Err(TransportError::Protocol(
            "server does not support fixed newstyle negotiation".to_string(),
        ));
    }
    Ok(handshake_flags)
}

/// Sends the client's handshake flags in reply to `handshake_flags`.
pub fn send_client_flags<S: Write>(stream: &mut S, handshake_flags: u16) -> TransportResult<()> {
    let mut client_flags = NBD_FLAG_C_FIXED_NEWSTYLE;
    if handshake_flags & NBD_FLAG_NO_ZEROES != 0 {
        client_flags |= NBD_FLAG_C_NO_ZEROES;
    }
    stream.write_all(&client_flags.to_be_bytes())?;
    Ok(())
}

/// Negotiates metadata contexts (if any) and `NBD_OPT_GO`, assuming the
/// magic exchange and client flags have already been sent — either in
/// plaintext via [`read_server_preamble`]/[`send_client_flags`], or, for a
/// TLS endpoint, after the `NBD_OPT_STARTTLS` upgrade has completed and
/// `stream` is now the TLS-wrapped connection.
pub fn negotiate_after_flags<S: Read + Write>(
    stream: &mut S,
    export_name: &str,
    meta_contexts: &[&str],
) -> TransportResult<NegotiatedExport> {
    let meta_context_ids = if meta_contexts.is_empty() {
        HashMap::new()
    } else {
        negotiate_meta_contexts(stream, export_name, meta_contexts)?
    };

    let (size, transmission_flags) = negotiate_go(stream, export_name)?;

    Ok(NegotiatedExport { size, transmission_flags, meta_context_ids })
}

/// Sends `NBD_OPT_STARTTLS` and waits for the server's ack. On success the
/// caller should immediately perform the TLS client handshake over the
/// same underlying socket and continue with [`negotiate_after_flags`] over
/// the TLS-wrapped stream.
pub fn negotiate_starttls<S: Read + Write>(stream: &mut S) -> TransportResult<()> {
    send_option(stream, NBD_OPT_STARTTLS, &[])?;
    let reply = read_option_reply_header(stream)?;
    if reply.option != NBD_OPT_STARTTLS {
        return Err(TransportError::Protocol(format!(
            "unexpected option {:#x} in STARTTLS reply",
            reply.option
        )));
    }
    if reply.reply_type & NBD_REP_FLAG_ERROR != 0 {
        skip(stream, reply.length)?;
        return Err(TransportError::Protocol("server rejected STARTTLS".to_string()));
    }
    if reply.reply_type != NBD_REP_ACK {
        return Err(TransportError::Protocol(format!("unexpected STARTTLS reply type {:#x}", reply.reply_type)));
    }
    skip(stream, reply.length)?;
    Ok(())
}

fn negotiate_meta_contexts<S: Read + Write>(
    stream: &mut S,
    export_name: &str,
    meta_contexts: &[&str],
) -> TransportResult<HashMap<String, u32>> {
    let mut data = Vec::new();
    data.extend_from_slice(&(export_name.len() as u32).to_be_bytes());
    data.extend_from_slice(export_name.as_bytes());
    data.extend_from_slice(&(meta_contexts.len() as u32).to_be_bytes());
    for context in meta_contexts {
        data.extend_from_slice(&(context.len() as u32).to_be_bytes());
        data.extend_from_slice(context.as_bytes());
    }
    send_option(stream, NBD_OPT_SET_META_CONTEXT, &data)?;

    let mut granted = HashMap::new();
    loop {
        let reply = read_option_reply_header(stream)?;
        if reply.option != NBD_OPT_SET_META_CONTEXT {
            return Err(TransportError::Protocol(format!(
                "unexpected option {:#x} in SET_META_CONTEXT reply stream",
                reply.option
            )));
        }
        if reply.reply_type & NBD_REP_FLAG_ERROR != 0 {
            skip(stream, reply.length)?;
            let first = meta_contexts.first().copied().unwrap_or_default();
            return Err(TransportError::MetaContextUnavailable { context: first.to_string() });
        }
        match reply.reply_type {
            NBD_REP_META_CONTEXT => {
                let id = read_u32(stream)?;
                let name_len = reply.length.saturating_sub(4);
                let mut name_buf = vec![0u8; name_len as usize];
                stream.read_exact(&mut name_buf)?;
                let name = String::from_utf8(name_buf)
                    .map_err(|_| TransportError::Protocol("non-UTF-8 meta context name".to_string()))?;
                granted.insert(name, id);
            }
            NBD_REP_ACK => {
                skip(stream, reply.length)?;
                break;
            }
            other => return Err(TransportError::Protocol(format!("unexpected reply type {other:#x}"))),
        }
    }

    for requested in meta_contexts {
        if !granted.contains_key(*requested) {
            return Err(TransportError::MetaContextUnavailable { context: (*requested).to_string() });
        }
    }

    Ok(granted)
}

fn negotiate_go<S: Read + Write>(stream: &mut S, export_name: &str) -> TransportResult<(u64, u16)> {
    let mut data = Vec::new();
    data.extend_from_slice(&(export_name.len() as u32).to_be_bytes());
    data.extend_from_slice(export_name.as_bytes());
    data.extend_from_slice(&0u16.to_be_bytes()); // zero information requests: server sends NBD_INFO_EXPORT by default
    send_option(stream, NBD_OPT_GO, &data)?;

    let mut size = None;
    let mut transmission_flags = None;

    loop {
        let reply = read_option_reply_header(stream)?;
        if reply.option != NBD_OPT_GO {
            return Err(TransportError::Protocol(format!(
                "unexpected option {:#x} in GO reply stream",
                reply.option
            )));
        }
        if reply.reply_type & NBD_REP_FLAG_ERROR != 0 {
            skip(stream, reply.length)?;
            return Err(TransportError::ExportRejected {
                export: export_name.to_string(),
                code: reply.reply_type,
            });
        }
        match reply.reply_type {
            NBD_REP_INFO => {
                let info_type = read_u16(stream)?;
                if info_type == NBD_INFO_EXPORT {
                    size = Some(read_u64(stream)?);
                    transmission_flags = Some(read_u16(stream)?);
                } else {
                    skip(stream, reply.length.saturating_sub(2))?;
                }
            }
            NBD_REP_ACK => {
                skip(stream, reply.length)?;
                break;
            }
            other => return Err(TransportError::Protocol(format!("unexpected reply type {other:#x}"))),
        }
    }

    let size = size.ok_or_else(|| TransportError::Protocol("server never sent NBD_INFO_EXPORT".to_string()))?;
    let transmission_flags =
        transmission_flags.ok_or_else(|| TransportError::Protocol("server never sent transmission flags".to_string()))?;

    Ok((size, transmission_flags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;
    use std::thread;

    fn write_server_handshake_prelude(stream: &mut UnixStream) {
        stream.write_all(&NBDMAGIC.to_be_bytes()).unwrap();
        stream.write_all(&IHAVEOPT.to_be_bytes()).unwrap();
        stream
            .write_all(&(NBD_FLAG_FIXED_NEWSTYLE | NBD_FLAG_NO_ZEROES).to_be_bytes())
            .unwrap();
    }

    fn read_option_request(stream: &mut UnixStream) -> (u32, Vec<u8>) {
        let magic = read_u64(stream).unwrap();
        assert_eq!(magic, IHAVEOPT);
        let option = read_u32(stream).unwrap();
        let len = read_u32(stream).unwrap();
        let mut data = vec![0u8; len as usize];
        stream.read_exact(&mut data).unwrap();
        (option, data)
    }

    fn write_go_ack(stream: &mut UnixStream, size: u64, flags: u16) {
        let mut info = Vec::new();
        info.extend_from_slice(&NBD_INFO_EXPORT.to_be_bytes());
        info.extend_from_slice(&size.to_be_bytes());
        info.extend_from_slice(&flags.to_be_bytes());
        stream.write_all(&OPTION_REPLY_MAGIC.to_be_bytes()).unwrap();
        stream.write_all(&NBD_OPT_GO.to_be_bytes()).unwrap();
        stream.write_all(&NBD_REP_INFO.to_be_bytes()).unwrap();
        stream.write_all(&(info.len() as u32).to_be_bytes()).unwrap();
        stream.write_all(&info).unwrap();

        stream.write_all(&OPTION_REPLY_MAGIC.to_be_bytes()).unwrap();
        stream.write_all(&NBD_OPT_GO.to_be_bytes()).unwrap();
        stream.write_all(&NBD_REP_ACK.to_be_bytes()).unwrap();
        stream.write_all(&0u32.to_be_bytes()).unwrap();
    }

    #[test]
    fn negotiates_export_size_and_flags_over_a_loopback_socket() {
        let (mut client, mut server) = UnixStream::pair().unwrap();

        let server_thread = thread::spawn(move || {
            write_server_handshake_prelude(&mut server);
            let mut client_flags = [0u8; 4];
            server.read_exact(&mut client_flags).unwrap();

            let (option, _data) = read_option_request(&mut server);
            assert_eq!(option, NBD_OPT_GO);
            write_go_ack(&mut server, 64 * 1024 * 1024, NBD_FLAG_SEND_BLOCK_STATUS);
        });

        let negotiated = negotiate(&mut client, "vda", &[]).unwrap();
        server_thread.join().unwrap();

        assert_eq!(negotiated.size, 64 * 1024 * 1024);
        assert!(negotiated.supports_block_status());
        assert!(negotiated.meta_context_ids.is_empty());
    }

    #[test]
    fn rejects_a_server_without_fixed_newstyle() {
        let (mut client, mut server) = UnixStream::pair().unwrap();
        let server_thread = thread::spawn(move || {
            server.write_all(&NBDMAGIC.to_be_bytes()).unwrap();
            server.write_all(&IHAVEOPT.to_be_bytes()).unwrap();
            server.write_all(&0u16.to_be_bytes()).unwrap();
        });

        let err = negotiate(&mut client, "vda", &[]).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
        server_thread.join().unwrap();
    }

    #[test]
    fn meta_context_negotiation_populates_ids() {
        let (mut client, mut server) = UnixStream::pair().unwrap();
        let server_thread = thread::spawn(move || {
            write_server_handshake_prelude(&mut server);
            let mut client_flags = [0u8; 4];
            server.read_exact(&mut client_flags).unwrap();

            let (option, _data) = read_option_request(&mut server);
            assert_eq!(option, NBD_OPT_SET_META_CONTEXT);

            let context_name = b"qemu:dirty-bitmap:cpt1";
            let mut payload = Vec::new();
            payload.extend_from_slice(&7u32.to_be_bytes());
            payload.extend_from_slice(context_name);
            server.write_all(&OPTION_REPLY_MAGIC.to_be_bytes()).unwrap();
            server.write_all(&NBD_OPT_SET_META_CONTEXT.to_be_bytes()).unwrap();
            server.write_all(&NBD_REP_META_CONTEXT.to_be_bytes()).unwrap();
            server.write_all(&(payload.len() as u32).to_be_bytes()).unwrap();
            server.write_all(&payload).unwrap();

            server.write_all(&OPTION_REPLY_MAGIC.to_be_bytes()).unwrap();
            server.write_all(&NBD_OPT_SET_META_CONTEXT.to_be_bytes()).unwrap();
            server.write_all(&NBD_REP_ACK.to_be_bytes()).unwrap();
            server.write_all(&0u32.to_be_bytes()).unwrap();

            let (option, _data) = read_option_request(&mut server);
            assert_eq!(option, NBD_OPT_GO);
            write_go_ack(&mut server, 4096, NBD_FLAG_SEND_BLOCK_STATUS);
        });

        let negotiated = negotiate(&mut client, "vda", &["qemu:dirty-bitmap:cpt1"]).unwrap();
        server_thread.join().unwrap();

        assert_eq!(negotiated.meta_context_ids.get("qemu:dirty-bitmap:cpt1"), Some(&7));
    }

    #[test]
    fn unmet_meta_context_request_is_unavailable() {
        let (mut client, mut server) = UnixStream::pair().unwrap();
        let server_thread = thread::spawn(move || {
            write_server_handshake_prelude(&mut server);
            let mut client_flags = [0u8; 4];
            server.read_exact(&mut client_flags).unwrap();

            let (option, _data) = read_option_request(&mut server);
            assert_eq!(option, NBD_OPT_SET_META_CONTEXT);
            // no NBD_REP_META_CONTEXT chunks granted, straight to ack
            server.write_all(&OPTION_REPLY_MAGIC.to_be_bytes()).unwrap();
            server.write_all(&NBD_OPT_SET_META_CONTEXT.to_be_bytes()).unwrap();
            server.write_all(&NBD_REP_ACK.to_be_bytes()).unwrap();
            server.write_all(&0u32.to_be_bytes()).unwrap();
        });

        let err = negotiate(&mut client, "vda", &["qemu:dirty-bitmap:missing"]).unwrap_err();
        server_thread.join().unwrap();
        assert!(matches!(err, TransportError::MetaContextUnavailable { .. }));
    }
}
