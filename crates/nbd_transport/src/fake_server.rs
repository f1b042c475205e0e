//! crates/nbd_transport/src/fake_server.rs
//!
//! [`FakeNbdServer`]: an in-process NBD server backing an in-memory byte
//! buffer, standing in for `qemu-nbd` in integration tests that exercise
//! [`crate::connect`] end-to-end. Serves exactly one connection, the
//! fixed-newstyle handshake followed by `READ`/`WRITE`/`BLOCK_STATUS`/
//! `DISC`, generalized from the hand-rolled servers in this crate's own
//! `handshake`/`transport` test modules.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::proto::*;

/// One `[offset, length)` region of a configured metadata context, with
/// that context's raw `BLOCK_STATUS` flags for the region.
#[derive(Debug, Clone, Copy)]
pub struct FakeStatusRegion {
    /// Length of the region in bytes.
    pub length: u64,
    /// Raw status flags; interpretation is context-specific (see
    /// `extents::nbd_query::interpret_flags`).
    pub flags: u32,
}

struct ExportState {
    data: Mutex<Vec<u8>>,
    contexts: HashMap<String, Vec<FakeStatusRegion>>,
}

/// An in-process NBD server for a single export. Accepts and serves
/// exactly one connection on a background thread, then exits.
pub struct FakeNbdServer {
    state: Arc<ExportState>,
    handle: Option<JoinHandle<()>>,
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

fn write_u16(w: &mut impl Write, v: u16) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

fn write_u32(w: &mut impl Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

fn write_u64(w: &mut impl Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

struct OptionRequest {
    option: u32,
    data: Vec<u8>,
}

fn read_option_request(stream: &mut impl Read) -> io::Result<OptionRequest> {
    let magic = read_u64(stream)?;
    if magic != IHAVEOPT {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad option request magic"));
    }
    let option = read_u32(stream)?;
    let len = read_u32(stream)?;
    let mut data = vec![0u8; len as usize];
    stream.read_exact(&mut data)?;
    Ok(OptionRequest { option, data })
}

fn write_option_reply(stream: &mut impl Write, option: u32, reply_type: u32, payload: &[u8]) -> io::Result<()> {
    write_u64(stream, OPTION_REPLY_MAGIC)?;
    write_u32(stream, option)?;
    write_u32(stream, reply_type)?;
    write_u32(stream, payload.len() as u32)?;
    stream.write_all(payload)
}

/// Replies to `NBD_OPT_GO` with the export's current size and
/// `NBD_FLAG_SEND_BLOCK_STATUS`, ignoring the client's information
/// request list (this fake always sends `NBD_INFO_EXPORT`).
fn handle_go(stream: &mut (impl Read + Write), data: &[u8], state: &ExportState) -> io::Result<()> {
    let name_len = u32::from_be_bytes(data[0..4].try_into().unwrap()) as usize;
    let _export_name = &data[4..4 + name_len];

    let size = state.data.lock().unwrap().len() as u64;
    let mut info = Vec::new();
    info.extend_from_slice(&NBD_INFO_EXPORT.to_be_bytes());
    info.extend_from_slice(&size.to_be_bytes());
    info.extend_from_slice(&NBD_FLAG_SEND_BLOCK_STATUS.to_be_bytes());
    write_option_reply(stream, NBD_OPT_GO, NBD_REP_INFO, &info)?;
    write_option_reply(stream, NBD_OPT_GO, NBD_REP_ACK, &[])
}

/// Grants every requested context this server was configured with,
/// rejecting (by omission) any it was not, and returns the assigned ids.
fn handle_set_meta_context(stream: &mut (impl Read + Write), data: &[u8], state: &ExportState) -> io::Result<HashMap<u32, String>> {
    let mut pos = 0usize;
    let name_len = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
    pos += 4 + name_len;
    let count = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap());
    pos += 4;

    let mut granted = HashMap::new();
    let mut next_id = 1u32;
    for _ in 0..count {
        let len = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        let name = String::from_utf8_lossy(&data[pos..pos + len]).into_owned();
        pos += len;

        if state.contexts.contains_key(&name) {
            let id = next_id;
            next_id += 1;
            let mut payload = Vec::new();
            payload.extend_from_slice(&id.to_be_bytes());
            payload.extend_from_slice(name.as_bytes());
            write_option_reply(stream, NBD_OPT_SET_META_CONTEXT, NBD_REP_META_CONTEXT, &payload)?;
            granted.insert(id, name);
        }
    }
    write_option_reply(stream, NBD_OPT_SET_META_CONTEXT, NBD_REP_ACK, &[])?;
    Ok(granted)
}

/// Slices `regions` (a contiguous cover of the export starting at 0) down
/// to the part overlapping `[offset, offset+length)`, clipping lengths at
/// the boundary.
fn regions_in_range(regions: &[FakeStatusRegion], offset: u64, length: u32) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    let end = offset + u64::from(length);
    let mut cursor = 0u64;
    for region in regions {
        let region_start = cursor;
        let region_end = cursor + region.length;
        cursor = region_end;
        if region_end <= offset || region_start >= end {
            continue;
        }
        let clipped_start = region_start.max(offset);
        let clipped_end = region_end.min(end);
        out.push(((clipped_end - clipped_start) as u32, region.flags));
    }
    out
}

fn serve_block_status(stream: &mut (impl Read + Write), cookie: u64, offset: u64, length: u32, state: &ExportState, context_ids: &HashMap<u32, String>) -> io::Result<()> {
    let mut ids: Vec<(u32, &str)> = context_ids.iter().map(|(id, name)| (*id, name.as_str())).collect();
    ids.sort_by_key(|(id, _)| *id);

    if ids.is_empty() {
        write_u32(stream, NBD_STRUCTURED_REPLY_MAGIC)?;
        write_u16(stream, NBD_REPLY_FLAG_DONE)?;
        write_u16(stream, NBD_REPLY_TYPE_NONE)?;
        write_u64(stream, cookie)?;
        write_u32(stream, 0)?;
        return Ok(());
    }

    for (index, (id, name)) in ids.iter().enumerate() {
        let regions = state.contexts.get(*name).map(Vec::as_slice).unwrap_or(&[]);
        let slices = regions_in_range(regions, offset, length);
        let mut payload = Vec::new();
        payload.extend_from_slice(&id.to_be_bytes());
        for (len, flags) in &slices {
            payload.extend_from_slice(&len.to_be_bytes());
            payload.extend_from_slice(&flags.to_be_bytes());
        }
        let done = index + 1 == ids.len();
        write_u32(stream, NBD_STRUCTURED_REPLY_MAGIC)?;
        write_u16(stream, if done { NBD_REPLY_FLAG_DONE } else { 0 })?;
        write_u16(stream, NBD_REPLY_TYPE_BLOCK_STATUS)?;
        write_u64(stream, cookie)?;
        write_u32(stream, payload.len() as u32)?;
        stream.write_all(&payload)?;
    }
    Ok(())
}

fn serve_transmission(stream: &mut (impl Read + Write), state: &ExportState, context_ids: &HashMap<u32, String>) -> io::Result<()> {
    loop {
        let magic = read_u32(stream)?;
        if magic != NBD_REQUEST_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad request magic"));
        }
        let _flags = read_u16(stream)?;
        let cmd = read_u16(stream)?;
        let cookie = read_u64(stream)?;
        let offset = read_u64(stream)?;
        let length = read_u32(stream)?;

        match cmd {
            NBD_CMD_READ => {
                let buffer = state.data.lock().unwrap();
                let start = offset as usize;
                let end = (start + length as usize).min(buffer.len());
                let mut payload = vec![0u8; length as usize];
                if start < buffer.len() {
                    payload[..end - start].copy_from_slice(&buffer[start..end]);
                }
                drop(buffer);
                write_u32(stream, NBD_SIMPLE_REPLY_MAGIC)?;
                write_u32(stream, 0)?;
                write_u64(stream, cookie)?;
                stream.write_all(&payload)?;
            }
            NBD_CMD_WRITE => {
                let mut payload = vec![0u8; length as usize];
                stream.read_exact(&mut payload)?;
                let mut buffer = state.data.lock().unwrap();
                let start = offset as usize;
                let end = start + payload.len();
                if end > buffer.len() {
                    buffer.resize(end, 0);
                }
                buffer[start..end].copy_from_slice(&payload);
                drop(buffer);
                write_u32(stream, NBD_SIMPLE_REPLY_MAGIC)?;
                write_u32(stream, 0)?;
                write_u64(stream, cookie)?;
            }
            NBD_CMD_BLOCK_STATUS => serve_block_status(stream, cookie, offset, length, state, context_ids)?,
            NBD_CMD_DISC => return Ok(()),
            other => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unsupported command {other}"))),
        }
    }
}

fn serve_one<S: Read + Write>(mut stream: S, state: &Arc<ExportState>) {
    let _ = (|| -> io::Result<()> {
        write_u64(&mut stream, NBDMAGIC)?;
        write_u64(&mut stream, IHAVEOPT)?;
        write_u16(&mut stream, NBD_FLAG_FIXED_NEWSTYLE | NBD_FLAG_NO_ZEROES)?;

        let mut client_flags = [0u8; 4];
        stream.read_exact(&mut client_flags)?;

        let mut context_ids = HashMap::new();
        loop {
            let request = read_option_request(&mut stream)?;
            match request.option {
                NBD_OPT_SET_META_CONTEXT => {
                    context_ids = handle_set_meta_context(&mut stream, &request.data, state)?;
                }
                NBD_OPT_GO => {
                    handle_go(&mut stream, &request.data, state)?;
                    break;
                }
                _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "unexpected option before GO")),
            }
        }

        serve_transmission(&mut stream, state, &context_ids)
    })();
}

impl FakeNbdServer {
    /// Starts a server listening on a local Unix socket at `socket_path`,
    /// backed by `data`, reporting `contexts` for any `BLOCK_STATUS`
    /// query naming one of them. Replaces any file already at
    /// `socket_path`.
    pub fn start_unix(socket_path: impl Into<PathBuf>, data: Vec<u8>, contexts: HashMap<String, Vec<FakeStatusRegion>>) -> io::Result<Self> {
        let socket_path = socket_path.into();
        let _ = std::fs::remove_file(&socket_path);
        let listener = UnixListener::bind(&socket_path)?;
        let state = Arc::new(ExportState { data: Mutex::new(data), contexts });
        let thread_state = Arc::clone(&state);
        let handle = thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                serve_one(stream, &thread_state);
            }
        });
        Ok(Self { state, handle: Some(handle) })
    }

    /// Starts a server listening on `127.0.0.1:port`, for a remote-style
    /// transport test.
    pub fn start_tcp(port: u16, data: Vec<u8>, contexts: HashMap<String, Vec<FakeStatusRegion>>) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        let state = Arc::new(ExportState { data: Mutex::new(data), contexts });
        let thread_state = Arc::clone(&state);
        let handle = thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let _ = stream.set_nodelay(true);
                serve_one(stream, &thread_state);
            }
        });
        Ok(Self { state, handle: Some(handle) })
    }

    /// Blocks until the served connection disconnects.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// A snapshot of the export's current backing bytes, for asserting
    /// what a run wrote to (or read from) this server.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.state.data.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect, NbdEndpoint};

    #[test]
    fn serves_a_read_over_a_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("vda.sock");
        let data = vec![0xABu8; 8192];
        let server = FakeNbdServer::start_unix(&socket_path, data.clone(), HashMap::new()).unwrap();

        let endpoint = NbdEndpoint::unix(&socket_path);
        let mut transport = connect(&endpoint, "vda", &[]).unwrap();
        let block = transport.pread(0, 4096).unwrap();
        assert_eq!(block, data[0..4096]);
        transport.disconnect().unwrap();
        server.join();
    }

    #[test]
    fn write_then_read_round_trips_over_the_fake_server() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("vda.sock");
        let server = FakeNbdServer::start_unix(&socket_path, vec![0u8; 4096], HashMap::new()).unwrap();

        let endpoint = NbdEndpoint::unix(&socket_path);
        let mut transport = connect(&endpoint, "vda", &[]).unwrap();
        transport.pwrite(&[0x42u8; 512], 0).unwrap();
        let block = transport.pread(0, 512).unwrap();
        assert_eq!(block, vec![0x42u8; 512]);
        transport.disconnect().unwrap();
        server.join();

        // start_unix already consumed `server`'s handle via join(); rebind
        // a fresh server to confirm the snapshot helper itself works.
        let server = FakeNbdServer::start_unix(dir.path().join("vdb.sock"), vec![7u8; 16], HashMap::new()).unwrap();
        assert_eq!(server.snapshot(), vec![7u8; 16]);
    }

    #[test]
    fn block_status_reports_the_configured_dirty_region() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("vda.sock");
        let mut contexts = HashMap::new();
        contexts.insert(
            "qemu:dirty-bitmap:cpt1".to_string(),
            vec![
                FakeStatusRegion { length: 4096, flags: 0 },
                FakeStatusRegion { length: 4096, flags: 1 },
            ],
        );
        let server = FakeNbdServer::start_unix(&socket_path, vec![0u8; 8192], contexts).unwrap();

        let endpoint = NbdEndpoint::unix(&socket_path);
        let mut transport = connect(&endpoint, "vda", &["qemu:dirty-bitmap:cpt1"]).unwrap();
        let descriptors = transport.block_status("qemu:dirty-bitmap:cpt1", 0, 8192).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].length, 4096);
        assert_eq!(descriptors[0].flags, 0);
        assert_eq!(descriptors[1].flags, 1);
        transport.disconnect().unwrap();
        server.join();
    }
}
