//! crates/stream/src/metadata.rs
//!
//! The Meta-frame payload: [`StreamMetadata`].

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{StreamFormatError, StreamResult};
use crate::frame::{write_frame_header, write_term, FrameKind};

/// The payload of the single leading Meta frame.
///
/// All fields are mandatory on write. Unknown keys encountered on read are
/// preserved in [`StreamMetadata::extra`] rather than rejected, so a future
/// version of this crate can add fields without breaking older readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// The full virtual size of the source disk, in bytes.
    pub virtual_size: u64,
    /// The number of bytes actually carried by Data frames in this stream.
    pub data_size: u64,
    /// The hypervisor disk target name (e.g. `vda`).
    pub disk_name: String,
    /// The disk image format (`raw`, `qcow2`, ...).
    pub disk_format: String,
    /// The checkpoint this stream file records, or empty for `copy` mode.
    pub checkpoint_name: String,
    /// The parent checkpoint this stream is relative to, or empty for a
    /// full backup.
    pub parent_checkpoint: String,
    /// The on-disk format version of this crate's stream container.
    pub stream_version: u32,
    /// Whether this stream is an incremental/differential delta rather than
    /// a full copy.
    pub incremental: bool,
    /// Whether Data frame payloads are lz4-compressed.
    pub compressed: bool,
    /// The compression algorithm name, present iff `compressed`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub compression_method: Option<String>,
    /// The compression level used, present iff `compressed`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub compression_level: Option<i32>,
    /// ISO-8601 timestamp of when this stream file was written.
    pub date: String,
    /// Forward-compatibility passthrough for keys this version doesn't know.
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The current stream container format version written by this crate.
pub const STREAM_VERSION: u32 = 1;

impl StreamMetadata {
    /// Serializes `self` to canonical JSON bytes suitable for the Meta
    /// frame payload.
    pub fn to_json_bytes(&self) -> StreamResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(StreamFormatError::InvalidMetadata)
    }

    /// Parses a Meta frame payload.
    pub fn from_json_bytes(bytes: &[u8]) -> StreamResult<Self> {
        serde_json::from_slice(bytes).map_err(StreamFormatError::InvalidMetadata)
    }
}

/// Parses a Meta frame payload. Thin wrapper over
/// [`StreamMetadata::from_json_bytes`] matching the operation name used in
/// the stream codec's public API.
pub fn load_metadata(bytes: &[u8]) -> StreamResult<StreamMetadata> {
    StreamMetadata::from_json_bytes(bytes)
}

/// Writes the complete leading Meta frame — header, JSON payload and
/// [`crate::TERM`] — and returns the total number of bytes written.
pub fn write_metadata<W: Write>(writer: &mut W, metadata: &StreamMetadata) -> io::Result<u64> {
    let payload = metadata
        .to_json_bytes()
        .map_err(|err| io::Error::other(err.to_string()))?;
    write_frame_header(writer, FrameKind::Meta, 0, payload.len() as u64)?;
    writer.write_all(&payload)?;
    write_term(writer)?;

    Ok(crate::frame::HEADER_LEN as u64 + payload.len() as u64 + crate::frame::TERM.len() as u64)
}
