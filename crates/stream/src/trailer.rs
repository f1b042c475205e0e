//! crates/stream/src/trailer.rs
//!
//! The JSON compression trailer appended after the Stop frame when
//! `metadata.compressed` is true.

use std::io::{self, Read, Seek, SeekFrom, Write};

use serde::{Deserialize, Serialize};

use crate::error::{StreamFormatError, StreamResult};

/// The trailer entry recorded for one Data frame.
///
/// An unsplit Data frame (the extent fit within `max_request_size`) records
/// a single compressed length. A Data frame whose extent was split into
/// multiple `max_request_size` chunks records the compressed length of
/// every sub-chunk, in order, so restore can reverse the split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkSizes {
    /// The compressed length of a single, unsplit Data frame payload.
    Single(u64),
    /// The compressed length of every sub-chunk of a split Data frame.
    Chunked {
        /// Compressed length of each sub-chunk, in write order.
        compressed_len: Vec<u64>,
    },
}

impl ChunkSizes {
    /// The sum of every compressed length this entry records.
    #[must_use]
    pub fn total(&self) -> u64 {
        match self {
            Self::Single(len) => *len,
            Self::Chunked { compressed_len } => compressed_len.iter().sum(),
        }
    }
}

/// Appends the JSON compression trailer. Must be called exactly once, after
/// the Stop frame has been written.
pub fn write_compression_trailer<W: Write>(writer: &mut W, sizes: &[ChunkSizes]) -> io::Result<()> {
    let bytes = serde_json::to_vec(sizes).map_err(io::Error::other)?;
    writer.write_all(&bytes)
}

/// Reads the compression trailer starting at the reader's current position
/// (immediately after the Stop frame) through to the end of the stream.
pub fn read_compression_trailer<R: Read + Seek>(reader: &mut R) -> StreamResult<Vec<ChunkSizes>> {
    let start = reader.stream_position()?;
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(start))?;

    let remaining = usize::try_from(end.saturating_sub(start)).unwrap_or(usize::MAX);
    let mut buf = vec![0u8; remaining];
    reader.read_exact(&mut buf)?;

    serde_json::from_slice(&buf).map_err(StreamFormatError::InvalidTrailer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_single_and_chunked_entries() {
        let sizes = vec![
            ChunkSizes::Single(128),
            ChunkSizes::Chunked {
                compressed_len: vec![4096, 4096, 2048],
            },
        ];

        let mut buf = Vec::new();
        write_compression_trailer(&mut buf, &sizes).unwrap();

        let mut cursor = Cursor::new(buf);
        let parsed = read_compression_trailer(&mut cursor).unwrap();
        assert_eq!(parsed, sizes);
    }

    #[test]
    fn total_sums_chunked_entries() {
        let entry = ChunkSizes::Chunked {
            compressed_len: vec![10, 20, 30],
        };
        assert_eq!(entry.total(), 60);
    }

    #[test]
    fn reads_trailer_after_advancing_past_preceding_bytes() {
        let sizes = vec![ChunkSizes::Single(42)];
        let mut buf = b"some preceding frame bytes".to_vec();
        let prefix_len = buf.len();
        write_compression_trailer(&mut buf, &sizes).unwrap();

        let mut cursor = Cursor::new(buf);
        cursor.seek(SeekFrom::Start(prefix_len as u64)).unwrap();
        let parsed = read_compression_trailer(&mut cursor).unwrap();
        assert_eq!(parsed, sizes);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut cursor = Cursor::new(b"not json".to_vec());
        let err = read_compression_trailer(&mut cursor).unwrap_err();
        assert!(matches!(err, StreamFormatError::InvalidTrailer(_)));
    }
}
