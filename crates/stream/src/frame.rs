//! crates/stream/src/frame.rs
//!
//! The fixed frame header layout and the `TERM` payload marker.
//!
//! A frame header is 42 bytes: an 8-byte ASCII tag identifying [`FrameKind`],
//! a 16-hex-digit big-endian `start` field, a `\n` delimiter, a 16-hex-digit
//! big-endian `length` field, and a trailing `\n`. Data and Meta frames are
//! followed by `length` payload bytes and then the 6-byte `TERM` marker.

use std::io::{self, Read, Write};

use crate::error::{StreamFormatError, StreamResult};

/// The marker written after every Data and Meta frame's payload.
pub const TERM: &[u8; 6] = b"\0TERM\0";

const TAG_LEN: usize = 8;
const HEX_FIELD_LEN: usize = 16;
pub(crate) const HEADER_LEN: usize = TAG_LEN + HEX_FIELD_LEN + 1 + HEX_FIELD_LEN + 1;

/// The kind of one frame in the stream container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// The single leading frame carrying [`crate::StreamMetadata`] as JSON.
    Meta,
    /// A frame carrying `length` bytes of (optionally compressed) disk data.
    Data,
    /// A frame marking `[start, start + length)` as a hole; carries no payload.
    Zero,
    /// The single trailing frame terminating the stream.
    Stop,
}

impl FrameKind {
    const fn tag(self) -> &'static [u8; TAG_LEN] {
        match self {
            Self::Meta => b"META\0\0\0\0",
            Self::Data => b"DATA\0\0\0\0",
            Self::Zero => b"ZERO\0\0\0\0",
            Self::Stop => b"STOP\0\0\0\0",
        }
    }

    fn from_tag(tag: [u8; TAG_LEN]) -> Result<Self, StreamFormatError> {
        match &tag {
            b"META\0\0\0\0" => Ok(Self::Meta),
            b"DATA\0\0\0\0" => Ok(Self::Data),
            b"ZERO\0\0\0\0" => Ok(Self::Zero),
            b"STOP\0\0\0\0" => Ok(Self::Stop),
            _ => Err(StreamFormatError::UnknownTag(tag)),
        }
    }

    /// Whether frames of this kind carry a payload followed by [`TERM`].
    #[must_use]
    pub const fn has_payload(self) -> bool {
        matches!(self, Self::Meta | Self::Data)
    }
}

/// A parsed frame header: kind, start offset and payload/region length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// The frame's kind.
    pub kind: FrameKind,
    /// The offset into the source disk this frame describes.
    pub start: u64,
    /// For Data/Meta, the payload length in bytes; for Zero, the hole length.
    pub length: u64,
}

fn encode_hex_field(value: u64) -> [u8; HEX_FIELD_LEN] {
    let text = format!("{value:016x}");
    let mut field = [0u8; HEX_FIELD_LEN];
    field.copy_from_slice(text.as_bytes());
    field
}

fn decode_hex_field(field: &[u8]) -> Result<u64, StreamFormatError> {
    let text = std::str::from_utf8(field)
        .map_err(|_| StreamFormatError::MalformedField("non-UTF-8 hex field".to_string()))?;
    u64::from_str_radix(text, 16)
        .map_err(|err| StreamFormatError::MalformedField(format!("{text:?}: {err}")))
}

/// Writes a frame header (tag, start, length) to `writer`. Payload bytes and
/// [`TERM`], when applicable, must be written separately by the caller.
pub fn write_frame_header<W: Write>(writer: &mut W, kind: FrameKind, start: u64, length: u64) -> io::Result<()> {
    writer.write_all(kind.tag())?;
    writer.write_all(&encode_hex_field(start))?;
    writer.write_all(b"\n")?;
    writer.write_all(&encode_hex_field(length))?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Writes the [`TERM`] marker.
pub fn write_term<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(TERM)
}

/// Reads and parses one frame header from `reader`.
pub fn read_frame_header<R: Read>(reader: &mut R) -> StreamResult<FrameHeader> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;

    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&header[0..TAG_LEN]);
    let kind = FrameKind::from_tag(tag)?;

    let start_field = &header[TAG_LEN..TAG_LEN + HEX_FIELD_LEN];
    if header[TAG_LEN + HEX_FIELD_LEN] != b'\n' {
        return Err(StreamFormatError::MissingDelimiter);
    }
    let start = decode_hex_field(start_field)?;

    let length_start = TAG_LEN + HEX_FIELD_LEN + 1;
    let length_field = &header[length_start..length_start + HEX_FIELD_LEN];
    if header[length_start + HEX_FIELD_LEN] != b'\n' {
        return Err(StreamFormatError::MissingDelimiter);
    }
    let length = decode_hex_field(length_field)?;

    Ok(FrameHeader { kind, start, length })
}

/// Reads and validates the [`TERM`] marker following a Data/Meta payload.
pub fn read_term<R: Read>(reader: &mut R, kind: FrameKind) -> StreamResult<()> {
    let mut marker = [0u8; TERM.len()];
    reader.read_exact(&mut marker).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            StreamFormatError::MissingTerm(kind)
        } else {
            StreamFormatError::Io(err)
        }
    })?;
    if &marker != TERM {
        return Err(StreamFormatError::MissingTerm(kind));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_data_header() {
        let mut buf = Vec::new();
        write_frame_header(&mut buf, FrameKind::Data, 0x1000, 0x20000).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);

        let mut cursor = Cursor::new(buf);
        let header = read_frame_header(&mut cursor).unwrap();
        assert_eq!(header.kind, FrameKind::Data);
        assert_eq!(header.start, 0x1000);
        assert_eq!(header.length, 0x20000);
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"XXXX\0\0\0\0");
        buf.extend_from_slice(&encode_hex_field(0));
        buf.push(b'\n');
        buf.extend_from_slice(&encode_hex_field(0));
        buf.push(b'\n');

        let mut cursor = Cursor::new(buf);
        let err = read_frame_header(&mut cursor).unwrap_err();
        assert!(matches!(err, StreamFormatError::UnknownTag(_)));
    }

    #[test]
    fn rejects_missing_delimiter() {
        let mut buf = Vec::new();
        buf.extend_from_slice(FrameKind::Meta.tag());
        buf.extend_from_slice(&encode_hex_field(0));
        buf.push(b'x'); // wrong delimiter
        buf.extend_from_slice(&encode_hex_field(0));
        buf.push(b'\n');

        let mut cursor = Cursor::new(buf);
        let err = read_frame_header(&mut cursor).unwrap_err();
        assert!(matches!(err, StreamFormatError::MissingDelimiter));
    }

    #[test]
    fn term_round_trips() {
        let mut buf = Vec::new();
        write_term(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        read_term(&mut cursor, FrameKind::Data).unwrap();
    }

    #[test]
    fn missing_term_is_an_error() {
        let mut cursor = Cursor::new(Vec::new());
        let err = read_term(&mut cursor, FrameKind::Meta).unwrap_err();
        assert!(matches!(err, StreamFormatError::MissingTerm(FrameKind::Meta)));
    }

    #[test]
    fn truncated_term_is_an_error() {
        let mut cursor = Cursor::new(b"\0TE".to_vec());
        let err = read_term(&mut cursor, FrameKind::Data).unwrap_err();
        assert!(matches!(err, StreamFormatError::MissingTerm(FrameKind::Data)));
    }
}
