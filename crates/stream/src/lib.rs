#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `stream` encodes and decodes the sparse backup stream container: the
//! self-describing, disk-image-independent file format the backup engine
//! writes and the restore engine replays. A container is a sequence of
//! fixed-layout frames —
//!
//! ```text
//! [META frame header][metadata JSON][TERM]
//! ([DATA frame header][payload bytes][TERM] | [ZERO frame header])*
//! [STOP frame header]
//! [compression trailer JSON]?       ; present iff metadata.compressed
//! ```
//!
//! # Design
//!
//! The [`frame`] module owns the fixed byte layout: an 8-byte ASCII tag
//! identifying [`FrameKind`], two 16-hex-digit big-endian fields (`start`,
//! `length`) each terminated by `\n`, and — for Data and Meta — a payload
//! followed by the [`TERM`] marker. [`metadata`] owns [`StreamMetadata`],
//! the Meta frame's JSON payload, and [`trailer`] owns the JSON compression
//! trailer appended after Stop. None of these modules buffer whole files in
//! memory; callers stream frame-by-frame.
//!
//! # Invariants
//!
//! - (S1) Every file begins with exactly one Meta frame at offset 0.
//! - (S2) Data and Zero frames strictly cover non-overlapping regions but
//!   need not be contiguous.
//! - (S3) A Stop frame is the last frame; its absence means truncation.
//! - (S4) The [`TERM`] marker follows every Data and Meta payload; its
//!   absence is [`StreamFormatError::MissingTerm`].
//!
//! # Errors
//!
//! Parsing operations return [`StreamFormatError`]; writing operations
//! return [`std::io::Result`] since writing a well-formed header cannot
//! itself produce a malformed stream.
//!
//! # Examples
//!
//! ```
//! use stream::{
//!     frame::{read_frame_header, write_frame_header, write_term, FrameKind},
//!     metadata::{load_metadata, write_metadata},
//!     StreamMetadata,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metadata = StreamMetadata {
//!     virtual_size: 1 << 20,
//!     data_size: 4096,
//!     disk_name: "vda".into(),
//!     disk_format: "raw".into(),
//!     checkpoint_name: "prefix.0".into(),
//!     parent_checkpoint: String::new(),
//!     stream_version: stream::STREAM_VERSION,
//!     incremental: false,
//!     compressed: false,
//!     compression_method: None,
//!     compression_level: None,
//!     date: "2026-01-01T00:00:00Z".into(),
//!     extra: serde_json::Map::new(),
//! };
//!
//! let mut out = Vec::new();
//! write_metadata(&mut out, &metadata)?;
//! write_frame_header(&mut out, FrameKind::Data, 0, 4)?;
//! out.extend_from_slice(b"data");
//! write_term(&mut out)?;
//! write_frame_header(&mut out, FrameKind::Stop, 0, 0)?;
//!
//! let mut cursor = std::io::Cursor::new(out);
//! let leading = read_frame_header(&mut cursor)?;
//! assert_eq!(leading.kind, FrameKind::Meta);
//! # Ok(())
//! # }
//! ```
//!
//! # See also
//!
//! - `backup` for the writer side that composes these primitives.
//! - `restore` for the reader side that replays a chain of containers.
//! - `compress` for the LZ4 framing used inside a compressed Data payload.

pub mod error;
pub mod frame;
pub mod metadata;
pub mod trailer;

pub use error::{StreamFormatError, StreamResult};
pub use frame::{read_frame_header, read_term, write_frame_header, write_term, FrameHeader, FrameKind, TERM};
pub use metadata::{load_metadata, write_metadata, StreamMetadata, STREAM_VERSION};
pub use trailer::{read_compression_trailer, write_compression_trailer, ChunkSizes};
