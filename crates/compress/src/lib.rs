#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `compress` exposes the LZ4 framing primitives used by the sparse backup
//! stream container. The stream writer compresses each `Data` frame payload
//! independently and records the compressed length in the frame header, so
//! callers need a streaming encoder that reports its own byte count as it
//! goes. The restore path needs the inverse: a decoder that can be handed an
//! arbitrary reader positioned at the start of a compressed frame and that
//! stops cleanly at the LZ4 frame end marker.
//!
//! # Design
//!
//! The [`lz4`] module implements streaming-friendly encoders and decoders
//! built on top of [`lz4_flex`](https://docs.rs/lz4_flex)'s frame API. The API
//! emphasises incremental processing: callers provide scratch buffers that
//! are filled with compressed or decompressed data while the internal state
//! tracks totals for diagnostics and stream-header accounting.
//!
//! # Invariants
//!
//! - Encoders never allocate internal output buffers; all output is written
//!   into the caller-provided sink.
//! - Streams are finalised explicitly via
//!   [`lz4::CountingLz4Encoder::finish`], which emits the LZ4 end marker and
//!   reports the final compressed length.
//! - Errors from the underlying LZ4 implementation are surfaced as
//!   [`std::io::Error`] values.
//!
//! # Errors
//!
//! The encoder and decoder functions return [`std::io::Result`]. When
//! `lz4_flex` reports an error the helper wraps it via
//! [`std::io::Error::other`].
//!
//! # Examples
//!
//! ```
//! use compress::lz4::{CompressionLevel, CountingLz4Encoder, compress_to_vec, decompress_to_vec};
//!
//! # fn main() -> std::io::Result<()> {
//! let data = b"streaming example payload";
//! let mut encoder = CountingLz4Encoder::new(CompressionLevel::Default);
//! encoder.write(data)?;
//! let compressed_len = encoder.finish()?;
//! assert!(compressed_len > 0);
//!
//! let compressed = compress_to_vec(data, CompressionLevel::Default)?;
//! let decompressed = decompress_to_vec(&compressed)?;
//! assert_eq!(decompressed, data);
//! # Ok(())
//! # }
//! ```
//!
//! # See also
//!
//! - [`lz4`] for the LZ4 frame encoder/decoder implementation and API surface.
//! - `stream` for the frame container format that wraps these payloads.

mod common;
pub mod lz4;

pub use common::CountingSink;
