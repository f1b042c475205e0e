//! crates/restore/src/replay.rs
//!
//! Replays one stream file's Data/Zero frames onto a [`RestoreSink`].
//! An extent split across `max_request_size` on write lands inside a
//! single Data frame as back-to-back sub-chunks; for a compressed file,
//! the compression trailer recorded after the Stop frame is what tells
//! replay where each sub-chunk starts so it can be decompressed on its
//! own before being written out.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use nbd_transport::{NbdTransport, TransportResult};
use stream::{read_compression_trailer, read_frame_header, read_term, ChunkSizes, FrameKind, TERM};

use crate::error::{RestoreError, RestoreResult};
use crate::types::ReplayOutcome;

/// Where replay writes restored bytes. Implemented for [`NbdTransport`] so
/// production code and unit tests exercise the same chunking logic; tests
/// substitute an in-memory recorder that needs no real NBD handshake.
pub trait RestoreSink {
    /// The largest single write this sink accepts.
    fn max_chunk(&self) -> usize;
    /// Writes `data` at `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> TransportResult<()>;
}

impl<S: Read + std::io::Write> RestoreSink for NbdTransport<S> {
    fn max_chunk(&self) -> usize {
        self.max_request_size() as usize
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> TransportResult<()> {
        self.pwrite(data, offset)
    }
}

fn wrap_stream_err(path: &Path, source: stream::StreamFormatError) -> RestoreError {
    RestoreError::Stream { path: path.display().to_string(), source }
}

/// Writes `data` to `sink` starting at `start`, splitting into chunks no
/// larger than the sink's `max_chunk`.
fn write_chunked<T: RestoreSink + ?Sized>(sink: &mut T, disk: &str, start: u64, data: &[u8]) -> RestoreResult<()> {
    let max_chunk = sink.max_chunk().max(1);
    let mut offset = 0usize;
    while offset < data.len() {
        let chunk_len = (data.len() - offset).min(max_chunk);
        let chunk = &data[offset..offset + chunk_len];
        sink.write_at(start + offset as u64, chunk)
            .map_err(|source| RestoreError::Transport { disk: disk.to_string(), source })?;
        offset += chunk_len;
    }
    Ok(())
}

/// Walks every frame after the Meta frame without reading Data payloads
/// (seeking past them instead), to find the compression trailer that
/// follows the Stop frame. Used only for `metadata.compressed` files: the
/// trailer must be known before a Data frame can be split back into the
/// sub-chunks it was written from (§3 CompressionTrailer).
fn collect_trailer(reader: &mut File, path: &Path, disk_target: &str) -> RestoreResult<Vec<ChunkSizes>> {
    loop {
        let frame = read_frame_header(reader).map_err(|source| wrap_stream_err(path, source))?;
        match frame.kind {
            FrameKind::Data => {
                let skip = i64::try_from(frame.length).unwrap_or(i64::MAX) + TERM.len() as i64;
                reader.seek(SeekFrom::Current(skip)).map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?;
            }
            FrameKind::Zero => {}
            FrameKind::Stop => break,
            FrameKind::Meta => return Err(wrap_stream_err(path, stream::StreamFormatError::MissingLeadingMeta)),
        }
    }
    read_compression_trailer(reader).map_err(|source| wrap_stream_err(path, source))
}

/// Splits `raw` back into the sub-chunks `entry` describes and decompresses
/// each independently; a multi-chunk Data frame is the concatenation of
/// independently lz4-framed sub-chunks, so they cannot be decompressed as
/// one stream.
fn decode_trailer_entry(raw: &[u8], entry: &ChunkSizes, path: &Path, disk_target: &str) -> RestoreResult<Vec<u8>> {
    let sizes: Vec<u64> = match entry {
        ChunkSizes::Single(len) => vec![*len],
        ChunkSizes::Chunked { compressed_len } => compressed_len.clone(),
    };
    let declared_total: u64 = sizes.iter().sum();
    if declared_total != raw.len() as u64 {
        return Err(RestoreError::TrailerMismatch {
            disk: disk_target.to_string(),
            file: path.display().to_string(),
            reason: format!("trailer entry covers {declared_total} bytes, frame payload is {} bytes", raw.len()),
        });
    }

    let mut decoded = Vec::new();
    let mut offset = 0usize;
    for size in sizes {
        let size = size as usize;
        let chunk = &raw[offset..offset + size];
        let piece = compress::lz4::decompress_to_vec(chunk).map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?;
        decoded.extend_from_slice(&piece);
        offset += size;
    }
    Ok(decoded)
}

/// Replays every frame in the stream file at `path`, writing restored Data
/// payloads to `sink`. Returns the file's checkpoint bookkeeping and the
/// number of bytes restored, after validating that total equals the
/// file's recorded `data_size`.
pub fn replay_stream_file<T: RestoreSink + ?Sized>(path: &Path, disk_target: &str, sink: &mut T) -> RestoreResult<ReplayOutcome> {
    let mut reader = File::open(path).map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?;

    let header = read_frame_header(&mut reader).map_err(|source| wrap_stream_err(path, source))?;
    if header.kind != FrameKind::Meta {
        return Err(wrap_stream_err(path, stream::StreamFormatError::MissingLeadingMeta));
    }
    let mut meta_payload = vec![0u8; header.length as usize];
    reader.read_exact(&mut meta_payload).map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?;
    read_term(&mut reader, FrameKind::Meta).map_err(|source| wrap_stream_err(path, source))?;
    let metadata = stream::load_metadata(&meta_payload).map_err(|source| wrap_stream_err(path, source))?;
    let frames_start = reader.stream_position().map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?;

    let trailer = if metadata.compressed {
        let trailer = collect_trailer(&mut reader, path, disk_target)?;
        reader.seek(SeekFrom::Start(frames_start)).map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?;
        Some(trailer)
    } else {
        None
    };

    let mut restored_bytes = 0u64;
    let mut data_frame_index = 0usize;

    loop {
        let frame = read_frame_header(&mut reader).map_err(|source| wrap_stream_err(path, source))?;
        match frame.kind {
            FrameKind::Data => {
                let mut raw = vec![0u8; frame.length as usize];
                reader.read_exact(&mut raw).map_err(|source| RestoreError::Io { disk: disk_target.to_string(), source })?;
                read_term(&mut reader, FrameKind::Data).map_err(|source| wrap_stream_err(path, source))?;

                let decoded = match &trailer {
                    Some(entries) => {
                        let entry = entries.get(data_frame_index).ok_or_else(|| RestoreError::TrailerMismatch {
                            disk: disk_target.to_string(),
                            file: path.display().to_string(),
                            reason: format!("trailer has {} entries, but a {}th Data frame was found", entries.len(), data_frame_index + 1),
                        })?;
                        decode_trailer_entry(&raw, entry, path, disk_target)?
                    }
                    None => raw,
                };
                data_frame_index += 1;

                write_chunked(sink, disk_target, frame.start, &decoded)?;
                restored_bytes += decoded.len() as u64;
            }
            FrameKind::Zero => {
                // Target images are allocated fully sparse/zeroed; holes
                // need no write.
            }
            FrameKind::Stop => break,
            FrameKind::Meta => return Err(wrap_stream_err(path, stream::StreamFormatError::MissingLeadingMeta)),
        }
    }

    if let Some(entries) = &trailer {
        if entries.len() != data_frame_index {
            logging::warn_log!(
                "compression trailer has {} entries but {} Data frames were replayed in {}",
                entries.len(),
                data_frame_index,
                path.display()
            );
        }
    }

    if restored_bytes != metadata.data_size {
        return Err(RestoreError::SizeMismatch {
            disk: disk_target.to_string(),
            file: path.display().to_string(),
            expected: metadata.data_size,
            actual: restored_bytes,
        });
    }

    Ok(ReplayOutcome { restored_bytes, checkpoint_name: metadata.checkpoint_name, parent_checkpoint: metadata.parent_checkpoint })
}

#[cfg(test)]
mod tests {
    use super::*;

    use stream::{write_frame_header, write_metadata, write_term, StreamMetadata};

    struct RecordingSink {
        max_chunk: usize,
        writes: Vec<(u64, Vec<u8>)>,
    }

    impl RecordingSink {
        fn new(max_chunk: usize) -> Self {
            Self { max_chunk, writes: Vec::new() }
        }
    }

    impl RestoreSink for RecordingSink {
        fn max_chunk(&self) -> usize {
            self.max_chunk
        }
        fn write_at(&mut self, offset: u64, data: &[u8]) -> TransportResult<()> {
            self.writes.push((offset, data.to_vec()));
            Ok(())
        }
    }

    fn sample_metadata(data_size: u64, compressed: bool) -> StreamMetadata {
        StreamMetadata {
            virtual_size: 1 << 20,
            data_size,
            disk_name: "vda".to_string(),
            disk_format: "raw".to_string(),
            checkpoint_name: "web01.0".to_string(),
            parent_checkpoint: String::new(),
            stream_version: stream::STREAM_VERSION,
            incremental: false,
            compressed,
            compression_method: compressed.then(|| "lz4".to_string()),
            compression_level: compressed.then_some(5),
            date: "@0".to_string(),
            extra: serde_json::Map::new(),
        }
    }

    fn make_stream_file(path: &Path, chunks: &[(u64, Vec<u8>)], compress: bool) {
        let mut buf = Vec::new();
        let total: u64 = chunks.iter().map(|(_, data)| data.len() as u64).sum();
        write_metadata(&mut buf, &sample_metadata(total, compress)).unwrap();

        let mut trailer = Vec::new();
        for (offset, data) in chunks {
            let payload = if compress {
                compress::lz4::compress_to_vec(data, compress::lz4::CompressionLevel::Default).unwrap()
            } else {
                data.clone()
            };
            write_frame_header(&mut buf, FrameKind::Data, *offset, payload.len() as u64).unwrap();
            buf.extend_from_slice(&payload);
            write_term(&mut buf).unwrap();
            if compress {
                trailer.push(ChunkSizes::Single(payload.len() as u64));
            }
        }
        write_frame_header(&mut buf, FrameKind::Stop, total, 0).unwrap();
        if compress {
            stream::write_compression_trailer(&mut buf, &trailer).unwrap();
        }
        std::fs::write(path, buf).unwrap();
    }

    #[test]
    fn replays_an_uncompressed_single_extent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vda.full.data");
        make_stream_file(&path, &[(0, vec![0xAB; 4096])], false);

        let mut sink = RecordingSink::new(1 << 20);
        let outcome = replay_stream_file(&path, "vda", &mut sink).unwrap();

        assert_eq!(outcome.restored_bytes, 4096);
        assert_eq!(outcome.checkpoint_name, "web01.0");
        assert_eq!(sink.writes, vec![(0, vec![0xAB; 4096])]);
    }

    #[test]
    fn replays_compressed_extents_and_decodes_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vda.full.data");
        make_stream_file(&path, &[(0, vec![0x11; 8192]), (8192, vec![0x22; 4096])], true);

        let mut sink = RecordingSink::new(1 << 20);
        let outcome = replay_stream_file(&path, "vda", &mut sink).unwrap();

        assert_eq!(outcome.restored_bytes, 12288);
        assert_eq!(sink.writes[0], (0, vec![0x11; 8192]));
        assert_eq!(sink.writes[1], (8192, vec![0x22; 4096]));
    }

    #[test]
    fn splits_a_chunked_data_frame_using_the_trailer() {
        // One extent split into two sub-chunks on write (scenario: extent
        // wider than max_request_size), each lz4-framed independently and
        // written back-to-back inside a single Data frame.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vda.full.data");

        let chunk_a = vec![0xAAu8; 4096];
        let chunk_b = vec![0xBBu8; 2048];
        let compressed_a = compress::lz4::compress_to_vec(&chunk_a, compress::lz4::CompressionLevel::Default).unwrap();
        let compressed_b = compress::lz4::compress_to_vec(&chunk_b, compress::lz4::CompressionLevel::Default).unwrap();

        let mut buf = Vec::new();
        write_metadata(&mut buf, &sample_metadata(6144, true)).unwrap();
        let frame_len = (compressed_a.len() + compressed_b.len()) as u64;
        write_frame_header(&mut buf, FrameKind::Data, 0, frame_len).unwrap();
        buf.extend_from_slice(&compressed_a);
        buf.extend_from_slice(&compressed_b);
        write_term(&mut buf).unwrap();
        write_frame_header(&mut buf, FrameKind::Stop, 6144, 0).unwrap();
        let trailer = vec![ChunkSizes::Chunked { compressed_len: vec![compressed_a.len() as u64, compressed_b.len() as u64] }];
        stream::write_compression_trailer(&mut buf, &trailer).unwrap();
        std::fs::write(&path, buf).unwrap();

        let mut sink = RecordingSink::new(1 << 20);
        let outcome = replay_stream_file(&path, "vda", &mut sink).unwrap();

        assert_eq!(outcome.restored_bytes, 6144);
        let mut expected = chunk_a;
        expected.extend(chunk_b);
        assert_eq!(sink.writes, vec![(0, expected)]);
    }

    #[test]
    fn trailer_entry_byte_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vda.full.data");

        let compressed = compress::lz4::compress_to_vec(&[0x11; 512], compress::lz4::CompressionLevel::Default).unwrap();
        let mut buf = Vec::new();
        write_metadata(&mut buf, &sample_metadata(512, true)).unwrap();
        write_frame_header(&mut buf, FrameKind::Data, 0, compressed.len() as u64).unwrap();
        buf.extend_from_slice(&compressed);
        write_term(&mut buf).unwrap();
        write_frame_header(&mut buf, FrameKind::Stop, 512, 0).unwrap();
        // Trailer claims a different byte count than the frame actually carries.
        let trailer = vec![ChunkSizes::Single(compressed.len() as u64 + 1)];
        stream::write_compression_trailer(&mut buf, &trailer).unwrap();
        std::fs::write(&path, buf).unwrap();

        let mut sink = RecordingSink::new(1 << 20);
        let err = replay_stream_file(&path, "vda", &mut sink).unwrap_err();
        assert!(matches!(err, RestoreError::TrailerMismatch { .. }));
    }

    #[test]
    fn splits_writes_larger_than_max_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vda.full.data");
        make_stream_file(&path, &[(0, vec![0x33; 10_000])], false);

        let mut sink = RecordingSink::new(4096);
        let outcome = replay_stream_file(&path, "vda", &mut sink).unwrap();

        assert_eq!(outcome.restored_bytes, 10_000);
        assert_eq!(sink.writes.len(), 3);
        assert_eq!(sink.writes[0].0, 0);
        assert_eq!(sink.writes[1].0, 4096);
        assert_eq!(sink.writes[2].0, 8192);
        assert_eq!(sink.writes[2].1.len(), 10_000 - 8192);
    }

    #[test]
    fn missing_leading_meta_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vda.full.data");
        let mut buf = Vec::new();
        write_frame_header(&mut buf, FrameKind::Stop, 0, 0).unwrap();
        std::fs::write(&path, buf).unwrap();

        let mut sink = RecordingSink::new(1 << 20);
        let err = replay_stream_file(&path, "vda", &mut sink).unwrap_err();
        assert!(matches!(err, RestoreError::Stream { .. }));
    }

    #[test]
    fn size_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vda.full.data");
        let mut buf = Vec::new();
        let mut metadata = sample_metadata(8192, false);
        metadata.data_size = 8192;
        write_metadata(&mut buf, &metadata).unwrap();
        write_frame_header(&mut buf, FrameKind::Data, 0, 4096).unwrap();
        buf.extend_from_slice(&vec![0u8; 4096]);
        write_term(&mut buf).unwrap();
        write_frame_header(&mut buf, FrameKind::Stop, 4096, 0).unwrap();
        std::fs::write(&path, buf).unwrap();

        let mut sink = RecordingSink::new(1 << 20);
        let err = replay_stream_file(&path, "vda", &mut sink).unwrap_err();
        assert!(matches!(err, RestoreError::SizeMismatch { expected: 8192, actual: 4096, .. }));
    }

    #[test]
    fn zero_frames_are_skipped_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vda.full.data");
        let mut buf = Vec::new();
        let metadata = sample_metadata(4096, false);
        write_metadata(&mut buf, &metadata).unwrap();
        write_frame_header(&mut buf, FrameKind::Zero, 0, 4096).unwrap();
        write_frame_header(&mut buf, FrameKind::Data, 4096, 4096).unwrap();
        buf.extend_from_slice(&vec![0xCD; 4096]);
        write_term(&mut buf).unwrap();
        write_frame_header(&mut buf, FrameKind::Stop, 8192, 0).unwrap();
        std::fs::write(&path, buf).unwrap();

        let mut sink = RecordingSink::new(1 << 20);
        let outcome = replay_stream_file(&path, "vda", &mut sink).unwrap();
        assert_eq!(outcome.restored_bytes, 4096);
        assert_eq!(sink.writes, vec![(4096, vec![0xCD; 4096])]);
    }
}
