//! Integration tests covering a full Meta/Data/Zero/Stop container round trip.

use std::io::{Cursor, Read, Seek, SeekFrom};

use stream::{
    read_compression_trailer, read_frame_header, read_term, write_compression_trailer,
    write_frame_header, write_metadata, write_term, ChunkSizes, FrameKind, StreamMetadata,
    STREAM_VERSION,
};

fn sample_metadata(compressed: bool) -> StreamMetadata {
    StreamMetadata {
        virtual_size: 1 << 20,
        data_size: 8192,
        disk_name: "vda".into(),
        disk_format: "raw".into(),
        checkpoint_name: "prefix.1".into(),
        parent_checkpoint: "prefix.0".into(),
        stream_version: STREAM_VERSION,
        incremental: true,
        compressed,
        compression_method: compressed.then(|| "lz4".to_string()),
        compression_level: compressed.then_some(2),
        date: "2026-01-01T00:00:00Z".into(),
        extra: serde_json::Map::new(),
    }
}

#[test]
fn uncompressed_container_round_trips() {
    let metadata = sample_metadata(false);
    let mut container = Vec::new();

    write_metadata(&mut container, &metadata).unwrap();
    write_frame_header(&mut container, FrameKind::Data, 0, 4096).unwrap();
    container.extend(std::iter::repeat(0xAB).take(4096));
    write_term(&mut container).unwrap();
    write_frame_header(&mut container, FrameKind::Zero, 4096, 4096).unwrap();
    write_frame_header(&mut container, FrameKind::Data, 8192, 4096).unwrap();
    container.extend(std::iter::repeat(0xCD).take(4096));
    write_term(&mut container).unwrap();
    write_frame_header(&mut container, FrameKind::Stop, 0, 0).unwrap();

    let mut cursor = Cursor::new(container);

    let meta_header = read_frame_header(&mut cursor).unwrap();
    assert_eq!(meta_header.kind, FrameKind::Meta);
    assert_eq!(meta_header.start, 0, "S1: Meta frame is at offset 0");
    let mut meta_bytes = vec![0u8; meta_header.length as usize];
    cursor.read_exact(&mut meta_bytes).unwrap();
    let parsed_meta = stream::load_metadata(&meta_bytes).unwrap();
    assert_eq!(parsed_meta, metadata);
    read_term(&mut cursor, meta_header.kind).unwrap();

    let data1 = read_frame_header(&mut cursor).unwrap();
    assert_eq!(data1.kind, FrameKind::Data);
    let mut payload1 = vec![0u8; data1.length as usize];
    cursor.read_exact(&mut payload1).unwrap();
    assert!(payload1.iter().all(|&b| b == 0xAB));
    read_term(&mut cursor, data1.kind).unwrap();

    let zero = read_frame_header(&mut cursor).unwrap();
    assert_eq!(zero.kind, FrameKind::Zero);
    assert_eq!(zero.start, 4096);

    let data2 = read_frame_header(&mut cursor).unwrap();
    assert_eq!(data2.kind, FrameKind::Data);
    let mut payload2 = vec![0u8; data2.length as usize];
    cursor.read_exact(&mut payload2).unwrap();
    assert!(payload2.iter().all(|&b| b == 0xCD));
    read_term(&mut cursor, data2.kind).unwrap();

    let stop = read_frame_header(&mut cursor).unwrap();
    assert_eq!(stop.kind, FrameKind::Stop, "S3: Stop is the last frame");
}

#[test]
fn compression_trailer_fidelity() {
    let metadata = sample_metadata(true);
    let mut container = Vec::new();

    write_metadata(&mut container, &metadata).unwrap();

    let chunk1 = compress::lz4::compress_to_vec(&vec![1u8; 4096], compress::lz4::CompressionLevel::Default).unwrap();
    let chunk2 = compress::lz4::compress_to_vec(&vec![2u8; 4096], compress::lz4::CompressionLevel::Default).unwrap();

    write_frame_header(&mut container, FrameKind::Data, 0, (chunk1.len() + chunk2.len()) as u64).unwrap();
    let payload_len = chunk1.len() + chunk2.len();
    container.extend_from_slice(&chunk1);
    container.extend_from_slice(&chunk2);
    write_term(&mut container).unwrap();

    write_frame_header(&mut container, FrameKind::Stop, 0, 0).unwrap();

    let trailer = vec![ChunkSizes::Chunked {
        compressed_len: vec![chunk1.len() as u64, chunk2.len() as u64],
    }];
    write_compression_trailer(&mut container, &trailer).unwrap();

    let mut cursor = Cursor::new(container);
    let meta_header = read_frame_header(&mut cursor).unwrap();
    cursor.seek(SeekFrom::Current(meta_header.length as i64)).unwrap();
    read_term(&mut cursor, meta_header.kind).unwrap();

    let data_header = read_frame_header(&mut cursor).unwrap();
    assert_eq!(data_header.length as usize, payload_len);
    cursor.seek(SeekFrom::Current(data_header.length as i64)).unwrap();
    read_term(&mut cursor, data_header.kind).unwrap();

    let stop_header = read_frame_header(&mut cursor).unwrap();
    assert_eq!(stop_header.kind, FrameKind::Stop);

    let parsed_trailer = read_compression_trailer(&mut cursor).unwrap();
    assert_eq!(parsed_trailer, trailer);

    let trailer_total: u64 = parsed_trailer.iter().map(ChunkSizes::total).sum();
    assert_eq!(trailer_total, (chunk1.len() + chunk2.len()) as u64);
}

#[test]
fn missing_term_is_rejected() {
    let metadata = sample_metadata(false);
    let mut container = Vec::new();
    write_metadata(&mut container, &metadata).unwrap();
    write_frame_header(&mut container, FrameKind::Data, 0, 8).unwrap();
    container.extend_from_slice(b"12345678");
    // no TERM written

    let mut cursor = Cursor::new(container);
    let meta_header = read_frame_header(&mut cursor).unwrap();
    cursor.seek(SeekFrom::Current(meta_header.length as i64)).unwrap();
    read_term(&mut cursor, meta_header.kind).unwrap();

    let data_header = read_frame_header(&mut cursor).unwrap();
    cursor.seek(SeekFrom::Current(data_header.length as i64)).unwrap();
    let err = read_term(&mut cursor, data_header.kind).unwrap_err();
    assert!(matches!(err, stream::StreamFormatError::MissingTerm(FrameKind::Data)));
}
