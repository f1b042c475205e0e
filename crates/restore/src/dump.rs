//! crates/restore/src/dump.rs
//!
//! `--dump`: lists the Meta-frame metadata of every stream file in an
//! input directory, in filename order, without allocating a target image
//! or touching any NBD transport.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use stream::{read_frame_header, read_term, FrameKind, StreamMetadata};

use crate::error::{RestoreError, RestoreResult};

/// Reads just the leading Meta frame of a stream file.
pub fn peek_metadata(path: &Path) -> RestoreResult<StreamMetadata> {
    let mut reader = File::open(path).map_err(|source| RestoreError::Io { disk: path.display().to_string(), source })?;
    let header = read_frame_header(&mut reader).map_err(|source| RestoreError::Stream { path: path.display().to_string(), source })?;
    if header.kind != FrameKind::Meta {
        return Err(RestoreError::Stream { path: path.display().to_string(), source: stream::StreamFormatError::MissingLeadingMeta });
    }
    let mut payload = vec![0u8; header.length as usize];
    reader.read_exact(&mut payload).map_err(|source| RestoreError::Io { disk: path.display().to_string(), source })?;
    read_term(&mut reader, FrameKind::Meta).map_err(|source| RestoreError::Stream { path: path.display().to_string(), source })?;
    stream::load_metadata(&payload).map_err(|source| RestoreError::Stream { path: path.display().to_string(), source })
}

/// Lists every `*.data` stream file's metadata in `input_dir`, sorted by
/// file name (which places checkpoints in chain order for any single
/// prefix, since checkpoint suffixes only overflow into a second digit
/// past what a single backup run would produce). Restricts to files whose
/// name starts with `disk_filter.` when given.
pub fn dump_metadata(input_dir: &Path, disk_filter: Option<&str>) -> RestoreResult<Vec<StreamMetadata>> {
    let mut names = Vec::new();
    let entries = fs::read_dir(input_dir).map_err(|source| RestoreError::Io { disk: input_dir.display().to_string(), source })?;
    for entry in entries {
        let entry = entry.map_err(|source| RestoreError::Io { disk: input_dir.display().to_string(), source })?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else { continue };
        if !name.ends_with(".data") {
            continue;
        }
        if let Some(filter) = disk_filter {
            if !name.starts_with(&format!("{filter}.")) {
                continue;
            }
        }
        names.push(path);
    }
    names.sort();

    names.iter().map(|path| peek_metadata(path)).collect()
}
