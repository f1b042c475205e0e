#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `backup` drives the per-disk backup pipeline: [`backup_disk`] resolves
//! where to dial the source disk from, enumerates the regions that need
//! copying, and writes either a framed sparse stream container or a raw
//! passthrough image into an [`OutputSink`].
//!
//! # Design
//!
//! [`types::BackupDiskRequest`] is the single input the orchestrator
//! builds for one disk, combining its immutable `RunConfig` with the
//! per-disk checkpoint assignment `checkpoint::handle_checkpoints` already
//! resolved. [`backup_disk`] is a pure function of that request plus a
//! [`hypervisor::Hypervisor`] handle and an [`OutputSink`]: it owns no
//! state across calls, so the orchestrator can run one worker per disk
//! without sharing anything but the sink and the hypervisor handle (both
//! `Send + Sync`).
//!
//! Extent enumeration goes through the [`extents::ExtentQuery`] seam
//! rather than a concrete strategy, and the NBD connection (or, for an
//! offline backup, the background server this crate starts) is torn down
//! before the function returns, success or failure, so a worker never
//! leaks a socket or child process.
//!
//! # Invariants
//!
//! - The stream file is written under its `.partial` name and only
//!   renamed to its final name ([`naming::stream_file_name`]) after the
//!   Stop frame (and, if compressed, the trailer) is fully written.
//! - `thin_backup_size` is always the sum of `data=true` extent lengths,
//!   even when that sum is zero (an inc/diff backup with no changes is
//!   not an error).
//! - An [`extents::ExtentQuery`] returning `Ok(None)` is not fatal: the
//!   whole disk is copied as one Data extent and a warning is recorded.
//!
//! # Errors
//!
//! See [`BackupError`] for the full set of fatal conditions this pipeline
//! can report; the orchestrator treats any of them as this disk's worker
//! failing while continuing other workers.
//!
//! # Examples
//!
//! ```no_run
//! use backup::{backup_disk, naming, nbd_server::ProcessNbdServerLauncher, sink::FsOutputSink};
//! use backup::types::{BackupDiskRequest, EndpointSource};
//! use checkpoint::BackupMode;
//! use hypervisor::{DiskSpec, FakeHypervisor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hv = FakeHypervisor::new();
//! let disk = DiskSpec { target: "vda".into(), format: "raw".into(), source_path: "/dev/null".into() };
//! let launcher = ProcessNbdServerLauncher::new();
//! let sink = FsOutputSink::new("/tmp");
//! let request = BackupDiskRequest {
//!     disk: &disk,
//!     worker_index: 0,
//!     mode: BackupMode::Full,
//!     checkpoint_name: Some("web01.0"),
//!     parent_checkpoint: None,
//!     endpoint_source: EndpointSource::OfflineLocal { launcher: &launcher, socket_path: "/tmp/vda.sock".into() },
//!     raw_passthrough_requested: false,
//!     compression: None,
//!     epoch_seconds: 0,
//! };
//! let outcome = backup_disk(&request, &sink, &hv)?;
//! assert_eq!(outcome.file_name, naming::stream_file_name("vda", checkpoint::BackupMode::Full, Some("web01.0"), 0));
//! # Ok(())
//! # }
//! ```
//!
//! # See also
//!
//! - `restore` for the reader side that replays what this crate writes.
//! - `orchestrator` for how `backup_disk` calls are fanned out across a
//!   worker pool and how checkpoint commit is sequenced around it.

pub mod error;
pub mod naming;
pub mod nbd_server;
pub mod sink;
pub mod types;

use std::io::Write;

use checkpoint::BackupMode;
use compress::lz4::CompressionLevel;
use extents::{cover_disk, dirty_bitmap_context, online_bitmap_name, Extent, ExtentQuery, NbdExtentQuery, BASE_ALLOCATION};
use hypervisor::Hypervisor;
use nbd_transport::{connect, NbdEndpoint, NbdTransport, Stream as NbdStream};
use stream::{write_frame_header, write_term, write_compression_trailer, write_metadata, ChunkSizes, FrameKind, StreamMetadata};
use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;

use crate::error::{BackupError, BackupResult};
use crate::naming::{partial_file_name, stream_file_name};
use crate::sink::{OutputSink, SinkWriter};
use crate::types::{BackupDiskRequest, BackupOutcome, EndpointSource, StreamType};

/// Resolves the metadata context `backup_disk` queries block status over:
/// `base:allocation` for a full base, the dirty bitmap named after the
/// parent checkpoint (offline) or `backup-<disk_target>` (online) for an
/// incremental/differential run.
fn resolve_meta_context(request: &BackupDiskRequest<'_>) -> BackupResult<String> {
    match request.mode {
        BackupMode::Full | BackupMode::Copy => Ok(BASE_ALLOCATION.to_string()),
        BackupMode::Inc | BackupMode::Diff => {
            let bitmap_name = if request.endpoint_source.is_offline() {
                request
                    .parent_checkpoint
                    .map(ToString::to_string)
                    .ok_or_else(|| BackupError::MissingParentCheckpoint { disk: request.disk.target.clone() })?
            } else {
                online_bitmap_name(&request.disk.target)
            };
            Ok(dirty_bitmap_context(&bitmap_name))
        }
        BackupMode::Auto => unreachable!("BackupMode::Auto is resolved before backup_disk is called"),
    }
}

/// Starts the offline NBD server this request names, if any, and connects
/// to the resulting (or already-online) endpoint.
fn dial(request: &BackupDiskRequest<'_>, meta_context: &str) -> BackupResult<(Option<nbd_server::NbdServerHandle>, NbdTransport<Box<dyn NbdStream>>)> {
    let (server, endpoint) = match &request.endpoint_source {
        EndpointSource::Online(endpoint) => (None, endpoint.clone()),
        EndpointSource::OfflineLocal { launcher, socket_path } => {
            let handle = launcher.start_local(&request.disk.source_path, &request.disk.format, socket_path, true)?;
            (Some(handle), NbdEndpoint::unix(socket_path.clone()))
        }
        EndpointSource::OfflineRemote { launcher, port } => {
            let handle = launcher.start_remote(&request.disk.source_path, &request.disk.format, *port, true)?;
            (Some(handle), NbdEndpoint::tcp("127.0.0.1", *port))
        }
    };

    let transport = connect(&endpoint, &request.disk.target, &[meta_context])
        .map_err(|source| BackupError::Transport { disk: request.disk.target.clone(), source })?;
    Ok((server, transport))
}

/// Enumerates extents for this request, falling back to a single
/// whole-disk Data extent with a warning when the query strategy reports
/// no status at all.
fn query_extents(transport: &mut NbdTransport<Box<dyn NbdStream>>, meta_context: &str, disk_target: &str) -> BackupResult<Vec<Extent>> {
    let disk_size = transport.size();
    let mut query = NbdExtentQuery::new(transport, meta_context.to_string());
    match query
        .query_block_status()
        .map_err(|source| BackupError::DiskBackupFailed { disk: disk_target.to_string(), source })?
    {
        Some(extents) => Ok(extents),
        None => {
            logging::warn_log!("extent query for disk {disk_target} returned no status; copying the whole disk as one data extent");
            let extents = vec![Extent { offset: 0, length: disk_size, data: disk_size > 0 }];
            cover_disk(&extents, disk_size).map_err(|source| BackupError::DiskBackupFailed { disk: disk_target.to_string(), source })?;
            Ok(extents)
        }
    }
}

fn thin_backup_size(extents: &[Extent]) -> u64 {
    extents.iter().filter(|extent| extent.data).map(|extent| extent.length).sum()
}

/// Writes every data extent, splitting any extent wider than
/// `max_request_size` into consecutively-read/written chunks, and returns
/// the per-frame compression trailer entries (empty when `compression` is
/// `None`).
fn write_stream_body(
    writer: &mut Box<dyn SinkWriter>,
    transport: &mut NbdTransport<Box<dyn NbdStream>>,
    extents: &[Extent],
    compression: Option<CompressionLevel>,
    disk_target: &str,
    mode: BackupMode,
) -> BackupResult<Vec<ChunkSizes>> {
    let max_request = transport.max_request_size() as u64;
    let mut trailer = Vec::new();
    // Inc/diff extents come from a dirty-bitmap context: a `!data` region
    // means "not dirty", which carries no information worth a frame.
    // Full/copy extents come from `base:allocation`, where `!data` is a
    // real hole the restore target must still see zeroed.
    let emit_zero_frames = matches!(mode, BackupMode::Full | BackupMode::Copy);

    for extent in extents {
        if !extent.data {
            if emit_zero_frames {
                write_frame_header(writer, FrameKind::Zero, extent.offset, extent.length)
                    .map_err(|source| BackupError::Stream { disk: disk_target.to_string(), source })?;
            }
            continue;
        }

        let mut sub_offset = extent.offset;
        let remaining_total = extent.length;
        let mut consumed = 0u64;
        let mut sub_sizes = Vec::new();
        let mut payloads = Vec::new();

        while consumed < remaining_total {
            let chunk_len = (remaining_total - consumed).min(max_request);
            let chunk = transport
                .pread(sub_offset, chunk_len as u32)
                .map_err(|source| BackupError::Transport { disk: disk_target.to_string(), source })?;

            let payload = match compression {
                Some(level) => compress::lz4::compress_to_vec(&chunk, level)
                    .map_err(|source| BackupError::Stream { disk: disk_target.to_string(), source })?,
                None => chunk,
            };

            sub_sizes.push(payload.len() as u64);
            payloads.push(payload);
            sub_offset += chunk_len;
            consumed += chunk_len;
        }

        // Every sub-chunk of a split extent is written back-to-back inside
        // one Data frame (spec §4.D step 7); the compression trailer is
        // what lets restore split the concatenated payload back apart.
        let frame_len: u64 = sub_sizes.iter().sum();
        write_frame_header(writer, FrameKind::Data, extent.offset, frame_len)
            .map_err(|source| BackupError::Stream { disk: disk_target.to_string(), source })?;
        for payload in &payloads {
            writer.write_all(payload).map_err(|source| BackupError::DiskBackupWriterException { disk: disk_target.to_string(), source })?;
        }
        write_term(writer).map_err(|source| BackupError::Stream { disk: disk_target.to_string(), source })?;

        if compression.is_some() {
            trailer.push(if sub_sizes.len() == 1 {
                ChunkSizes::Single(sub_sizes[0])
            } else {
                ChunkSizes::Chunked { compressed_len: sub_sizes }
            });
        }
    }

    Ok(trailer)
}

/// Writes every data extent as a raw, sparse passthrough image: the
/// backing file is pre-sized to the disk's full virtual size and only
/// data extents are seeked-to and written, leaving zero extents as holes.
fn write_raw_body(
    writer: &mut Box<dyn SinkWriter>,
    transport: &mut NbdTransport<Box<dyn NbdStream>>,
    extents: &[Extent],
    disk_size: u64,
    disk_target: &str,
) -> BackupResult<()> {
    writer.set_len(disk_size).map_err(|source| BackupError::DiskBackupWriterException { disk: disk_target.to_string(), source })?;

    let max_request = transport.max_request_size() as u64;
    for extent in extents.iter().filter(|extent| extent.data) {
        let mut sub_offset = extent.offset;
        let mut consumed = 0u64;
        while consumed < extent.length {
            let chunk_len = (extent.length - consumed).min(max_request);
            let chunk = transport
                .pread(sub_offset, chunk_len as u32)
                .map_err(|source| BackupError::Transport { disk: disk_target.to_string(), source })?;
            writer
                .seek_to(sub_offset)
                .map_err(|source| BackupError::DiskBackupWriterException { disk: disk_target.to_string(), source })?;
            writer
                .write_all(&chunk)
                .map_err(|source| BackupError::DiskBackupWriterException { disk: disk_target.to_string(), source })?;
            sub_offset += chunk_len;
            consumed += chunk_len;
        }
    }
    Ok(())
}

/// Runs the full per-disk backup pipeline for `request` and returns a
/// summary of what was written.
///
/// `hypervisor` is accepted for symmetry with the rest of the engine's
/// call shape and future hypervisor-side bookkeeping (e.g. recording
/// per-disk transfer progress); today it is not consulted directly, since
/// job start/checkpoint commit happen in `checkpoint`/`orchestrator`
/// around this call.
pub fn backup_disk(request: &BackupDiskRequest<'_>, sink: &dyn OutputSink, _hypervisor: &dyn Hypervisor) -> BackupResult<BackupOutcome> {
    let disk_target = request.disk.target.clone();
    let stream_type = StreamType::resolve(&request.disk.format, request.raw_passthrough_requested);
    let meta_context = resolve_meta_context(request)?;

    let (_server_handle, mut transport) = dial(request, &meta_context)?;
    let disk_size = transport.size();
    let extents = query_extents(&mut transport, &meta_context, &disk_target)?;
    let thin_size = thin_backup_size(&extents);

    let final_name = stream_file_name(&disk_target, request.mode, request.checkpoint_name, request.epoch_seconds);
    let working_name = if sink.supports_partial() { partial_file_name(&final_name) } else { final_name.clone() };

    let mut writer = sink
        .create(&working_name)
        .map_err(|source| BackupError::Output { disk: disk_target.clone(), source })?;

    match stream_type {
        StreamType::Raw => {
            write_raw_body(&mut writer, &mut transport, &extents, disk_size, &disk_target)?;
        }
        StreamType::Stream => {
            let metadata = StreamMetadata {
                virtual_size: disk_size,
                data_size: thin_size,
                disk_name: disk_target.clone(),
                disk_format: request.disk.format.clone(),
                checkpoint_name: request.checkpoint_name.unwrap_or_default().to_string(),
                parent_checkpoint: request.parent_checkpoint.unwrap_or_default().to_string(),
                stream_version: stream::STREAM_VERSION,
                incremental: matches!(request.mode, BackupMode::Inc | BackupMode::Diff),
                compressed: request.compression.is_some(),
                compression_method: request.compression.map(|_| "lz4".to_string()),
                compression_level: request.compression.map(level_ordinal),
                date: iso8601_date(request.epoch_seconds),
                extra: serde_json::Map::new(),
            };
            write_metadata(&mut writer, &metadata).map_err(|source| BackupError::Stream { disk: disk_target.clone(), source })?;

            let trailer = write_stream_body(&mut writer, &mut transport, &extents, request.compression, &disk_target, request.mode)?;

            write_frame_header(&mut writer, FrameKind::Stop, disk_size, 0)
                .map_err(|source| BackupError::Stream { disk: disk_target.clone(), source })?;

            if request.compression.is_some() {
                write_compression_trailer(&mut writer, &trailer)
                    .map_err(|source| BackupError::Stream { disk: disk_target.clone(), source })?;
            }
        }
    }

    writer.flush().map_err(|source| BackupError::DiskBackupWriterException { disk: disk_target.clone(), source })?;
    drop(writer);

    transport
        .disconnect()
        .map_err(|source| BackupError::Transport { disk: disk_target.clone(), source })?;

    if sink.supports_partial() {
        sink.finalize(&working_name, &final_name)
            .map_err(|source| BackupError::Output { disk: disk_target.clone(), source })?;
    }

    logging::info_log!(Transfer, 1, "backed up disk {disk_target}: {thin_size} of {disk_size} bytes thin, wrote {final_name}");

    Ok(BackupOutcome {
        disk_target,
        file_name: final_name,
        virtual_size: disk_size,
        thin_backup_size: thin_size,
        checkpoint_name: request.checkpoint_name.map(ToString::to_string),
    })
}

/// Formats `epoch_seconds` as an ISO-8601 timestamp for
/// [`StreamMetadata::date`]. Falls back to the bare epoch if the value is
/// outside the range `time` can represent as an `OffsetDateTime`.
fn iso8601_date(epoch_seconds: u64) -> String {
    i64::try_from(epoch_seconds)
        .ok()
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .and_then(|when| when.format(&Iso8601::DEFAULT).ok())
        .unwrap_or_else(|| epoch_seconds.to_string())
}

/// Maps a [`CompressionLevel`] onto the `1..=9`-style ordinal recorded in
/// [`StreamMetadata::compression_level`].
fn level_ordinal(level: CompressionLevel) -> i32 {
    match level {
        CompressionLevel::None => 0,
        CompressionLevel::Fast => 1,
        CompressionLevel::Default => 5,
        CompressionLevel::Best => 9,
        CompressionLevel::Precise(value) => i32::from(value.get()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nbd_transport::NbdEndpoint;

    #[test]
    fn level_ordinal_maps_named_levels() {
        assert_eq!(level_ordinal(CompressionLevel::None), 0);
        assert_eq!(level_ordinal(CompressionLevel::Best), 9);
    }

    #[test]
    fn resolve_meta_context_uses_base_allocation_for_full_and_copy() {
        let disk = hypervisor::DiskSpec { target: "vda".into(), format: "raw".into(), source_path: "/dev/null".into() };
        let launcher = nbd_server::ProcessNbdServerLauncher::new();
        let request = BackupDiskRequest {
            disk: &disk,
            worker_index: 0,
            mode: BackupMode::Full,
            checkpoint_name: Some("web01.0"),
            parent_checkpoint: None,
            endpoint_source: EndpointSource::OfflineLocal { launcher: &launcher, socket_path: "/tmp/vda.sock".into() },
            raw_passthrough_requested: false,
            compression: None,
            epoch_seconds: 0,
        };
        assert_eq!(resolve_meta_context(&request).unwrap(), BASE_ALLOCATION);
    }

    #[test]
    fn resolve_meta_context_uses_online_bitmap_name_for_online_inc() {
        let disk = hypervisor::DiskSpec { target: "vda".into(), format: "qcow2".into(), source_path: "/dev/null".into() };
        let endpoint = NbdEndpoint::unix("/tmp/does-not-matter.sock");
        let request = BackupDiskRequest {
            disk: &disk,
            worker_index: 0,
            mode: BackupMode::Inc,
            checkpoint_name: Some("web01.1"),
            parent_checkpoint: Some("web01.0"),
            endpoint_source: EndpointSource::Online(endpoint),
            raw_passthrough_requested: false,
            compression: None,
            epoch_seconds: 0,
        };
        assert_eq!(resolve_meta_context(&request).unwrap(), "qemu:dirty-bitmap:backup-vda");
    }

    #[test]
    fn resolve_meta_context_requires_parent_for_offline_inc() {
        let disk = hypervisor::DiskSpec { target: "vda".into(), format: "raw".into(), source_path: "/dev/null".into() };
        let launcher = nbd_server::ProcessNbdServerLauncher::new();
        let request = BackupDiskRequest {
            disk: &disk,
            worker_index: 0,
            mode: BackupMode::Inc,
            checkpoint_name: Some("web01.1"),
            parent_checkpoint: None,
            endpoint_source: EndpointSource::OfflineLocal { launcher: &launcher, socket_path: "/tmp/vda.sock".into() },
            raw_passthrough_requested: false,
            compression: None,
            epoch_seconds: 0,
        };
        assert!(resolve_meta_context(&request).is_err());
    }

    #[test]
    fn thin_backup_size_sums_only_data_extents() {
        let extents = vec![
            Extent { offset: 0, length: 4096, data: true },
            Extent { offset: 4096, length: 4096, data: false },
            Extent { offset: 8192, length: 100, data: true },
        ];
        assert_eq!(thin_backup_size(&extents), 4196);
    }
}
