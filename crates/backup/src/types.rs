//! crates/backup/src/types.rs
//!
//! The request/outcome value types for one disk's backup pipeline, and the
//! `StreamType` choice between the framed sparse container and raw
//! passthrough.

use std::path::PathBuf;

use checkpoint::BackupMode;
use compress::lz4::CompressionLevel;
use hypervisor::DiskSpec;
use nbd_transport::NbdEndpoint;

use crate::nbd_server::NbdServerLauncher;

/// Whether a disk is written as the framed sparse container or as a raw
/// passthrough copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// Write a self-describing stream container (Meta/Data/Zero/Stop
    /// frames).
    Stream,
    /// Write a raw image: seek-and-write data extents, leave holes for
    /// zero extents. Only available when the source disk format is `raw`
    /// and the caller requested raw passthrough.
    Raw,
}

impl StreamType {
    /// Resolves the stream type: `Raw` iff
    /// both the disk format is raw and the caller requested passthrough.
    #[must_use]
    pub fn resolve(disk_format: &str, raw_passthrough_requested: bool) -> Self {
        if raw_passthrough_requested && disk_format.eq_ignore_ascii_case("raw") {
            Self::Raw
        } else {
            Self::Stream
        }
    }
}

/// Where `backup_disk` should dial its NBD connection from.
pub enum EndpointSource<'a> {
    /// An online backup: the hypervisor already started the job and
    /// handed back a live endpoint.
    Online(NbdEndpoint),
    /// An offline backup, local worker: start `qemu-nbd`-equivalent on a
    /// per-disk Unix socket.
    OfflineLocal {
        /// Launches the background server.
        launcher: &'a dyn NbdServerLauncher,
        /// The socket path to listen on, assigned by the orchestrator
        /// before any worker starts.
        socket_path: PathBuf,
    },
    /// An offline backup, remote worker: start the server listening on a
    /// disjoint TCP port assigned by `PortAllocator::disjoint`.
    OfflineRemote {
        /// Launches the background server.
        launcher: &'a dyn NbdServerLauncher,
        /// The port to listen on.
        port: u16,
    },
}

impl EndpointSource<'_> {
    /// Whether this source represents an offline backup (no running
    /// hypervisor-managed backup job).
    #[must_use]
    pub const fn is_offline(&self) -> bool {
        !matches!(self, Self::Online(_))
    }
}

/// Everything `backup_disk` needs for one disk, built by the orchestrator
/// from its immutable `RunConfig` plus the per-disk assignment
/// `checkpoint::handle_checkpoints` already resolved.
pub struct BackupDiskRequest<'a> {
    /// The disk being backed up.
    pub disk: &'a DiskSpec,
    /// Index of this disk's worker, used to derive a disjoint remote port.
    pub worker_index: usize,
    /// The resolved backup mode (never `Auto` by the time this is built).
    pub mode: BackupMode,
    /// The checkpoint name assigned for this run, if any.
    pub checkpoint_name: Option<&'a str>,
    /// The parent checkpoint this run is relative to, if any.
    pub parent_checkpoint: Option<&'a str>,
    /// Where to dial the NBD connection from.
    pub endpoint_source: EndpointSource<'a>,
    /// Whether raw passthrough was requested on the CLI.
    pub raw_passthrough_requested: bool,
    /// Compression level to apply to Data frame payloads, or `None` for an
    /// uncompressed stream.
    pub compression: Option<CompressionLevel>,
    /// Wall-clock seconds since the epoch, used only to name `diff` stream
    /// files; supplied by the caller rather than read from the clock here
    /// so the pipeline stays deterministic under test.
    pub epoch_seconds: u64,
}

/// What `backup_disk` reports on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    /// The disk target backed up.
    pub disk_target: String,
    /// The final (non-`.partial`) stream file name written.
    pub file_name: String,
    /// The source disk's full virtual size.
    pub virtual_size: u64,
    /// The number of bytes actually carried by Data frames (sum of
    /// `data=true` extent lengths).
    pub thin_backup_size: u64,
    /// The checkpoint name this run assigned, if any.
    pub checkpoint_name: Option<String>,
}
