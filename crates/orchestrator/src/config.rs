//! crates/orchestrator/src/config.rs
//!
//! The immutable run-wide configuration the `cli` front end builds once
//! per invocation, and the transport-mode choice that determines whether
//! a worker dials a hypervisor-managed endpoint or starts its own NBD
//! server in front of a disk/image file.

use std::path::PathBuf;

use checkpoint::BackupMode;
use compress::lz4::CompressionLevel;
use logging::VerbosityConfig;

/// Where a backup worker should dial its NBD connection from.
#[derive(Debug, Clone)]
pub enum TransportMode {
    /// The domain is running; the hypervisor's `start_backup` job hands
    /// back a live endpoint per disk.
    Online,
    /// The domain is powered off; each worker starts its own server on a
    /// per-disk Unix socket under `socket_dir`.
    OfflineLocal {
        /// Directory to create per-disk socket files in.
        socket_dir: PathBuf,
    },
    /// The domain is powered off and workers run on a remote host; each
    /// worker's server listens on `base_port + worker_index`.
    OfflineRemote {
        /// The first port in the disjoint range workers are assigned.
        base_port: u16,
    },
}

/// One backup run's full configuration, built once by the `cli` front end
/// and shared (read-only) across every worker.
pub struct BackupRunConfig {
    /// The domain to back up.
    pub domain: String,
    /// The checkpoint-chain prefix; defaults to `domain` when not given
    /// explicitly on the CLI.
    pub prefix: String,
    /// The requested backup mode (`Auto` is resolved once the chain is
    /// read).
    pub mode: BackupMode,
    /// Destination directory for stream files, sidecars, and the chain
    /// file. Always a real directory, even when `sink` streams disk data
    /// into a single zip archive: chain/config bookkeeping must survive
    /// independently of how any one run's disk images were packaged.
    pub output_dir: PathBuf,
    /// Disk targets to include; empty means every disk on the domain.
    pub include_disks: Vec<String>,
    /// Disk targets to exclude, applied after `include_disks`.
    pub exclude_disks: Vec<String>,
    /// Requested worker count; clamped to the selected disk count, and
    /// further clamped to 1 when the output sink cannot support more than
    /// one writer at a time (a zip archive).
    pub worker_count: usize,
    /// Compression applied to Data frame payloads, or `None` for an
    /// uncompressed stream.
    pub compression: Option<CompressionLevel>,
    /// Whether a raw-format disk should be written as a raw passthrough
    /// image instead of the framed stream container.
    pub raw_passthrough: bool,
    /// Whether warnings recorded during the run should make the run's
    /// exit code non-zero.
    pub strict: bool,
    /// How to reach each disk's NBD source.
    pub transport: TransportMode,
    /// Wall-clock seconds since the epoch, used only to name `diff`
    /// stream files and as a fallback identifier for run artifacts that
    /// have no checkpoint name of their own (`copy` mode).
    pub epoch_seconds: u64,
    /// Which diagnostic categories each worker thread (and the calling
    /// thread) records events for. Installed via [`logging::init`] on the
    /// calling thread and re-installed on every worker thread it spawns,
    /// since `logging`'s event queue is thread-local.
    pub verbosity: VerbosityConfig,
}

/// How a restore worker should expose its freshly created target image.
#[derive(Debug, Clone)]
pub enum RestoreTransportMode {
    /// Start a server on a per-disk Unix socket under `socket_dir`.
    Local {
        /// Directory to create per-disk socket files in.
        socket_dir: PathBuf,
    },
    /// Start a server listening on `base_port + worker_index`, for a
    /// remote worker.
    Remote {
        /// The first port in the disjoint range workers are assigned.
        base_port: u16,
    },
}

/// One restore run's full configuration.
pub struct RestoreRunConfig {
    /// Directory holding the stream files, sidecars, and domain
    /// configuration snapshot to restore from.
    pub input_dir: PathBuf,
    /// Directory to create restored disk images (and, when requested, an
    /// adjusted domain configuration snapshot) in.
    pub output_dir: PathBuf,
    /// Stop replaying each disk's chain after the file whose checkpoint
    /// name matches this value.
    pub until: Option<String>,
    /// Disk targets to restore; empty means every disk discovered in
    /// `input_dir`.
    pub disk_filter: Vec<String>,
    /// Requested worker count; clamped to the selected disk count.
    pub worker_count: usize,
    /// Whether to rewrite the domain configuration snapshot's disk
    /// sources to point at the restored images (and drop disks that were
    /// filtered out of this run).
    pub adjust_config: bool,
    /// Whether to call `Hypervisor::define_domain` with the (possibly
    /// adjusted) configuration once restore completes.
    pub define: bool,
    /// How restore-side NBD servers are exposed.
    pub transport: RestoreTransportMode,
    /// Which diagnostic categories each worker thread (and the calling
    /// thread) records events for.
    pub verbosity: VerbosityConfig,
}
