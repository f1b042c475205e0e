//! crates/restore/src/types.rs
//!
//! Request/outcome shapes for the per-disk restore pipeline, mirroring the
//! shapes `backup::types` defines for the backup pipeline.

use std::path::{Path, PathBuf};

use crate::nbd_server::NbdServerLauncher;

/// Where the restore-side NBD server listens, and how to reach it.
///
/// Restore never attaches to a live hypervisor export; it always starts its
/// own server in front of the freshly created target image.
pub enum RestoreEndpoint<'a> {
    /// Start a server on a local Unix socket.
    Local {
        /// Launcher used to start/stop the server process.
        launcher: &'a dyn NbdServerLauncher,
        /// Socket path to bind.
        socket_path: PathBuf,
    },
    /// Start a server listening on a TCP port, for a remote worker.
    Remote {
        /// Launcher used to start/stop the server process.
        launcher: &'a dyn NbdServerLauncher,
        /// Port to bind.
        port: u16,
    },
}

/// Cluster/format options recovered from a `*.qcow.json` sidecar, applied
/// when the image creator allocates the restore target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QcowOptions {
    /// qcow2 `compat` version string (e.g. `"1.1"`).
    pub compat: Option<String>,
    /// qcow2 cluster size in bytes.
    pub cluster_size: Option<u64>,
    /// Whether lazy refcounts were enabled on the source image.
    pub lazy_refcounts: Option<bool>,
}

/// One disk's restore request: its ordered chain of stream files, the
/// target path to create, and how to reach the restore-side NBD server.
pub struct RestoreDiskRequest<'a> {
    /// The disk target name (matches the `<target>` stream file prefix).
    pub disk_target: &'a str,
    /// Stream files to replay in chain order: base first, then inc/diff.
    pub chain_files: &'a [PathBuf],
    /// Path of the image to create and restore into. Must not exist.
    pub target_path: &'a Path,
    /// Disk image format to pass to the image creator (`qcow2`, `raw`, ...).
    pub disk_format: &'a str,
    /// Format-specific options recovered from a qcow sidecar, if any.
    pub qcow_options: Option<&'a QcowOptions>,
    /// Virtual (logical) size of the disk, from the base file's metadata.
    pub virtual_size: u64,
    /// Where restore should start its own NBD server.
    pub endpoint: RestoreEndpoint<'a>,
    /// Stop after replaying the chain file whose checkpoint name matches
    /// this value (inclusive), instead of applying the full chain.
    pub until: Option<&'a str>,
}

/// Result of restoring one disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// The disk target that was restored.
    pub disk_target: String,
    /// Total bytes written across all replayed chain files.
    pub restored_bytes: u64,
    /// How many chain files were actually replayed.
    pub files_applied: usize,
    /// The checkpoint name restore stopped at, if `until` cut the chain
    /// short of its full length.
    pub stopped_at: Option<String>,
}

/// Outcome of replaying a single chain file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Bytes written while replaying this file (sum of decoded DATA frame
    /// payload lengths).
    pub restored_bytes: u64,
    /// This file's checkpoint name, from its Meta frame.
    pub checkpoint_name: String,
    /// This file's parent checkpoint name, from its Meta frame.
    pub parent_checkpoint: String,
}
