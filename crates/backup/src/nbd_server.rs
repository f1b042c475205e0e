//! crates/backup/src/nbd_server.rs
//!
//! [`NbdServerLauncher`]: starts the background NBD server an offline
//! backup connects to directly (no hypervisor-managed backup job exists
//! when the domain is powered off). An online backup never uses this —
//! its endpoint comes back from [`hypervisor::Hypervisor::start_backup`].

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;

use crate::error::{BackupError, BackupResult};

/// A running background NBD server process, killed on drop.
pub struct NbdServerHandle {
    child: Option<Child>,
}

impl NbdServerHandle {
    fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }
}

impl Drop for NbdServerHandle {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Starts a background process exposing one disk image as an NBD export,
/// used only by offline backups/restores.
pub trait NbdServerLauncher: Send + Sync {
    /// Starts a server on a local Unix socket at `socket_path`.
    fn start_local(&self, disk_path: &Path, disk_format: &str, socket_path: &Path, read_only: bool) -> BackupResult<NbdServerHandle>;

    /// Starts a server listening on `port` of every local interface, for a
    /// remote worker to dial.
    fn start_remote(&self, disk_path: &Path, disk_format: &str, port: u16, read_only: bool) -> BackupResult<NbdServerHandle>;
}

/// Shells out to `qemu-nbd`, the reference NBD server implementation
/// shipped alongside QEMU/libvirt hosts.
pub struct ProcessNbdServerLauncher {
    binary: PathBuf,
    startup_grace: Duration,
}

impl Default for ProcessNbdServerLauncher {
    fn default() -> Self {
        Self { binary: PathBuf::from("qemu-nbd"), startup_grace: Duration::from_millis(200) }
    }
}

impl ProcessNbdServerLauncher {
    /// Uses the default `qemu-nbd` binary resolved from `$PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an explicit binary path, for tests that stub the server out.
    #[must_use]
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into(), ..Self::default() }
    }

    fn spawn(&self, mut command: Command, disk: &str) -> BackupResult<NbdServerHandle> {
        let child = command
            .spawn()
            .map_err(|err| BackupError::NbdServerStartFailed { disk: disk.to_string(), reason: err.to_string() })?;
        std::thread::sleep(self.startup_grace);
        Ok(NbdServerHandle::new(child))
    }
}

impl NbdServerLauncher for ProcessNbdServerLauncher {
    fn start_local(&self, disk_path: &Path, disk_format: &str, socket_path: &Path, read_only: bool) -> BackupResult<NbdServerHandle> {
        let mut command = Command::new(&self.binary);
        command.arg("--socket").arg(socket_path).arg("--format").arg(disk_format).arg("--persistent");
        if read_only {
            command.arg("--read-only");
        }
        command.arg(disk_path);
        self.spawn(command, &disk_path.to_string_lossy())
    }

    fn start_remote(&self, disk_path: &Path, disk_format: &str, port: u16, read_only: bool) -> BackupResult<NbdServerHandle> {
        let mut command = Command::new(&self.binary);
        command.arg("--port").arg(port.to_string()).arg("--format").arg(disk_format).arg("--persistent");
        if read_only {
            command.arg("--read-only");
        }
        command.arg(disk_path);
        self.spawn(command, &disk_path.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A launcher that records calls without spawning a real process, used
    /// by the engine's own test suite.
    pub struct NullNbdServerLauncher;

    impl NbdServerLauncher for NullNbdServerLauncher {
        fn start_local(&self, _disk_path: &Path, _disk_format: &str, _socket_path: &Path, _read_only: bool) -> BackupResult<NbdServerHandle> {
            Err(BackupError::NbdServerStartFailed { disk: "test".into(), reason: "null launcher never starts a server".into() })
        }

        fn start_remote(&self, _disk_path: &Path, _disk_format: &str, _port: u16, _read_only: bool) -> BackupResult<NbdServerHandle> {
            Err(BackupError::NbdServerStartFailed { disk: "test".into(), reason: "null launcher never starts a server".into() })
        }
    }

    #[test]
    fn null_launcher_reports_start_failure() {
        let launcher = NullNbdServerLauncher;
        let err = launcher.start_local(Path::new("/tmp/disk.img"), "raw", Path::new("/tmp/x.sock"), true).unwrap_err();
        assert!(matches!(err, BackupError::NbdServerStartFailed { .. }));
    }
}
