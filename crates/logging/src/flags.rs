//! Verbosity flags controlling which diagnostic categories are emitted.

/// Category of an info-level diagnostic event.
///
/// Each variant names a stage of the backup/restore pipeline this
/// workspace's diagnostics are reported against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoFlag {
    /// Extent enumeration and merge decisions.
    Extent,
    /// Per-chunk NBD read/write progress.
    Transfer,
    /// Checkpoint assignment and chain mutation.
    Checkpoint,
    /// Restore chain replay progress.
    Restore,
    /// NBD connection lifecycle (connect, negotiate, disconnect).
    Nbd,
    /// Worker pool scheduling.
    Worker,
}

/// Category of a debug-level diagnostic event.
///
/// Mirrors [`InfoFlag`] but gates the more verbose, developer-facing detail
/// emitted at `-d`/`-dd` verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugFlag {
    /// Extent enumeration and merge decisions.
    Extent,
    /// Per-chunk NBD read/write progress.
    Transfer,
    /// Checkpoint assignment and chain mutation.
    Checkpoint,
    /// Restore chain replay progress.
    Restore,
    /// NBD connection lifecycle (connect, negotiate, disconnect).
    Nbd,
    /// Worker pool scheduling.
    Worker,
}

macro_rules! verbosity_struct {
    ($name:ident) => {
        /// Per-category verbosity levels; `0` means the category is silent.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name {
            /// Verbosity level for extent enumeration and merge events.
            pub extent: u8,
            /// Verbosity level for per-chunk transfer events.
            pub transfer: u8,
            /// Verbosity level for checkpoint chain events.
            pub checkpoint: u8,
            /// Verbosity level for restore replay events.
            pub restore: u8,
            /// Verbosity level for NBD connection lifecycle events.
            pub nbd: u8,
            /// Verbosity level for worker pool scheduling events.
            pub worker: u8,
        }

        impl $name {
            /// Sets every category to the same level.
            pub fn set_all(&mut self, level: u8) {
                self.extent = level;
                self.transfer = level;
                self.checkpoint = level;
                self.restore = level;
                self.nbd = level;
                self.worker = level;
            }
        }
    };
}

verbosity_struct!(InfoVerbosity);
verbosity_struct!(DebugVerbosity);

impl InfoVerbosity {
    pub(crate) const fn level_for(&self, flag: InfoFlag) -> u8 {
        match flag {
            InfoFlag::Extent => self.extent,
            InfoFlag::Transfer => self.transfer,
            InfoFlag::Checkpoint => self.checkpoint,
            InfoFlag::Restore => self.restore,
            InfoFlag::Nbd => self.nbd,
            InfoFlag::Worker => self.worker,
        }
    }
}

impl DebugVerbosity {
    pub(crate) const fn level_for(&self, flag: DebugFlag) -> u8 {
        match flag {
            DebugFlag::Extent => self.extent,
            DebugFlag::Transfer => self.transfer,
            DebugFlag::Checkpoint => self.checkpoint,
            DebugFlag::Restore => self.restore,
            DebugFlag::Nbd => self.nbd,
            DebugFlag::Worker => self.worker,
        }
    }
}

/// Top-level verbosity configuration, installed once via [`crate::init`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerbosityConfig {
    /// Info-level category thresholds.
    pub info: InfoVerbosity,
    /// Debug-level category thresholds.
    pub debug: DebugVerbosity,
    /// Whether warnings are always emitted regardless of other settings.
    ///
    /// Warnings are unconditional diagnostics (missing qcow sidecar, absent
    /// optional config key); this flag only controls whether `warn_log!`
    /// also produces a human-readable line through the [`logging_sink`]
    /// facade's warning channel versus being recorded silently for the exit
    /// code calculation.
    pub warnings_visible: bool,
}

impl VerbosityConfig {
    /// Convenience constructor with every category set to `level`.
    #[must_use]
    pub fn verbose(level: u8) -> Self {
        let mut config = Self {
            warnings_visible: true,
            ..Self::default()
        };
        config.info.set_all(level);
        config.debug.set_all(level.saturating_sub(1));
        config
    }
}
