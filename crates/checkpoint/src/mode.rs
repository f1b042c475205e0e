//! crates/checkpoint/src/mode.rs
//!
//! [`BackupMode`]: the level selector driving checkpoint assignment.

/// Backup level, selected on the CLI or resolved automatically from the
/// target directory's existing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupMode {
    /// A one-shot copy with no checkpoint chain interaction: the chain, if
    /// any, is left untouched.
    Copy,
    /// A full base backup: drops any existing hypervisor checkpoints and
    /// chain file, then starts a fresh chain at `<prefix>.0`.
    Full,
    /// An incremental backup against the last checkpoint in the chain.
    Inc,
    /// A differential backup against the last checkpoint in the chain,
    /// without extending it.
    Diff,
    /// Resolves to [`BackupMode::Full`] when the chain is empty, otherwise
    /// [`BackupMode::Inc`].
    Auto,
}

impl BackupMode {
    /// Resolves [`BackupMode::Auto`] against whether the chain is
    /// currently empty; all other modes are returned unchanged.
    #[must_use]
    pub fn resolve(self, chain_is_empty: bool) -> Self {
        match self {
            Self::Auto => {
                if chain_is_empty {
                    Self::Full
                } else {
                    Self::Inc
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_resolves_to_full_on_empty_chain() {
        assert_eq!(BackupMode::Auto.resolve(true), BackupMode::Full);
    }

    #[test]
    fn auto_resolves_to_inc_on_existing_chain() {
        assert_eq!(BackupMode::Auto.resolve(false), BackupMode::Inc);
    }

    #[test]
    fn non_auto_modes_pass_through() {
        assert_eq!(BackupMode::Diff.resolve(true), BackupMode::Diff);
        assert_eq!(BackupMode::Copy.resolve(false), BackupMode::Copy);
    }
}
