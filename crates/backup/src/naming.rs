//! crates/backup/src/naming.rs
//!
//! The final stream-file naming grammar: `<disk_target>.<level>.data` for
//! full/copy, `<disk_target>.<level>.<checkpoint_name>.data` for inc, and
//! `<disk_target>.diff.<epoch_seconds>.data` for diff.

use checkpoint::BackupMode;

/// Builds the final (non-`.partial`) file name for one disk's stream
/// output.
///
/// `epoch_seconds` is only consulted for [`BackupMode::Diff`], since a
/// differential backup does not extend the chain and so has no checkpoint
/// name of its own to key the file name on.
#[must_use]
pub fn stream_file_name(disk_target: &str, mode: BackupMode, checkpoint_name: Option<&str>, epoch_seconds: u64) -> String {
    match mode {
        BackupMode::Copy => format!("{disk_target}.copy.data"),
        BackupMode::Full => format!("{disk_target}.full.data"),
        BackupMode::Inc => {
            let checkpoint = checkpoint_name.expect("inc mode always assigns a checkpoint name");
            format!("{disk_target}.inc.{checkpoint}.data")
        }
        BackupMode::Diff => format!("{disk_target}.diff.{epoch_seconds}.data"),
        BackupMode::Auto => unreachable!("BackupMode::Auto is resolved before naming"),
    }
}

/// The `.partial` working name a stream file is written under before its
/// atomic rename to [`stream_file_name`]'s result.
#[must_use]
pub fn partial_file_name(final_name: &str) -> String {
    format!("{final_name}.partial")
}

/// The image-format sidecar name for `disk_target`, keyed by a unique
/// identifier (typically the assigned checkpoint name, or the disk target
/// itself for `copy`).
#[must_use]
pub fn qcow_sidecar_name(disk_target: &str, ident: &str) -> String {
    format!("{disk_target}.{ident}.qcow.json")
}

/// The domain configuration file name for a run, keyed the same way as
/// [`qcow_sidecar_name`].
#[must_use]
pub fn domain_config_name(ident: &str) -> String {
    format!("vmconfig.{ident}.xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_and_copy_use_the_level_only() {
        assert_eq!(stream_file_name("vda", BackupMode::Full, None, 0), "vda.full.data");
        assert_eq!(stream_file_name("vda", BackupMode::Copy, None, 0), "vda.copy.data");
    }

    #[test]
    fn inc_embeds_the_checkpoint_name() {
        assert_eq!(stream_file_name("vda", BackupMode::Inc, Some("web01.2"), 0), "vda.inc.web01.2.data");
    }

    #[test]
    fn diff_embeds_epoch_seconds() {
        assert_eq!(stream_file_name("vda", BackupMode::Diff, None, 1_700_000_000), "vda.diff.1700000000.data");
    }

    #[test]
    fn partial_name_appends_suffix() {
        assert_eq!(partial_file_name("vda.full.data"), "vda.full.data.partial");
    }

    #[test]
    fn qcow_sidecar_and_domain_config_names() {
        assert_eq!(qcow_sidecar_name("vda", "web01.0"), "vda.web01.0.qcow.json");
        assert_eq!(domain_config_name("web01.0"), "vmconfig.web01.0.xml");
    }
}
