//! crates/checkpoint/src/assign.rs
//!
//! [`handle_checkpoints`]: resolves the checkpoint name/parent pair a
//! backup run should use, per the mode table in the domain model, and the
//! follow-up calls (`commit_checkpoint`, `redefine_chain`,
//! `record_checkpoint`) gated on the hypervisor confirming the job
//! started.

use std::path::Path;

use hypervisor::Hypervisor;

use crate::chain::{delete_chain, next_name, write_chain};
use crate::error::{CheckpointError, CheckpointResult};
use crate::mode::BackupMode;

/// The checkpoint name and parent a backup run should use, resolved by
/// [`handle_checkpoints`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointAssignment {
    /// The checkpoint name to create, or `None` for `copy` mode (no
    /// checkpoint is created).
    pub name: Option<String>,
    /// The parent checkpoint to base an incremental/differential backup
    /// on, or `None` for a full base or a `copy`.
    pub parent: Option<String>,
}

/// Resolves the checkpoint name/parent for `mode` against `chain`,
/// performing any hypervisor-side cleanup `full` mode requires and
/// enforcing foreign-checkpoint rejection ahead of any full/inc/diff run.
///
/// `chain_path` is consulted only by `full` mode (to delete a superseded
/// chain file); `copy`, `inc`, and `diff` never touch it here.
pub fn handle_checkpoints(
    hypervisor: &dyn Hypervisor,
    domain: &str,
    prefix: &str,
    mode: BackupMode,
    chain: &[String],
    chain_path: &Path,
) -> CheckpointResult<CheckpointAssignment> {
    let mode = mode.resolve(chain.is_empty());

    if !matches!(mode, BackupMode::Copy) {
        reject_foreign_checkpoints(hypervisor, domain, prefix)?;
    }

    match mode {
        BackupMode::Copy => Ok(CheckpointAssignment { name: None, parent: None }),
        BackupMode::Full => {
            if !chain.is_empty() {
                hypervisor
                    .remove_all_checkpoints(domain)
                    .map_err(|source| CheckpointError::RemoveCheckpointError { domain: domain.to_string(), source })?;
                delete_chain(chain_path)?;
            }
            Ok(CheckpointAssignment { name: Some(format!("{prefix}.0")), parent: None })
        }
        BackupMode::Inc => {
            let Some(last) = chain.last() else {
                return Err(CheckpointError::NoCheckpointsFound);
            };
            Ok(CheckpointAssignment { name: Some(next_name(prefix, chain)), parent: Some(last.clone()) })
        }
        BackupMode::Diff => {
            let Some(last) = chain.last() else {
                return Err(CheckpointError::NoCheckpointsFound);
            };
            Ok(CheckpointAssignment { name: Some(last.clone()), parent: Some(last.clone()) })
        }
        BackupMode::Auto => unreachable!("resolved above"),
    }
}

fn reject_foreign_checkpoints(hypervisor: &dyn Hypervisor, domain: &str, prefix: &str) -> CheckpointResult<()> {
    let foreign = hypervisor
        .has_foreign_checkpoint(domain, prefix)
        .map_err(|source| CheckpointError::QueryCheckpointError { domain: domain.to_string(), source })?;
    if let Some(name) = foreign {
        return Err(CheckpointError::Foreign { domain: domain.to_string(), name, prefix: prefix.to_string() });
    }
    Ok(())
}

/// Appends the newly assigned checkpoint to `chain` and persists the
/// result, for `full`/`inc` modes only, and only after the caller has
/// confirmed the hypervisor's `start_backup` succeeded. Returns the new
/// chain. `diff` and `copy` must not call this: neither extends the chain
/// file, since `diff` always bases on the same checkpoint and `copy`
/// creates none.
pub fn commit_checkpoint(
    chain_path: &Path,
    mode: BackupMode,
    chain: &[String],
    assignment: &CheckpointAssignment,
) -> CheckpointResult<Vec<String>> {
    let Some(name) = assignment.name.clone() else {
        return Ok(chain.to_vec());
    };
    let new_chain = match mode {
        BackupMode::Full => vec![name],
        BackupMode::Inc => {
            let mut chain = chain.to_vec();
            chain.push(name);
            chain
        }
        BackupMode::Diff | BackupMode::Copy | BackupMode::Auto => return Ok(chain.to_vec()),
    };
    write_chain(chain_path, &new_chain)?;
    logging::info_log!(Checkpoint, 1, "persisted checkpoint chain for {}: {} entries", chain_path.display(), new_chain.len());
    Ok(new_chain)
}

/// Re-declares `chain` to the hypervisor, required on every online backup
/// run since the hypervisor may not persist checkpoint metadata across its
/// own restarts.
pub fn redefine_chain(hypervisor: &dyn Hypervisor, domain: &str, chain: &[String]) -> CheckpointResult<()> {
    hypervisor
        .redefine_checkpoints(domain, chain)
        .map_err(|source| CheckpointError::RedefineCheckpointError { domain: domain.to_string(), source })
}

/// Records the assigned checkpoint at the hypervisor once the backup
/// engine confirms the disk(s) were written successfully.
pub fn record_checkpoint(hypervisor: &dyn Hypervisor, domain: &str, assignment: &CheckpointAssignment) -> CheckpointResult<()> {
    let Some(name) = &assignment.name else {
        return Ok(());
    };
    let parent = assignment.parent.as_deref().unwrap_or("");
    hypervisor
        .backup_checkpoint(domain, name, parent)
        .map_err(|source| CheckpointError::RecordCheckpointError { domain: domain.to_string(), source })
}
