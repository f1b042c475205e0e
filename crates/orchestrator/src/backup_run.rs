//! crates/orchestrator/src/backup_run.rs
//!
//! `run_backup`: the whole-domain backup entry point. Resolves the
//! checkpoint assignment once, starts (or skips, for an offline run) the
//! hypervisor job, fans disks out across a static round-robin partition
//! of worker threads, and commits the checkpoint chain once every worker
//! has reported back.

use std::fs;

use backup::error::BackupError;
use backup::nbd_server::NbdServerLauncher;
use backup::sink::OutputSink;
use backup::types::{BackupDiskRequest, BackupOutcome, EndpointSource};
use checkpoint::{chain_path, commit_checkpoint, handle_checkpoints, read_chain, record_checkpoint, redefine_chain, BackupMode};
use hypervisor::{BackupJobSpec, DiskSpec, Hypervisor};

use crate::cancel::CancellationToken;
use crate::config::{BackupRunConfig, TransportMode};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::ports::PortAllocator;
use crate::select::select_disks;

/// What one backup run produced.
pub struct BackupRunSummary {
    /// Successful per-disk outcomes, in worker-completion order.
    pub outcomes: Vec<BackupOutcome>,
    /// Per-disk failures; other disks still complete.
    pub failures: Vec<(String, BackupError)>,
    /// Whether the run was cut short by an interrupt before every disk
    /// finished.
    pub cancelled: bool,
    /// Every diagnostic event recorded across the calling thread and every
    /// worker thread, collected for the `cli` front end to render.
    pub events: Vec<logging::DiagnosticEvent>,
    /// The run-wide warning count, for the caller's exit-code decision.
    pub warnings: u64,
}

/// One update a worker thread reports back to the collecting thread.
enum WorkerUpdate {
    Disk(Result<BackupOutcome, (String, BackupError)>),
    Events(Vec<logging::DiagnosticEvent>),
}

/// Rejects `output_dir` if it contains a `.partial` file left behind by a
/// prior failed run. Callers gate this to `inc`/`diff`: a `full`/`copy`
/// run overwrites or replaces whatever is there, so a stale partial is not
/// its problem.
fn partial_residue(output_dir: &std::path::Path) -> OrchestratorResult<()> {
    let entries = fs::read_dir(output_dir).map_err(|source| OrchestratorError::Io { path: output_dir.display().to_string(), source })?;
    for entry in entries {
        let entry = entry.map_err(|source| OrchestratorError::Io { path: output_dir.display().to_string(), source })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "partial") {
            return Err(OrchestratorError::PartialResidue { path: path.display().to_string() });
        }
    }
    Ok(())
}

/// Builds the `EndpointSource` one disk's worker dials from, given the
/// job handle (for an online run) and this worker's assigned slot.
fn endpoint_source<'a>(
    transport: &'a TransportMode,
    job: Option<&hypervisor::BackupJobHandle>,
    disk: &DiskSpec,
    worker_index: usize,
    launcher: &'a dyn NbdServerLauncher,
    ports: Option<&[u16]>,
) -> OrchestratorResult<EndpointSource<'a>> {
    match transport {
        TransportMode::Online => {
            let job = job.expect("online transport always starts a job");
            let endpoint = job.endpoint(&disk.target).ok_or_else(|| OrchestratorError::Io {
                path: disk.target.clone(),
                source: std::io::Error::other(format!("backup job handle has no endpoint for disk {}", disk.target)),
            })?;
            Ok(EndpointSource::Online(endpoint.clone()))
        }
        TransportMode::OfflineLocal { socket_dir } => {
            Ok(EndpointSource::OfflineLocal { launcher, socket_path: socket_dir.join(format!("{}.sock", disk.target)) })
        }
        TransportMode::OfflineRemote { .. } => {
            let ports = ports.expect("offline remote transport always computes a port table");
            let port = ports[worker_index % ports.len()];
            Ok(EndpointSource::OfflineRemote { launcher, port })
        }
    }
}

/// Copies a boot-auxiliary file (NVRAM store, direct-boot kernel/loader)
/// referenced by the domain's configuration into `output_dir`, under its
/// own base name, so a restore run can recreate it alongside the domain.
fn copy_boot_aux(output_dir: &std::path::Path, source: &std::path::Path) -> OrchestratorResult<()> {
    let Some(name) = source.file_name() else { return Ok(()) };
    let destination = output_dir.join(name);
    fs::copy(source, &destination).map(|_| ()).map_err(|source_err| OrchestratorError::Io { path: destination.display().to_string(), source: source_err })
}

/// Shells out to `qemu-img info --output=json` and writes its raw JSON
/// stdout as `disk_target`'s sidecar, so `restore::qcow::read_qcow_options`
/// can parse it back byte-for-byte on the restore side.
fn write_qcow_sidecar(sink: &dyn OutputSink, disk_target: &str, ident: &str, source_path: &std::path::Path) -> OrchestratorResult<()> {
    let output = std::process::Command::new("qemu-img")
        .arg("info")
        .arg("--output=json")
        .arg(source_path)
        .output()
        .map_err(|source| OrchestratorError::Io { path: source_path.display().to_string(), source })?;
    if !output.status.success() {
        logging::warn_log!("qemu-img info failed for {}: sidecar not written", source_path.display());
        return Ok(());
    }
    let name = backup::naming::qcow_sidecar_name(disk_target, ident);
    let mut writer = sink.create(&name).map_err(|source| OrchestratorError::Io { path: name.clone(), source })?;
    std::io::Write::write_all(&mut writer, &output.stdout).map_err(|source| OrchestratorError::Io { path: name.clone(), source })?;
    Ok(())
}

/// Runs a full backup of `config.domain`, writing one stream file (or raw
/// image) per selected disk plus the checkpoint chain, qcow sidecars, and
/// domain configuration snapshot.
pub fn run_backup(
    config: &BackupRunConfig,
    hypervisor: &dyn Hypervisor,
    launcher: &dyn NbdServerLauncher,
    sink: &dyn OutputSink,
    cancel: &CancellationToken,
) -> OrchestratorResult<BackupRunSummary> {
    logging::reset_warning_count();
    logging::init(config.verbosity);

    let domain_info = hypervisor.get_domain(&config.domain)?;
    let available: Vec<String> = domain_info.disks.iter().map(|disk| disk.target.clone()).collect();
    let selected_targets = select_disks(&available, &config.include_disks, &config.exclude_disks);
    if selected_targets.is_empty() {
        return Err(OrchestratorError::NoDisksSelected { domain: config.domain.clone() });
    }
    let selected_disks: Vec<&DiskSpec> = domain_info.disks.iter().filter(|disk| selected_targets.contains(&disk.target)).collect();

    let prefix = config.prefix.clone();
    let chain_file = chain_path(&config.output_dir, &prefix);
    let chain = read_chain(&chain_file)?;

    let assignment = handle_checkpoints(hypervisor, &config.domain, &prefix, config.mode, &chain, &chain_file)?;
    let resolved_mode = config.mode.resolve(chain.is_empty());

    if matches!(resolved_mode, BackupMode::Inc | BackupMode::Diff) {
        partial_residue(&config.output_dir)?;
    }

    let job = if matches!(config.transport, TransportMode::Online) {
        let chain_for_redefine: Vec<String> = if matches!(resolved_mode, BackupMode::Full) { Vec::new() } else { chain.clone() };
        redefine_chain(hypervisor, &config.domain, &chain_for_redefine)?;

        let spec = BackupJobSpec { disks: &selected_targets, checkpoint: assignment.name.as_deref(), parent_checkpoint: assignment.parent.as_deref() };
        Some(
            hypervisor
                .start_backup(&config.domain, &spec)
                .map_err(|source| OrchestratorError::JobStart { domain: config.domain.clone(), source })?,
        )
    } else {
        None
    };

    let worker_count = if sink.supports_partial() { config.worker_count.clamp(1, selected_disks.len()) } else { 1 };

    let ports = match &config.transport {
        TransportMode::OfflineRemote { base_port } => Some(PortAllocator::new(*base_port).disjoint(worker_count)?),
        _ => None,
    };

    let (tx, rx) = crossbeam_channel::unbounded::<WorkerUpdate>();

    let (outcomes, failures, mut events) = std::thread::scope(|scope| {
        for worker_index in 0..worker_count {
            let tx = tx.clone();
            let job = job.as_ref();
            let ports = ports.as_deref();
            let cancel = cancel.handle();
            let verbosity = config.verbosity;
            scope.spawn(move || {
                logging::init(verbosity);
                for (disk_index, disk) in selected_disks.iter().enumerate() {
                    if disk_index % worker_count != worker_index {
                        continue;
                    }
                    if cancel.is_cancelled() {
                        break;
                    }
                    let result = (|| -> Result<BackupOutcome, BackupError> {
                        let source = endpoint_source(&config.transport, job, disk, worker_index, launcher, ports)
                            .map_err(|err| BackupError::NbdServerStartFailed { disk: disk.target.clone(), reason: err.to_string() })?;
                        let request = BackupDiskRequest {
                            disk,
                            worker_index,
                            mode: resolved_mode,
                            checkpoint_name: assignment.name.as_deref(),
                            parent_checkpoint: assignment.parent.as_deref(),
                            endpoint_source: source,
                            raw_passthrough_requested: config.raw_passthrough,
                            compression: config.compression,
                            epoch_seconds: config.epoch_seconds,
                        };
                        backup::backup_disk(&request, sink, hypervisor)
                    })();
                    let _ = tx.send(WorkerUpdate::Disk(result.map_err(|err| (disk.target.clone(), err))));
                }
                let _ = tx.send(WorkerUpdate::Events(logging::drain_events()));
            });
        }
        drop(tx);

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        let mut events = Vec::new();
        for update in rx.iter() {
            match update {
                WorkerUpdate::Disk(Ok(outcome)) => outcomes.push(outcome),
                WorkerUpdate::Disk(Err((disk, err))) => failures.push((disk, err)),
                WorkerUpdate::Events(mut worker_events) => events.append(&mut worker_events),
            }
        }
        (outcomes, failures, events)
    });

    if matches!(config.transport, TransportMode::Online) {
        hypervisor.stop_backup(&config.domain).map_err(OrchestratorError::from)?;
    }

    let cancelled = cancel.is_cancelled();

    if failures.is_empty() && !cancelled {
        commit_checkpoint(&chain_file, resolved_mode, &chain, &assignment)?;
        record_checkpoint(hypervisor, &config.domain, &assignment)?;

        let ident = assignment.name.clone().unwrap_or_else(|| config.domain.clone());
        for disk in &selected_disks {
            if disk.format.eq_ignore_ascii_case("qcow2") {
                write_qcow_sidecar(sink, &disk.target, &ident, &disk.source_path)?;
            }
        }

        let config_xml = hypervisor.get_domain_config(&config.domain)?;
        let config_name = backup::naming::domain_config_name(&ident);
        let mut writer = sink.create(&config_name).map_err(|source| OrchestratorError::Io { path: config_name.clone(), source })?;
        std::io::Write::write_all(&mut writer, config_xml.as_bytes()).map_err(|source| OrchestratorError::Io { path: config_name, source })?;
        drop(writer);

        for aux in [&domain_info.nvram, &domain_info.kernel, &domain_info.loader].into_iter().flatten() {
            copy_boot_aux(&config.output_dir, aux)?;
        }

        logging::info_log!(Checkpoint, 1, "backup of {} committed checkpoint {:?}", config.domain, assignment.name);
    } else if cancelled {
        logging::warn_log!("backup of {} cancelled; checkpoint not committed", config.domain);
    }

    events.append(&mut logging::drain_events());
    let warnings = logging::warning_count();

    Ok(BackupRunSummary { outcomes, failures, cancelled, events, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    use backup::nbd_server::ProcessNbdServerLauncher;
    use backup::sink::FsOutputSink;
    use std::collections::HashMap;

    use checkpoint::BackupMode;
    use hypervisor::FakeHypervisor;

    #[test]
    fn partial_residue_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vda.full.data.partial"), b"").unwrap();
        let err = partial_residue(dir.path()).unwrap_err();
        assert!(matches!(err, OrchestratorError::PartialResidue { .. }));
    }

    #[test]
    fn no_disks_selected_is_rejected_before_any_worker_runs() {
        let dir = tempfile::tempdir().unwrap();
        let hv = FakeHypervisor::new();
        hv.add_domain("web01", vec![DiskSpec { target: "vda".into(), format: "raw".into(), source_path: "/dev/null".into() }], "<domain/>");
        hv.set_backup_endpoints(HashMap::new());

        let launcher = ProcessNbdServerLauncher::new();
        let sink = FsOutputSink::new(dir.path());
        let cancel = CancellationToken::inert();

        let config = BackupRunConfig {
            domain: "web01".into(),
            prefix: "web01".into(),
            mode: BackupMode::Full,
            output_dir: dir.path().to_path_buf(),
            include_disks: vec!["does-not-exist".into()],
            exclude_disks: vec![],
            worker_count: 1,
            compression: None,
            raw_passthrough: false,
            strict: false,
            transport: TransportMode::OfflineLocal { socket_dir: dir.path().to_path_buf() },
            epoch_seconds: 0,
            verbosity: logging::VerbosityConfig::default(),
        };

        let err = run_backup(&config, &hv, &launcher, &sink, &cancel).unwrap_err();
        assert!(matches!(err, OrchestratorError::NoDisksSelected { .. }));
    }
}
