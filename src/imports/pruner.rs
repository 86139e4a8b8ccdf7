use super::commands::{Cmd, CommandTracker};
use super::index::{self, ImportIndex};
use super::live::StatusTable;
use super::record::{status_label, ImportResult, ImportStatus};
use crate::config::PruneSettings;
use crate::error::{Error, Result};
use crate::fmt;
use crate::log_ctx::{debug_ctx, error_ctx, info_ctx, warn_ctx, LogContext};
use crate::pvr::{ImportMode, Pvr, QueueItem};
use chrono::Utc;
use std::collections::btree_map::{BTreeMap, Entry};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Counts and bytes freed by one prune run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneSummary {
    pub imports: usize,
    pub deletions: usize,
    pub invalid_dl: usize,
    pub forced_failures: usize,
    pub total_freed: u64,
    pub queue_failed: usize,
    pub queue_cleanup: usize,
}

#[derive(Debug, Clone, Copy)]
enum Freed {
    Import,
    Deletion,
    InvalidDl,
}

impl PruneSummary {
    fn add_freed(&mut self, kind: Freed, size: Option<u64>) {
        match kind {
            Freed::Import => self.imports += 1,
            Freed::Deletion => self.deletions += 1,
            Freed::InvalidDl => self.invalid_dl += 1,
        }
        self.total_freed += size.unwrap_or(0);
    }
}

/// Statuses whose directories are removed without asking any PVR, in
/// deletion order. `None` is an orphan.
const CLEANUP_ORDER: [Option<ImportStatus>; 5] = [
    Some(ImportStatus::Empty),
    Some(ImportStatus::Junk),
    Some(ImportStatus::Imported),
    Some(ImportStatus::DlFailed),
    None,
];

/// Reconciles the download root against PVR state.
pub struct Pruner {
    pub(super) settings: PruneSettings,
    pub(super) index: ImportIndex,
}

impl Pruner {
    /// Scans the download root. Feed history through
    /// [`HistoryConsumer`](crate::app::HistoryConsumer) before pruning.
    pub fn new(settings: PruneSettings) -> Result<Self> {
        let index = index::find_imports(&settings, Utc::now())?;
        debug!(
            "found {} downloads in {}",
            index.len(),
            settings.download_root.display()
        );
        Ok(Self { settings, index })
    }

    pub fn settings(&self) -> &PruneSettings {
        &self.settings
    }

    pub fn index(&self) -> &ImportIndex {
        &self.index
    }

    /// Runs one reconciliation pass. `pvrs` are the PVRs whose queues get
    /// swept for unclaimed failed downloads.
    pub fn prune(&mut self, pvrs: &[Arc<dyn Pvr>]) -> Result<PruneSummary> {
        info!("stats: {}", self.import_stats());
        let mut summary = PruneSummary::default();

        self.cleanup(&mut summary);

        let mut tracker = CommandTracker::new()?;
        let sizes_before = self.queue_imports(&mut tracker)?;

        let unknown: Vec<&str> = self
            .index
            .records()
            .iter()
            .filter(|rec| rec.status == Some(ImportStatus::Grabbed) && rec.pvr.is_none())
            .map(|rec| rec.name.as_str())
            .collect();
        if !unknown.is_empty() {
            error!("unknown imports left: {:?}", unknown);
        }

        let queue_cleanup = self.await_imports(tracker, &sizes_before, &mut summary)?;
        self.cleanup_queues(&queue_cleanup, &mut summary)?;
        self.sweep_queues(pvrs, &mut summary)?;

        info!(
            "queue deletions: {} failed, {} cleanup",
            summary.queue_failed, summary.queue_cleanup
        );
        Ok(summary)
    }

    fn import_stats(&self) -> String {
        let mut counts: BTreeMap<Option<ImportStatus>, BTreeMap<&str, usize>> = BTreeMap::new();
        for rec in self.index.records() {
            let pvr = match rec.status {
                Some(ImportStatus::Grabbed | ImportStatus::Imported | ImportStatus::DlFailed) => {
                    rec.pvr_name()
                }
                _ => "",
            };
            *counts.entry(rec.status).or_default().entry(pvr).or_default() += 1;
        }

        counts
            .iter()
            .map(|(status, by_pvr)| {
                let label = status_label(*status);
                match by_pvr.get("") {
                    Some(n) if by_pvr.len() == 1 => format!("{}={}", label, n),
                    _ => {
                        let pvrs: Vec<String> =
                            by_pvr.iter().map(|(pvr, n)| format!("{}:{}", pvr, n)).collect();
                        format!("{}=[{}]", label, pvrs.join(","))
                    }
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn cleanup(&self, summary: &mut PruneSummary) {
        for status in CLEANUP_ORDER {
            let label = status_label(status).to_uppercase();
            for rec in self.index.records().iter().filter(|rec| rec.status == status) {
                let size = rec.dir.size();
                info_ctx!(rec.log, "deleting {} dir", label);
                if let Err(e) = rec.dir.remove() {
                    warn_ctx!(rec.log.with("err", e), "couldn't delete dir");
                }
                summary.add_freed(Freed::Deletion, size);
            }
        }
    }

    /// Starts a downloaded-directory scan for every grabbed record, reusing
    /// a scan the PVR is already running for the same path.
    fn queue_imports(
        &self,
        tracker: &mut CommandTracker<usize>,
    ) -> Result<HashMap<usize, Option<u64>>> {
        let mut groups: Vec<(Arc<dyn Pvr>, Vec<usize>)> = Vec::new();
        for (idx, rec) in self.index.records().iter().enumerate() {
            if rec.status != Some(ImportStatus::Grabbed) {
                continue;
            }
            let Some(pvr) = &rec.pvr else {
                continue;
            };
            match groups.iter_mut().find(|(p, _)| p.name() == pvr.name()) {
                Some((_, idxs)) => idxs.push(idx),
                None => groups.push((Arc::clone(pvr), vec![idx])),
            }
        }

        let mut sizes_before = HashMap::new();
        for (pvr, idxs) in groups {
            let mut existing: Vec<_> = pvr
                .commands()?
                .into_iter()
                .filter(|c| c.name == pvr.downloaded_scan_command())
                .collect();
            existing.sort_by_key(|c| c.started);

            for idx in idxs {
                let rec = self.index.record(idx);
                let size = rec.dir.size();
                debug_ctx!(
                    rec.log.with("size", fmt::size_or_unknown(size)),
                    "calculated size before import"
                );
                sizes_before.insert(idx, size);

                let mount = rec.dir.mount().to_string_lossy();
                let running = existing
                    .iter()
                    .find(|c| c.body.path.as_deref() == Some(&*mount));
                let id = match running {
                    Some(cmd) => {
                        info_ctx!(rec.log.with("id", cmd.id), "found running import command");
                        cmd.id
                    }
                    None => {
                        info_ctx!(rec.log, "running command");
                        pvr.downloaded_scan(rec.dir.mount(), rec.nzo_id.as_deref(), ImportMode::Move)?
                            .id
                    }
                };
                tracker.push(Cmd::new(Arc::clone(&pvr), id, idx));
            }
        }
        Ok(sizes_before)
    }

    /// Waits for import commands and applies the result policy, retrying
    /// once through a manual copy and rescan. Returns the records whose
    /// queue entries need removing, flagged when they must be blacklisted.
    fn await_imports(
        &self,
        mut tracker: CommandTracker<usize>,
        sizes_before: &HashMap<usize, Option<u64>>,
        summary: &mut PruneSummary,
    ) -> Result<Vec<(usize, bool)>> {
        let mut queue_cleanup = Vec::new();
        let mut table = self.settings.live_status.then(|| StatusTable::new(io::stderr()));

        while !tracker.is_empty() {
            let index = &self.index;
            let finished = tracker.wait_with(self.settings.refresh_interval, |cmds, statuses| {
                let Some(table) = table.as_mut() else {
                    return;
                };
                let rows = cmds
                    .iter()
                    .zip(statuses)
                    .map(|(cmd, st)| (index.record(cmd.obj).name.clone(), *st));
                if let Err(e) = table.render(rows) {
                    debug!("couldn't render status table: {}", e);
                }
            })?;

            for (mut cmd, status) in finished {
                let idx = cmd.obj;
                let rec = self.index.record(idx);
                let result = rec.check_result(status, self.settings.import_grace, Utc::now())?;
                let log = rec.log.with("import_status", result.as_str());
                let freed = sizes_before.get(&idx).copied().flatten();

                match result {
                    ImportResult::Ok | ImportResult::OkLeftovers => {
                        info_ctx!(log, "imported {}", fmt::size_or_unknown(freed));
                        queue_cleanup.push((idx, false));
                        summary.add_freed(Freed::Import, freed);
                    }
                    ImportResult::Err | ImportResult::Grace if cmd.exec_count() > 1 => {
                        error_ctx!(log, "forced import failed");
                        summary.forced_failures += 1;
                    }
                    ImportResult::Err | ImportResult::Grace => {
                        info_ctx!(log, "normal import failed, forcing import");
                        if let Err(e) = rec.copy_to_dest() {
                            error_ctx!(log.with("err", e), "couldn't copy files");
                            summary.forced_failures += 1;
                            continue;
                        }
                        let scannable_id =
                            rec.scannable_id.ok_or(Error::MissingField("scannableId"))?;
                        info_ctx!(log, "requesting PVR {} to scan files", cmd.pvr().name());
                        let id = cmd.pvr().rescan(scannable_id)?.id;
                        cmd.set_id(id);
                        tracker.push(cmd);
                    }
                    ImportResult::InvalidDl => {
                        info_ctx!(log, "deleted {} of invalid download", fmt::size_or_unknown(freed));
                        queue_cleanup.push((idx, true));
                        summary.add_freed(Freed::InvalidDl, freed);
                    }
                }
            }

            info!(
                "freed {} after {} imports, {} deletions, {} invalid_dl",
                fmt::size(summary.total_freed),
                summary.imports,
                summary.deletions,
                summary.invalid_dl
            );
        }
        Ok(queue_cleanup)
    }

    /// Removes finished downloads from their PVR's queue.
    fn cleanup_queues(
        &self,
        queue_cleanup: &[(usize, bool)],
        summary: &mut PruneSummary,
    ) -> Result<()> {
        let mut queues: BTreeMap<String, Vec<QueueItem>> = BTreeMap::new();
        for &(idx, failed) in queue_cleanup {
            let rec = self.index.record(idx);
            let Some(pvr) = &rec.pvr else {
                continue;
            };
            let queue = match queues.entry(pvr.name().to_string()) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(pvr.queue()?),
            };

            let item = rec
                .nzo_id
                .as_deref()
                .and_then(|nzo_id| queue.iter().find(|item| item.has_download_id(nzo_id)));
            let Some(item) = item else {
                warn_ctx!(
                    rec.log,
                    "item not found in PVR queue, couldn't {}",
                    if failed { "mark failed" } else { "delete" }
                );
                continue;
            };

            pvr.queue_del(item.id, failed)?;
            let log = rec.log.with("queue_item", item.id);
            if failed {
                info_ctx!(log, "marked as failed");
                summary.queue_failed += 1;
            } else {
                info_ctx!(log, "deleted from queue");
                summary.queue_cleanup += 1;
            }
        }
        Ok(())
    }

    /// Blacklists queue entries the PVR gave up on that no directory here
    /// accounts for.
    fn sweep_queues(&self, pvrs: &[Arc<dyn Pvr>], summary: &mut PruneSummary) -> Result<()> {
        let known: HashSet<String> = self
            .index
            .records()
            .iter()
            .filter_map(|rec| rec.nzo_id.as_deref().map(str::to_lowercase))
            .collect();

        for pvr in pvrs {
            for item in pvr.queue()? {
                let is_known = item
                    .download_id
                    .as_deref()
                    .is_some_and(|id| known.contains(&id.to_lowercase()));
                if is_known {
                    continue;
                }
                let Some(err) = item.fatal_error() else {
                    continue;
                };
                warn_ctx!(
                    LogContext::new()
                        .with("pvr", pvr.name())
                        .with("item", &item.title)
                        .with("err", err),
                    "no corresponding import found, marking as failed"
                );
                pvr.queue_del(item.id, true)?;
                summary.queue_failed += 1;
            }
        }
        Ok(())
    }
}
