use crate::error::{Error, Result};
use crate::pvr::Pvr;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Concurrent individual status lookups per PVR.
pub const LOOKUP_WORKERS: usize = 8;

/// Lifecycle of a remote PVR command. The vocabulary is closed: anything
/// else the PVR reports is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    Queued,
    Started,
    Completed,
    Failed,
    Aborted,
    Cancelled,
    Orphaned,
}

impl CommandStatus {
    pub fn is_processing(self) -> bool {
        matches!(self, CommandStatus::Queued | CommandStatus::Started)
    }

    pub fn is_final(self) -> bool {
        !self.is_processing()
    }

    pub fn is_error(self) -> bool {
        self.is_final() && self != CommandStatus::Completed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Queued => "queued",
            CommandStatus::Started => "started",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
            CommandStatus::Aborted => "aborted",
            CommandStatus::Cancelled => "cancelled",
            CommandStatus::Orphaned => "orphaned",
        }
    }
}

impl FromStr for CommandStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "queued" => CommandStatus::Queued,
            "started" => CommandStatus::Started,
            "completed" => CommandStatus::Completed,
            "failed" => CommandStatus::Failed,
            "aborted" => CommandStatus::Aborted,
            "cancelled" => CommandStatus::Cancelled,
            "orphaned" => CommandStatus::Orphaned,
            other => return Err(Error::UnknownCommandStatus(other.to_string())),
        })
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote command issued on behalf of `obj`.
///
/// `exec_count` is the number of distinct remote executions attempted so
/// far; re-setting the same id doesn't count.
pub struct Cmd<T> {
    pvr: Arc<dyn Pvr>,
    id: u64,
    exec_count: u32,
    pub obj: T,
}

impl<T> Cmd<T> {
    pub fn new(pvr: Arc<dyn Pvr>, id: u64, obj: T) -> Self {
        Self {
            pvr,
            id,
            exec_count: 1,
            obj,
        }
    }

    pub fn pvr(&self) -> &Arc<dyn Pvr> {
        &self.pvr
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn exec_count(&self) -> u32 {
        self.exec_count
    }

    pub fn set_id(&mut self, id: u64) {
        if id != self.id {
            self.id = id;
            self.exec_count += 1;
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Cmd<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cmd")
            .field("pvr", &self.pvr.name())
            .field("id", &self.id)
            .field("exec_count", &self.exec_count)
            .field("obj", &self.obj)
            .finish()
    }
}

/// Tracks commands across PVRs until they all reach a final status.
pub struct CommandTracker<T> {
    cmds: Vec<Cmd<T>>,
    last: Option<Vec<CommandStatus>>,
    pool: ThreadPool,
}

impl<T> CommandTracker<T> {
    pub fn new() -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(LOOKUP_WORKERS)
            .thread_name(|i| format!("cmd-lookup-{}", i))
            .build()?;
        Ok(Self {
            cmds: Vec::new(),
            last: None,
            pool,
        })
    }

    pub fn push(&mut self, cmd: Cmd<T>) {
        self.last = None;
        self.cmds.push(cmd);
    }

    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    pub fn cmds(&self) -> &[Cmd<T>] {
        &self.cmds
    }

    /// Current status of every tracked command, in tracking order.
    ///
    /// One bulk listing per PVR; commands missing from it are looked up
    /// individually on the worker pool.
    pub fn statuses(&mut self) -> Result<&[CommandStatus]> {
        let statuses = self.fetch_statuses()?;
        Ok(self.last.insert(statuses).as_slice())
    }

    /// Blocks until every tracked command is final, then hands them back
    /// paired with their final status. The tracker is left empty.
    pub fn wait(&mut self, refresh: Duration) -> Result<Vec<(Cmd<T>, CommandStatus)>> {
        self.wait_with(refresh, |_, _| {})
    }

    /// Like [`wait`](Self::wait), calling `on_poll` after every poll.
    pub fn wait_with<F>(
        &mut self,
        refresh: Duration,
        mut on_poll: F,
    ) -> Result<Vec<(Cmd<T>, CommandStatus)>>
    where
        F: FnMut(&[Cmd<T>], &[CommandStatus]),
    {
        let mut statuses = match self.last.take() {
            Some(statuses) => statuses,
            None => self.fetch_statuses()?,
        };
        on_poll(&self.cmds, &statuses);

        while !statuses.iter().all(|st| st.is_final()) {
            thread::sleep(refresh);
            statuses = self.fetch_statuses()?;
            on_poll(&self.cmds, &statuses);
        }

        Ok(self.cmds.drain(..).zip(statuses).collect())
    }

    fn fetch_statuses(&self) -> Result<Vec<CommandStatus>> {
        let mut out: Vec<Option<CommandStatus>> = vec![None; self.cmds.len()];

        let mut groups: Vec<(&Arc<dyn Pvr>, Vec<usize>)> = Vec::new();
        for (idx, cmd) in self.cmds.iter().enumerate() {
            match groups.iter_mut().find(|(pvr, _)| pvr.name() == cmd.pvr.name()) {
                Some((_, idxs)) => idxs.push(idx),
                None => groups.push((&cmd.pvr, vec![idx])),
            }
        }

        for (pvr, idxs) in groups {
            let mut pending: HashMap<u64, usize> = HashMap::with_capacity(idxs.len());
            for idx in idxs {
                let id = self.cmds[idx].id;
                if pending.insert(id, idx).is_some() {
                    return Err(Error::DuplicateCommand {
                        pvr: pvr.name().to_string(),
                        id,
                    });
                }
            }

            for raw in pvr.commands()? {
                if let Some(idx) = pending.remove(&raw.id) {
                    out[idx] = Some(raw.status.parse()?);
                }
            }

            if pending.is_empty() {
                continue;
            }
            debug!(
                "looking up {} commands individually on {}",
                pending.len(),
                pvr.name()
            );
            let remaining: Vec<(u64, usize)> = pending.into_iter().collect();
            let found = self.pool.install(|| {
                remaining
                    .par_iter()
                    .map(|&(id, idx)| {
                        let raw = pvr.command(id)?;
                        Ok((idx, raw.status.parse::<CommandStatus>()?))
                    })
                    .collect::<Result<Vec<_>>>()
            })?;
            for (idx, status) in found {
                out[idx] = Some(status);
            }
        }

        out.into_iter()
            .enumerate()
            .map(|(idx, status)| status.ok_or(Error::MissingCommandStatus(self.cmds[idx].id)))
            .collect()
    }
}
