use super::commands::CommandStatus;
use crate::dl_dir::{DirStatus, DownloadDirectory};
use crate::error::{Error, Result};
use crate::fmt;
use crate::log_ctx::{error_ctx, info_ctx, warn_ctx, LogContext};
use crate::pvr::Pvr;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;

/// Classification of a download. `None` on a record means nothing has
/// claimed it yet (an orphan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImportStatus {
    Empty,
    Junk,
    Grabbed,
    Imported,
    DlFailed,
}

impl ImportStatus {
    pub fn from_dir(status: DirStatus) -> Option<Self> {
        match status {
            DirStatus::Empty => Some(ImportStatus::Empty),
            DirStatus::Junk => Some(ImportStatus::Junk),
            DirStatus::Unclassified => None,
        }
    }

    /// Filesystem-derived statuses that history can never override.
    pub fn is_terminal(self) -> bool {
        matches!(self, ImportStatus::Empty | ImportStatus::Junk)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImportStatus::Empty => "empty",
            ImportStatus::Junk => "junk",
            ImportStatus::Grabbed => "grabbed",
            ImportStatus::Imported => "imported",
            ImportStatus::DlFailed => "dl_failed",
        }
    }
}

pub fn status_label(status: Option<ImportStatus>) -> &'static str {
    status.map_or("orphan", ImportStatus::as_str)
}

/// Outcome of an import command once it reached a final status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportResult {
    Ok,
    OkLeftovers,
    Err,
    Grace,
    InvalidDl,
}

impl ImportResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportResult::Ok => "ok",
            ImportResult::OkLeftovers => "ok_leftovers",
            ImportResult::Err => "err",
            ImportResult::Grace => "grace",
            ImportResult::InvalidDl => "invalid_dl",
        }
    }
}

#[derive(Debug, ThisError)]
pub enum CopyError {
    #[error("destination not set, copy not supported for {0}")]
    Unsupported(String),

    #[error("parent directory missing for {0}")]
    MissingParent(PathBuf),

    #[error("source dir is empty")]
    EmptySource,

    #[error("copy failed: {0}")]
    Io(#[from] io::Error),
}

/// One logical download: a directory under the download root plus whatever
/// the PVR history says about it.
pub struct ImportRecord {
    pub name: String,
    pub dir: DownloadDirectory,
    pub pvr: Option<Arc<dyn Pvr>>,
    pub entity_id: Option<u64>,
    pub scannable_id: Option<u64>,
    pub dest_dir: Option<PathBuf>,
    pub nzo_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub status: Option<ImportStatus>,
    pub log: LogContext,
}

impl std::fmt::Debug for ImportRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportRecord")
            .field("name", &self.name)
            .field("mnt", &self.dir.mount())
            .field("pvr", &self.pvr.as_ref().map(|p| p.name().to_string()))
            .field("nzo_id", &self.nzo_id)
            .field("date", &self.date)
            .field("status", &self.status)
            .finish()
    }
}

impl ImportRecord {
    pub fn new(name: String, dir: DownloadDirectory, log: LogContext) -> Self {
        Self {
            name,
            dir,
            pvr: None,
            entity_id: None,
            scannable_id: None,
            dest_dir: None,
            nzo_id: None,
            date: None,
            status: None,
            log,
        }
    }

    pub fn pvr_name(&self) -> &str {
        self.pvr.as_ref().map_or("-", |p| p.name())
    }

    /// Decides what a finished import command means for this download,
    /// deleting leftovers when the PVR is done with them.
    pub fn check_result(
        &self,
        status: CommandStatus,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> Result<ImportResult> {
        let log = self.log.with("status", status);
        info_ctx!(log, "import command finished");

        if status.is_error() {
            error_ctx!(log, "import command failed, not checking directory");
            return Ok(ImportResult::Err);
        }

        if !self.dir.exists() {
            info_ctx!(log, "import succeeded");
            return Ok(ImportResult::Ok);
        }
        let mut result = ImportResult::OkLeftovers;

        if !self.has_file()? {
            let newest = match self.date {
                Some(date) => date.max(self.dir.contents_mtime()?),
                None => self.dir.contents_mtime()?,
            };
            let age = fmt::to_std(now - newest);
            if age <= grace {
                warn_ctx!(
                    log,
                    "directory still present, allowing {}",
                    fmt::duration(grace - age)
                );
                return Ok(ImportResult::Grace);
            }
            error_ctx!(
                log,
                "PVR doesn't have files after {}: invalid download",
                fmt::duration(age)
            );
            result = ImportResult::InvalidDl;
        }

        info_ctx!(log, "deleting leftover files after import");
        // The PVR may be deleting the same directory concurrently
        let _ = self.dir.remove();
        Ok(result)
    }

    fn has_file(&self) -> Result<bool> {
        let pvr = self.pvr.as_ref().ok_or(Error::MissingField("pvr"))?;
        let entity_id = self.entity_id.ok_or(Error::MissingField("entityId"))?;
        Ok(pvr.entity(entity_id)?.has_file)
    }

    /// Manual import fallback: copies the download's files into the library
    /// destination so a rescan can pick them up.
    pub fn copy_to_dest(&self) -> std::result::Result<(), CopyError> {
        let dest = self
            .dest_dir
            .as_deref()
            .ok_or_else(|| CopyError::Unsupported(self.pvr_name().to_string()))?;
        if !dest.parent().is_some_and(Path::is_dir) {
            return Err(CopyError::MissingParent(dest.to_path_buf()));
        }

        let src_files = regular_files(self.dir.local())?;
        if src_files.is_empty() {
            return Err(CopyError::EmptySource);
        }

        fs::create_dir_all(dest)?;
        let src_size: u64 = src_files.iter().map(|(_, len)| len).sum();
        let dest_size: u64 = regular_files(dest)?.iter().map(|(_, len)| len).sum();
        if dest_size >= src_size {
            warn_ctx!(
                self.log.with("src", fmt::size(src_size)).with("dest", fmt::size(dest_size)),
                "destination >= source, not copying"
            );
            return Ok(());
        }

        info_ctx!(
            self.log.with("dest", dest.display()),
            "copying {} files",
            src_files.len()
        );
        for (src, _) in &src_files {
            let Some(file_name) = src.file_name() else {
                continue;
            };
            let target = dest.join(file_name);
            fs::copy(src, &target)?;
            let mtime = fs::metadata(src)?.modified()?;
            File::options().write(true).open(&target)?.set_modified(mtime)?;
        }
        Ok(())
    }
}

fn regular_files(dir: &Path) -> io::Result<Vec<(PathBuf, u64)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            let len = fs::metadata(&path)?.len();
            files.push((path, len));
        }
    }
    files.sort();
    Ok(files)
}
