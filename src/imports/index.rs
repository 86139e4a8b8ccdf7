use super::record::{ImportRecord, ImportStatus};
use crate::config::PruneSettings;
use crate::dl_dir::DownloadDirectory;
use crate::error::Result;
use crate::fmt;
use crate::log_ctx::{debug_ctx, info_ctx, LogContext};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fs;

pub const UNPACK_PREFIX: &str = "_UNPACK_";

lazy_static! {
    // Download client's own disambiguation of duplicate names, e.g. `name.1`
    static ref DUP_SUFFIX_RE: Regex = Regex::new(r"\.\d+$").unwrap();
}

/// Import records keyed by logical basename, in directory scan order.
#[derive(Debug, Default)]
pub struct ImportIndex {
    records: Vec<ImportRecord>,
    by_name: HashMap<String, usize>,
}

impl ImportIndex {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ImportRecord> {
        self.by_name.get(name).map(|&idx| &self.records[idx])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn records(&self) -> &[ImportRecord] {
        &self.records
    }

    pub fn record(&self, idx: usize) -> &ImportRecord {
        &self.records[idx]
    }

    pub fn record_mut(&mut self, idx: usize) -> &mut ImportRecord {
        &mut self.records[idx]
    }

    /// Adds `record` unless its name is taken, returning the existing holder
    /// of the name in that case.
    fn insert(&mut self, record: ImportRecord) -> std::result::Result<(), &ImportRecord> {
        if let Some(&idx) = self.by_name.get(&record.name) {
            return Err(&self.records[idx]);
        }
        self.by_name.insert(record.name.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }
}

/// Strips the client's duplicate-name suffix: `name.1` becomes `name`.
pub fn logical_name(name: &str) -> &str {
    match DUP_SUFFIX_RE.find(name) {
        Some(m) => &name[..m.start()],
        None => name,
    }
}

/// Scans the download root and builds one record per logical download.
///
/// Directories still being unpacked within the unpack grace window are
/// skipped for this run. When two directories map to the same name, the
/// first in sort order wins and the other is left alone.
pub fn find_imports(settings: &PruneSettings, now: DateTime<Utc>) -> Result<ImportIndex> {
    let root = &settings.download_root;
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    let mut index = ImportIndex::default();
    for local in dirs {
        let Some(dir_name) = local.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if dir_name == settings.incomplete_dir {
            continue;
        }

        let dir = DownloadDirectory::from_local(local, root, &settings.mount_root);
        let log = LogContext::new().with("mnt", dir.mount().display());

        let mut basename = dir_name.as_str();
        if let Some(unpacked) = basename.strip_prefix(UNPACK_PREFIX) {
            basename = unpacked;
            let age = fmt::to_std(now - dir.contents_mtime()?);
            if age < settings.unpack_grace {
                debug_ctx!(
                    log,
                    "unpacking, allowing {}",
                    fmt::duration(settings.unpack_grace - age)
                );
                continue;
            }
        }
        let basename = logical_name(basename).to_string();

        let mut record = ImportRecord::new(basename, dir, log);
        record.status = ImportStatus::from_dir(record.dir.status()?);

        let log = record.log.clone();
        if let Err(found) = index.insert(record) {
            info_ctx!(
                log.with("found", found.dir.mount().display()),
                "not superseding similarly-named dir, reconsidering on next run"
            );
        }
    }
    Ok(index)
}
