use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

lazy_static! {
    // Placeholder segments left behind by the download client, e.g. `123-456.789`
    static ref JUNK_FILE_RE: Regex = Regex::new(r"^\d+-\d+(\.\d+)+$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirStatus {
    Empty,
    Junk,
    Unclassified,
}

/// One directory under the download root, known both by its local path and
/// by the path the PVRs see it at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDirectory {
    local: PathBuf,
    mount: PathBuf,
}

impl DownloadDirectory {
    pub fn new(local: PathBuf, mount: PathBuf) -> Self {
        Self { local, mount }
    }

    /// Builds the mount path by re-rooting `local` from `root` onto `mount_root`.
    pub fn from_local(local: PathBuf, root: &Path, mount_root: &Path) -> Self {
        let mount = match local.strip_prefix(root) {
            Ok(rel) => mount_root.join(rel),
            Err(_) => mount_root.join(local.file_name().unwrap_or_default()),
        };
        Self::new(local, mount)
    }

    pub fn local(&self) -> &Path {
        &self.local
    }

    pub fn mount(&self) -> &Path {
        &self.mount
    }

    pub fn exists(&self) -> bool {
        self.local.is_dir()
    }

    pub fn status(&self) -> io::Result<DirStatus> {
        if self.is_empty()? {
            return Ok(DirStatus::Empty);
        }
        if self.is_junk()? {
            return Ok(DirStatus::Junk);
        }
        Ok(DirStatus::Unclassified)
    }

    /// Latest modification time of the directory itself and its immediate
    /// children.
    pub fn contents_mtime(&self) -> io::Result<DateTime<Utc>> {
        let mut latest: DateTime<Utc> = fs::metadata(&self.local)?.modified()?.into();
        for entry in fs::read_dir(&self.local)? {
            let entry = entry?;
            let mtime: DateTime<Utc> = match entry.metadata() {
                Ok(metadata) => metadata.modified()?.into(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if mtime > latest {
                latest = mtime;
            }
        }
        Ok(latest)
    }

    /// Total size in bytes of all files below the directory. `None` when the
    /// tree changed under us (e.g. the PVR deleted it mid-walk).
    pub fn size(&self) -> Option<u64> {
        let mut total = 0u64;
        for entry in WalkDir::new(&self.local) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("size of {} unavailable: {}", self.local.display(), e);
                    return None;
                }
            };
            if entry.file_type().is_file() {
                match entry.metadata() {
                    Ok(metadata) => total += metadata.len(),
                    Err(e) => {
                        debug!("size of {} unavailable: {}", self.local.display(), e);
                        return None;
                    }
                }
            }
        }
        Some(total)
    }

    pub fn remove(&self) -> io::Result<()> {
        fs::remove_dir_all(&self.local)
    }

    fn is_empty(&self) -> io::Result<bool> {
        for entry in WalkDir::new(&self.local).min_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_dir() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn is_junk(&self) -> io::Result<bool> {
        for entry in fs::read_dir(&self.local)? {
            let entry = entry?;
            if !entry.path().is_file() {
                return Ok(false);
            }
            let name = entry.file_name();
            if !JUNK_FILE_RE.is_match(&name.to_string_lossy()) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn dir_in(root: &Path, name: &str) -> DownloadDirectory {
        let local = root.join(name);
        fs::create_dir_all(&local).unwrap();
        DownloadDirectory::from_local(local, root, Path::new("/ng"))
    }

    #[test]
    fn test_mount_path_rerooted() {
        let tmp = tempdir().unwrap();
        let dir = dir_in(tmp.path(), "ep01");
        assert_eq!(dir.mount(), Path::new("/ng/ep01"));
    }

    #[test]
    fn test_status_empty() {
        let tmp = tempdir().unwrap();
        let dir = dir_in(tmp.path(), "some empty dir");
        fs::create_dir(dir.local().join("nested")).unwrap();
        assert_eq!(dir.status().unwrap(), DirStatus::Empty);
    }

    #[test]
    fn test_status_junk() {
        let tmp = tempdir().unwrap();
        let dir = dir_in(tmp.path(), "junk");
        fs::write(dir.local().join("123-456.789"), "x").unwrap();
        fs::write(dir.local().join("1-2.3.4"), "x").unwrap();
        assert_eq!(dir.status().unwrap(), DirStatus::Junk);
    }

    #[test]
    fn test_status_unclassified() {
        let tmp = tempdir().unwrap();
        let dir = dir_in(tmp.path(), "show");
        fs::write(dir.local().join("123-456.789"), "x").unwrap();
        fs::write(dir.local().join("episode.mkv"), "x").unwrap();
        assert_eq!(dir.status().unwrap(), DirStatus::Unclassified);
    }

    #[test]
    fn test_junk_requires_files_at_top_level() {
        let tmp = tempdir().unwrap();
        let dir = dir_in(tmp.path(), "nested");
        fs::create_dir(dir.local().join("sub")).unwrap();
        fs::write(dir.local().join("sub").join("123-456.789"), "x").unwrap();
        assert_eq!(dir.status().unwrap(), DirStatus::Unclassified);
    }

    #[test]
    fn test_contents_mtime_uses_latest_child() {
        let tmp = tempdir().unwrap();
        let dir = dir_in(tmp.path(), "ep01");
        let old = SystemTime::now() - Duration::from_secs(3 * 3600);
        let recent = SystemTime::now() - Duration::from_secs(600);

        let older_file = dir.local().join("a");
        let newer_file = dir.local().join("b");
        fs::write(&older_file, "a").unwrap();
        fs::write(&newer_file, "b").unwrap();
        File::options().write(true).open(&older_file).unwrap().set_modified(old).unwrap();
        File::options().write(true).open(&newer_file).unwrap().set_modified(recent).unwrap();
        File::open(dir.local()).unwrap().set_modified(old).unwrap();

        let expected: DateTime<Utc> = recent.into();
        let drift = dir.contents_mtime().unwrap() - expected;
        assert!(drift.num_seconds().abs() <= 1, "drift: {:?}", drift);
    }

    #[test]
    fn test_size() {
        let tmp = tempdir().unwrap();
        let dir = dir_in(tmp.path(), "ep01");
        fs::write(dir.local().join("a"), "1234").unwrap();
        fs::create_dir(dir.local().join("sub")).unwrap();
        fs::write(dir.local().join("sub").join("b"), "56").unwrap();
        assert_eq!(dir.size(), Some(6));
    }

    #[test]
    fn test_size_of_vanished_dir_is_unknown() {
        let tmp = tempdir().unwrap();
        let dir = DownloadDirectory::from_local(
            tmp.path().join("gone"),
            tmp.path(),
            Path::new("/ng"),
        );
        assert_eq!(dir.size(), None);
    }
}
