#![allow(dead_code)]

use dlprune::pvr::{
    CommandBody, Entity, HistoryEvent, HistoryIter, ImportMode, QueueItem, RemoteCommand,
};
use dlprune::{Error, PruneSettings, Pvr, Result};
use serde_json::json;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

pub const MNT: &str = "/ng";
pub const SCAN_CMD: &str = "DownloadedEpisodesScan";

/// In-memory PVR. Scans only succeed for paths registered with
/// [`FakePvr::add_import`]; everything issued is recorded for assertions.
pub struct FakePvr {
    name: String,
    pub state: Mutex<FakeState>,
}

pub struct FakeState {
    /// Newest first, as the real history endpoint returns them.
    pub events: Vec<HistoryEvent>,
    /// Commands the PVR reports as already running.
    pub running: Vec<RemoteCommand>,
    /// Final status of a scan, by mount path.
    pub imports: HashMap<String, String>,
    pub statuses: HashMap<u64, String>,
    pub has_file: HashMap<u64, bool>,
    pub queue: Vec<QueueItem>,
    pub dest_path: Option<PathBuf>,
    pub rescan_status: String,

    pub scanned: Vec<(String, Option<String>)>,
    pub rescanned: Vec<u64>,
    pub deleted: Vec<(u64, bool)>,
    next_id: u64,
}

impl FakePvr {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(FakeState {
                events: Vec::new(),
                running: Vec::new(),
                imports: HashMap::new(),
                statuses: HashMap::new(),
                has_file: HashMap::new(),
                queue: Vec::new(),
                dest_path: None,
                rescan_status: "completed".to_string(),
                scanned: Vec::new(),
                rescanned: Vec::new(),
                deleted: Vec::new(),
                next_id: 1000,
            }),
        })
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Appends an event older than every event added before it.
    pub fn add_ev(&self, ev: HistoryEvent) {
        self.state().events.push(ev);
    }

    pub fn add_import(&self, mnt_dir: &str, status: &str) {
        self.state()
            .imports
            .insert(mnt_dir.to_string(), status.to_string());
    }

    pub fn set_has_file(&self, entity_id: u64, has_file: bool) {
        self.state().has_file.insert(entity_id, has_file);
    }

    pub fn add_running(&self, id: u64, mnt_dir: &str, status: &str) {
        self.state().running.push(RemoteCommand {
            id,
            name: SCAN_CMD.to_string(),
            status: status.to_string(),
            started: None,
            body: CommandBody {
                path: Some(mnt_dir.to_string()),
            },
        });
    }

    pub fn scanned_paths(&self) -> Vec<String> {
        self.state().scanned.iter().map(|(p, _)| p.clone()).collect()
    }

    fn new_command(state: &mut FakeState, name: &str, status: &str) -> RemoteCommand {
        state.next_id += 1;
        let id = state.next_id;
        state.statuses.insert(id, status.to_string());
        RemoteCommand {
            id,
            name: name.to_string(),
            status: "queued".to_string(),
            started: None,
            body: CommandBody::default(),
        }
    }
}

impl Pvr for FakePvr {
    fn name(&self) -> &str {
        &self.name
    }

    fn downloaded_scan_command(&self) -> &'static str {
        SCAN_CMD
    }

    fn history(&self) -> HistoryIter<'_> {
        let events = self.state().events.clone();
        Box::new(events.into_iter().map(Ok))
    }

    fn commands(&self) -> Result<Vec<RemoteCommand>> {
        Ok(self.state().running.clone())
    }

    fn command(&self, id: u64) -> Result<RemoteCommand> {
        let state = self.state();
        let status = state
            .statuses
            .get(&id)
            .ok_or(Error::MissingCommandStatus(id))?;
        Ok(RemoteCommand {
            id,
            name: String::new(),
            status: status.clone(),
            started: None,
            body: CommandBody::default(),
        })
    }

    fn entity(&self, id: u64) -> Result<Entity> {
        Ok(Entity {
            has_file: self.state().has_file.get(&id).copied().unwrap_or(false),
        })
    }

    fn downloaded_scan(
        &self,
        path: &Path,
        download_client_id: Option<&str>,
        _import_mode: ImportMode,
    ) -> Result<RemoteCommand> {
        let path = path.to_string_lossy().into_owned();
        let mut state = self.state();
        let status = match state.imports.get(&path) {
            Some(status) => status.clone(),
            None => panic!("unexpected downloaded_scan: {:?}", path),
        };
        state
            .scanned
            .push((path, download_client_id.map(str::to_string)));
        Ok(Self::new_command(&mut state, SCAN_CMD, &status))
    }

    fn rescan(&self, scannable_id: u64) -> Result<RemoteCommand> {
        let mut state = self.state();
        state.rescanned.push(scannable_id);
        let status = state.rescan_status.clone();
        Ok(Self::new_command(&mut state, "RescanSeries", &status))
    }

    fn queue(&self) -> Result<Vec<QueueItem>> {
        Ok(self.state().queue.clone())
    }

    fn queue_del(&self, id: u64, blacklist: bool) -> Result<()> {
        let mut state = self.state();
        state.deleted.push((id, blacklist));
        state.queue.retain(|item| item.id != id);
        Ok(())
    }

    fn history_entity_id(&self, ev: &HistoryEvent) -> Result<u64> {
        ev.id_field("episodeId")
    }

    fn history_scannable_id(&self, ev: &HistoryEvent) -> Result<u64> {
        ev.id_field("seriesId")
    }

    fn history_dest_path(&self, _ev: &HistoryEvent) -> Result<PathBuf> {
        self.state().dest_path.clone().ok_or(Error::Unsupported {
            pvr: self.name.clone(),
            operation: "history_dest_path",
        })
    }
}

/// History event from the usenet client. `seriesId` is `entity_id + 100`.
pub fn event(event_type: &str, title: &str, date: &str, nzo_id: &str, entity_id: u64) -> HistoryEvent {
    event_from(event_type, title, date, nzo_id, entity_id, "SABnzbd")
}

pub fn event_from(
    event_type: &str,
    title: &str,
    date: &str,
    nzo_id: &str,
    entity_id: u64,
    client: &str,
) -> HistoryEvent {
    serde_json::from_value(json!({
        "sourceTitle": title,
        "date": date,
        "downloadId": nzo_id,
        "eventType": event_type,
        "episodeId": entity_id,
        "seriesId": entity_id + 100,
        "data": {"downloadClient": client},
    }))
    .unwrap()
}

pub fn queue_item(id: u64, download_id: &str) -> QueueItem {
    serde_json::from_value(json!({
        "id": id,
        "downloadId": download_id,
        "title": download_id,
        "protocol": "usenet",
        "status": "Downloading",
        "trackedDownloadStatus": "Ok",
        "statusMessages": [],
    }))
    .unwrap()
}

pub fn failed_queue_item(id: u64, download_id: &str, title: &str) -> QueueItem {
    serde_json::from_value(json!({
        "id": id,
        "downloadId": download_id,
        "title": title,
        "protocol": "usenet",
        "status": "Completed",
        "trackedDownloadStatus": "Warning",
        "statusMessages": [
            {"title": title, "messages": ["No files found are eligible for import"]},
        ],
    }))
    .unwrap()
}

pub fn settings(ng: &Path, imports_root: &Path) -> PruneSettings {
    PruneSettings::new(ng.to_path_buf(), MNT.into(), imports_root.to_path_buf())
        .with_live_status(false)
        .with_refresh_interval(Duration::from_millis(5))
}

pub fn make_download(ng: &Path, name: &str) -> PathBuf {
    let dir = ng.join(name);
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("some file"), "test").unwrap();
    dir
}

/// Pushes the mtime of a directory and its immediate children into the past.
pub fn age_dir(dir: &Path, by: Duration) {
    let mtime = SystemTime::now() - by;
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_file() {
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
        }
    }
    File::open(dir).unwrap().set_modified(mtime).unwrap();
}

#[derive(Clone, Default)]
pub struct LogBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// Runs `f` with a debug-level subscriber writing into a buffer, returning
/// the result along with everything logged.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buf = LogBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buf.contents())
}

/// Asserts a line logged at `level` matches `pattern` (case-insensitive).
pub fn assert_log(logs: &str, level: &str, pattern: &str) {
    let re = regex::Regex::new(&format!(r"(?i)\b{}\b.*{}", level, pattern)).unwrap();
    assert!(
        logs.lines().any(|line| re.is_match(line)),
        "no {} line matching {:?} in:\n{}",
        level,
        pattern,
        logs
    );
}
