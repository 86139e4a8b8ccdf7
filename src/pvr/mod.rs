//! PVR collaborators.
//!
//! The engine only talks to PVRs through the [`Pvr`] trait. [`Sonarr`] and
//! [`Radarr`] implement it over their v3 HTTP APIs via the shared
//! [`ArrClient`].

pub mod arr;
pub mod radarr;
pub mod sonarr;

pub use arr::ArrClient;
pub use radarr::Radarr;
pub use sonarr::Sonarr;

use crate::config::{PvrConfig, PvrKind};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type HistoryIter<'a> = Box<dyn Iterator<Item = Result<HistoryEvent>> + Send + 'a>;

/// Capabilities the reconciler needs from a media library manager.
pub trait Pvr: Send + Sync {
    fn name(&self) -> &str;

    /// Name of the remote command that imports a finished download directory.
    fn downloaded_scan_command(&self) -> &'static str;

    /// History events, newest first. Lazily fetched; callers may stop early.
    fn history(&self) -> HistoryIter<'_>;

    fn commands(&self) -> Result<Vec<RemoteCommand>>;
    fn command(&self, id: u64) -> Result<RemoteCommand>;
    fn entity(&self, id: u64) -> Result<Entity>;

    fn downloaded_scan(
        &self,
        path: &Path,
        download_client_id: Option<&str>,
        import_mode: ImportMode,
    ) -> Result<RemoteCommand>;

    fn rescan(&self, scannable_id: u64) -> Result<RemoteCommand>;

    fn queue(&self) -> Result<Vec<QueueItem>>;
    fn queue_del(&self, id: u64, blacklist: bool) -> Result<()>;

    fn history_entity_id(&self, ev: &HistoryEvent) -> Result<u64>;
    fn history_scannable_id(&self, ev: &HistoryEvent) -> Result<u64>;

    /// Library path the event's download belongs in, as seen by the PVR.
    /// Returns [`Error::Unsupported`] for products that can't tell.
    fn history_dest_path(&self, ev: &HistoryEvent) -> Result<PathBuf>;
}

impl fmt::Debug for dyn Pvr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pvr").field("name", &self.name()).finish()
    }
}

/// Two handles refer to the same PVR when their names match; names are the
/// configuration keys and therefore unique.
pub fn same_pvr(a: &dyn Pvr, b: &dyn Pvr) -> bool {
    a.name() == b.name()
}

pub fn from_config(name: &str, config: &PvrConfig) -> Result<Arc<dyn Pvr>> {
    let client = ArrClient::new(&config.url, &config.api_key)?;
    let pvr: Arc<dyn Pvr> = match config.kind {
        PvrKind::Sonarr => Arc::new(Sonarr::new(name, client)),
        PvrKind::Radarr => Arc::new(Radarr::new(name, client)),
    };
    Ok(pvr)
}

pub const EV_GRABBED: &str = "grabbed";
pub const EV_IMPORTED: &str = "downloadFolderImported";
pub const EV_FAILED: &str = "downloadFailed";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub source_title: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub download_id: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub data: Option<EventData>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HistoryEvent {
    pub fn download_client(&self) -> Option<&str> {
        self.data.as_ref()?.download_client.as_deref()
    }

    /// Numeric identifier carried alongside the event, e.g. `episodeId`.
    pub fn id_field(&self, key: &'static str) -> Result<u64> {
        self.extra
            .get(key)
            .and_then(Value::as_u64)
            .ok_or(Error::MissingField(key))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default)]
    pub download_client: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommand {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "state")]
    pub status: String,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body: CommandBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandBody {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default)]
    pub has_file: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportMode {
    Move,
    Copy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: u64,
    #[serde(default)]
    pub download_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tracked_download_status: String,
    #[serde(default)]
    pub status_messages: Vec<QueueStatusMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusMessage {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl QueueItem {
    pub fn has_download_id(&self, download_id: &str) -> bool {
        self.download_id
            .as_deref()
            .is_some_and(|id| id.eq_ignore_ascii_case(download_id))
    }

    /// Error text for a completed usenet download the PVR gave up on because
    /// it found nothing to import.
    pub fn fatal_error(&self) -> Option<String> {
        if self.protocol != "usenet"
            || self.status != "Completed"
            || self.tracked_download_status != "Warning"
        {
            return None;
        }
        self.status_messages
            .iter()
            .find(|msg| {
                msg.messages
                    .iter()
                    .any(|m| m.to_lowercase().contains("no files found"))
            })
            .map(|msg| msg.messages.join(", "))
    }
}
