use super::{
    ArrClient, Entity, HistoryEvent, HistoryIter, ImportMode, Pvr, QueueItem, RemoteCommand,
};
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const CMD_DOWNLOADED_SCAN: &str = "DownloadedEpisodesScan";
pub const CMD_RESCAN: &str = "RescanSeries";

/// TV series manager. History entities are episodes; rescans are per series.
pub struct Sonarr {
    name: String,
    client: ArrClient,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadedScanBody<'a> {
    name: &'static str,
    path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    download_client_id: Option<&'a str>,
    import_mode: ImportMode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RescanBody {
    name: &'static str,
    series_id: u64,
}

impl Sonarr {
    pub fn new(name: &str, client: ArrClient) -> Self {
        Self {
            name: name.to_string(),
            client,
        }
    }
}

impl Pvr for Sonarr {
    fn name(&self) -> &str {
        &self.name
    }

    fn downloaded_scan_command(&self) -> &'static str {
        CMD_DOWNLOADED_SCAN
    }

    fn history(&self) -> HistoryIter<'_> {
        self.client.history()
    }

    fn commands(&self) -> Result<Vec<RemoteCommand>> {
        self.client.commands()
    }

    fn command(&self, id: u64) -> Result<RemoteCommand> {
        self.client.command(id)
    }

    fn entity(&self, id: u64) -> Result<Entity> {
        self.client.get(&format!("episode/{}", id), &[])
    }

    fn downloaded_scan(
        &self,
        path: &Path,
        download_client_id: Option<&str>,
        import_mode: ImportMode,
    ) -> Result<RemoteCommand> {
        self.client.run_command(&DownloadedScanBody {
            name: CMD_DOWNLOADED_SCAN,
            path,
            download_client_id,
            import_mode,
        })
    }

    fn rescan(&self, scannable_id: u64) -> Result<RemoteCommand> {
        self.client.run_command(&RescanBody {
            name: CMD_RESCAN,
            series_id: scannable_id,
        })
    }

    fn queue(&self) -> Result<Vec<QueueItem>> {
        self.client.queue()
    }

    fn queue_del(&self, id: u64, blacklist: bool) -> Result<()> {
        self.client.queue_del(id, blacklist)
    }

    fn history_entity_id(&self, ev: &HistoryEvent) -> Result<u64> {
        ev.id_field("episodeId")
    }

    fn history_scannable_id(&self, ev: &HistoryEvent) -> Result<u64> {
        ev.id_field("seriesId")
    }

    fn history_dest_path(&self, _ev: &HistoryEvent) -> Result<PathBuf> {
        Err(Error::Unsupported {
            pvr: self.name.clone(),
            operation: "history_dest_path",
        })
    }
}
