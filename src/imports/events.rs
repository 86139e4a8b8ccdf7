use super::pruner::Pruner;
use super::record::ImportStatus;
use crate::app::HistoryConsumer;
use crate::error::{Error, Result};
use crate::pvr::{self, HistoryEvent, Pvr, EV_FAILED, EV_GRABBED, EV_IMPORTED};
use std::path::PathBuf;
use std::sync::Arc;

fn event_status(event_type: &str) -> Result<ImportStatus> {
    match event_type {
        EV_GRABBED => Ok(ImportStatus::Grabbed),
        EV_IMPORTED => Ok(ImportStatus::Imported),
        EV_FAILED => Ok(ImportStatus::DlFailed),
        other => Err(Error::UnknownEventType(other.to_string())),
    }
}

impl Pruner {
    /// Record an event's title refers to. PVR history keeps trailing dots in
    /// release names while the download client drops them from directories.
    fn find_ev_import(&self, title: &str) -> Option<usize> {
        self.index.position(title).or_else(|| {
            let trimmed = title.trim_end_matches('.');
            if trimmed.len() != title.len() {
                self.index.position(trimmed)
            } else {
                None
            }
        })
    }

    fn dest_dir(&self, pvr: &dyn Pvr, ev: &HistoryEvent) -> Result<Option<PathBuf>> {
        match pvr.history_dest_path(ev) {
            Ok(path) => {
                let relative = path.strip_prefix("/").unwrap_or(&path);
                Ok(Some(self.settings.imports_root.join(relative)))
            }
            Err(Error::Unsupported { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl HistoryConsumer for Pruner {
    fn add_ev(&mut self, pvr: &Arc<dyn Pvr>, ev: &HistoryEvent) -> Result<()> {
        let from_client = ev
            .download_client()
            .is_some_and(|client| client.eq_ignore_ascii_case(&self.settings.download_client));
        if !from_client {
            return Ok(());
        }

        let Some(idx) = self.find_ev_import(&ev.source_title) else {
            return Ok(());
        };

        {
            let rec = self.index.record(idx);
            if let Some(bound) = &rec.pvr {
                if !pvr::same_pvr(bound.as_ref(), pvr.as_ref()) {
                    return Err(Error::PvrMismatch {
                        title: ev.source_title.clone(),
                        bound: bound.name().to_string(),
                        claimed: pvr.name().to_string(),
                    });
                }
            }
            if rec.status.is_some_and(ImportStatus::is_terminal) {
                return Ok(());
            }
            if rec.date.is_some_and(|date| ev.date <= date) {
                return Ok(());
            }
        }

        let status = event_status(&ev.event_type)?;
        let entity_id = pvr.history_entity_id(ev)?;
        let scannable_id = pvr.history_scannable_id(ev)?;
        let dest_dir = self.dest_dir(pvr.as_ref(), ev)?;

        let rec = self.index.record_mut(idx);
        rec.log = rec.log.with("pvr", pvr.name());
        rec.pvr = Some(Arc::clone(pvr));
        rec.entity_id = Some(entity_id);
        rec.scannable_id = Some(scannable_id);
        rec.dest_dir = dest_dir;
        rec.date = Some(ev.date);
        rec.nzo_id = ev.download_id.clone();
        rec.status = Some(status);
        Ok(())
    }

    fn need_evs(&self) -> bool {
        self.index.records().iter().any(|rec| rec.status.is_none())
    }
}
