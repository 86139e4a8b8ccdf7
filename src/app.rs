use crate::config::{AppConfig, PruneSettings};
use crate::error::Result;
use crate::imports::{PruneSummary, Pruner};
use crate::pvr::{self, HistoryEvent, HistoryIter, Pvr};
use std::sync::Arc;
use tracing::{debug, info};

/// Something that learns from PVR history events.
pub trait HistoryConsumer {
    fn add_ev(&mut self, pvr: &Arc<dyn Pvr>, ev: &HistoryEvent) -> Result<()>;

    /// Whether further events could still change anything.
    fn need_evs(&self) -> bool;
}

/// Feeds the PVRs' histories to `consumer` one event at a time from each
/// PVR in turn, until the histories run out or the consumer is satisfied.
pub fn feed_history<C>(consumer: &mut C, pvrs: &[Arc<dyn Pvr>]) -> Result<usize>
where
    C: HistoryConsumer + ?Sized,
{
    let mut streams: Vec<(&Arc<dyn Pvr>, HistoryIter<'_>)> =
        pvrs.iter().map(|pvr| (pvr, pvr.history())).collect();
    let mut fed = 0;

    while !streams.is_empty() {
        let mut i = 0;
        while i < streams.len() {
            if !consumer.need_evs() {
                debug!("history no longer needed after {} events", fed);
                return Ok(fed);
            }
            let (pvr, events) = &mut streams[i];
            match events.next() {
                Some(ev) => {
                    consumer.add_ev(*pvr, &ev?)?;
                    fed += 1;
                    i += 1;
                }
                None => {
                    debug!("end of {} history", pvr.name());
                    streams.remove(i);
                }
            }
        }
    }
    Ok(fed)
}

/// One configured reconciliation run.
pub struct App {
    settings: PruneSettings,
    pvrs: Vec<Arc<dyn Pvr>>,
}

impl App {
    pub fn new(settings: PruneSettings, pvrs: Vec<Arc<dyn Pvr>>) -> Self {
        Self { settings, pvrs }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let pvrs = config
            .pvrs
            .iter()
            .map(|(name, pvr_config)| pvr::from_config(name, pvr_config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(config.prune_settings(), pvrs))
    }

    pub fn settings(&self) -> &PruneSettings {
        &self.settings
    }

    pub fn pvrs(&self) -> &[Arc<dyn Pvr>] {
        &self.pvrs
    }

    pub fn prune(&self) -> Result<PruneSummary> {
        let mut pruner = Pruner::new(self.settings.clone())?;
        let fed = feed_history(&mut pruner, &self.pvrs)?;
        info!("read {} history events from {} PVRs", fed, self.pvrs.len());
        pruner.prune(&self.pvrs)
    }
}
