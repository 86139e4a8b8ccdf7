pub mod app;
pub mod config;
pub mod dl_dir;
pub mod error;
pub mod fmt;
pub mod imports;
pub mod log_ctx;
pub mod pvr;

pub use app::{App, HistoryConsumer};
pub use config::{AppConfig, PruneSettings};
pub use error::{Error, Result};
pub use imports::{PruneSummary, Pruner};
pub use pvr::Pvr;
