use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DOWNLOAD_CLIENT: &str = "sabnzbd";
pub const DEFAULT_INCOMPLETE_DIR: &str = "incomplete";
pub const DEFAULT_IMPORT_GRACE: Duration = Duration::from_secs(12 * 3600);
pub const DEFAULT_UNPACK_GRACE: Duration = Duration::from_secs(4 * 3600);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PvrKind {
    Sonarr,
    Radarr,
}

#[derive(Clone, Deserialize)]
pub struct PvrConfig {
    pub kind: PvrKind,
    pub url: String,
    pub api_key: String,
}

// Keeps API keys out of `print-config` output and debug logs
impl std::fmt::Debug for PvrConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvrConfig")
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub download_root: PathBuf,
    pub mount_root: PathBuf,
    pub imports_root: PathBuf,
    #[serde(default = "default_download_client")]
    pub download_client: String,
    #[serde(default = "default_incomplete_dir")]
    pub incomplete_dir: String,
    #[serde(default = "default_import_grace_secs")]
    pub import_grace_secs: u64,
    #[serde(default = "default_unpack_grace_secs")]
    pub unpack_grace_secs: u64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default)]
    pub live_status: Option<bool>,
    #[serde(default)]
    pub pvrs: BTreeMap<String, PvrConfig>,
}

fn default_download_client() -> String {
    DEFAULT_DOWNLOAD_CLIENT.to_string()
}

fn default_incomplete_dir() -> String {
    DEFAULT_INCOMPLETE_DIR.to_string()
}

fn default_import_grace_secs() -> u64 {
    DEFAULT_IMPORT_GRACE.as_secs()
}

fn default_unpack_grace_secs() -> u64 {
    DEFAULT_UNPACK_GRACE.as_secs()
}

fn default_refresh_interval_ms() -> u64 {
    DEFAULT_REFRESH_INTERVAL.as_millis() as u64
}

/// Load configuration from `config.{yml,toml,json}` (or `path` when given),
/// with `DLPRUNE__*` environment variables taking precedence.
pub fn load_configuration(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file = match path {
        Some(path) => ConfigFile::from(path).required(true),
        None => ConfigFile::with_name("config").required(false),
    };
    let builder = Config::builder()
        .add_source(file)
        .add_source(Environment::with_prefix("DLPRUNE").separator("__"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

impl AppConfig {
    pub fn prune_settings(&self) -> PruneSettings {
        let settings = PruneSettings::new(
            self.download_root.clone(),
            self.mount_root.clone(),
            self.imports_root.clone(),
        )
        .with_download_client(&self.download_client)
        .with_incomplete_dir(&self.incomplete_dir)
        .with_import_grace(Duration::from_secs(self.import_grace_secs))
        .with_unpack_grace(Duration::from_secs(self.unpack_grace_secs))
        .with_refresh_interval(Duration::from_millis(self.refresh_interval_ms));

        match self.live_status {
            Some(live) => settings.with_live_status(live),
            None => settings,
        }
    }
}

/// Engine configuration, supplied once at construction.
///
/// Defaults: 12h import grace, 4h unpack grace, 1s refresh interval,
/// `sabnzbd` as the reconciled download client and `incomplete` as the
/// skipped in-progress directory. Live status rendering defaults to on
/// only when stderr is an attended terminal.
#[derive(Debug, Clone)]
pub struct PruneSettings {
    pub download_root: PathBuf,
    pub mount_root: PathBuf,
    pub imports_root: PathBuf,
    pub download_client: String,
    pub incomplete_dir: String,
    pub import_grace: Duration,
    pub unpack_grace: Duration,
    pub refresh_interval: Duration,
    pub live_status: bool,
}

impl PruneSettings {
    pub fn new(download_root: PathBuf, mount_root: PathBuf, imports_root: PathBuf) -> Self {
        Self {
            download_root,
            mount_root,
            imports_root,
            download_client: DEFAULT_DOWNLOAD_CLIENT.to_string(),
            incomplete_dir: DEFAULT_INCOMPLETE_DIR.to_string(),
            import_grace: DEFAULT_IMPORT_GRACE,
            unpack_grace: DEFAULT_UNPACK_GRACE,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            live_status: console::user_attended_stderr(),
        }
    }

    pub fn with_download_client(mut self, client: &str) -> Self {
        self.download_client = client.to_string();
        self
    }

    pub fn with_incomplete_dir(mut self, name: &str) -> Self {
        self.incomplete_dir = name.to_string();
        self
    }

    pub fn with_import_grace(mut self, grace: Duration) -> Self {
        self.import_grace = grace;
        self
    }

    pub fn with_unpack_grace(mut self, grace: Duration) -> Self {
        self.unpack_grace = grace;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_live_status(mut self, live: bool) -> Self {
        self.live_status = live;
        self
    }
}
