use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sequence: SequenceConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub voucher: VoucherConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    /// Interview rooms served by this instance
    #[serde(default)]
    pub stations: Vec<StationConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Operator key, required when method = "api_key"
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// Database configuration (registry, sqlite ledger and audit share one file)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tokenline.db")
}

/// Ticket numbering configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SequenceConfig {
    /// File holding the last active date (YYYY-MM-DD)
    #[serde(default = "default_day_marker_path")]
    pub day_marker_path: PathBuf,
    /// How many times issuance resynchronises after losing a numbering race
    #[serde(default = "default_max_issue_retries")]
    pub max_issue_retries: u32,
    /// Local calendar offset in minutes east of UTC. Host offset when unset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            day_marker_path: default_day_marker_path(),
            max_issue_retries: default_max_issue_retries(),
            utc_offset_minutes: None,
        }
    }
}

fn default_day_marker_path() -> PathBuf {
    PathBuf::from("config/last_ticket_date.txt")
}

fn default_max_issue_retries() -> u32 {
    3
}

/// Call ledger backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    #[default]
    Sqlite,
    JsonFile,
}

/// Call ledger configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,
    /// Ledger file used by the json_file backend
    #[serde(default = "default_ledger_json_path")]
    pub json_path: PathBuf,
    /// Retries for a station claim that lost a race
    #[serde(default = "default_max_claim_retries")]
    pub max_claim_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::default(),
            json_path: default_ledger_json_path(),
            max_claim_retries: default_max_claim_retries(),
        }
    }
}

fn default_ledger_json_path() -> PathBuf {
    PathBuf::from("queue_state.json")
}

fn default_max_claim_retries() -> u32 {
    3
}

/// Voucher output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VoucherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_voucher_dir")]
    pub output_dir: PathBuf,
}

impl Default for VoucherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: default_voucher_dir(),
        }
    }
}

fn default_voucher_dir() -> PathBuf {
    PathBuf::from("Tickets")
}

fn default_true() -> bool {
    true
}

/// Display aggregator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplayConfig {
    /// Reconciliation poll interval (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Alternating highlight cycles raised for a changed station
    #[serde(default = "default_highlight_cycles")]
    pub highlight_cycles: u32,
    /// Duration of one highlight phase (milliseconds)
    #[serde(default = "default_highlight_interval")]
    pub highlight_interval_ms: u64,
    /// Whether notifications request an audible cue
    #[serde(default = "default_true")]
    pub chime: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            highlight_cycles: default_highlight_cycles(),
            highlight_interval_ms: default_highlight_interval(),
            chime: true,
        }
    }
}

fn default_poll_interval() -> u64 {
    3000
}

fn default_highlight_cycles() -> u32 {
    6
}

fn default_highlight_interval() -> u64 {
    500
}

/// One interview room
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StationConfig {
    pub id: String,
    /// Human readable name shown on displays (defaults to the id)
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_true")]
    pub start_open: bool,
}

impl StationConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            start_open: true,
        }
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sequence: SequenceConfig,
    pub ledger: LedgerConfig,
    pub voucher: VoucherConfig,
    pub display: DisplayConfig,
    pub stations: Vec<StationConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
                api_key_configured: config
                    .auth
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            sequence: config.sequence.clone(),
            ledger: config.ledger.clone(),
            voucher: config.voucher.clone(),
            display: config.display.clone(),
            stations: config.stations.clone(),
        }
    }
}
