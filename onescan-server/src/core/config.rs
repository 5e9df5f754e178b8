use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors, fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("Credentials file not found: {}", .0.display())]
    MissingCredentials(PathBuf),

    #[error("Malformed service account credentials: {0}")]
    MalformedCredentials(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Spreadsheet destination, present only when a spreadsheet id is set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetConfig {
    pub spreadsheet_id: String,
    pub credentials_path: PathBuf,
    pub worksheet_name: String,
}

/// Server configuration
///
/// # Environment variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | WORK_DIR | ./data | Database and log directory |
/// | HTTP_PORT | 8080 | HTTP listen port |
/// | ENVIRONMENT | development | development / staging / production |
/// | LOG_LEVEL | info | tracing filter level |
/// | LOG_JSON | false | JSON log lines |
/// | LOG_DIR | (unset) | daily rolling log files when set |
/// | GOOGLE_SHEETS_SPREADSHEET_ID | (unset) | sync disabled when unset |
/// | GOOGLE_SHEETS_CREDENTIALS_PATH | credentials.json | service-account key |
/// | GOOGLE_SHEETS_WORKSHEET_NAME | tracker | worksheet to override |
/// | SYNC_INTERVAL_SECS | 300 | timer period |
/// | SYNC_MAX_ATTEMPTS | 3 | write attempts per cycle |
/// | SYNC_RETRY_DELAY_SECS | 2 | first backoff delay |
/// | SYNC_CYCLE_TIMEOUT_SECS | 120 | budget for one cycle |
/// | REQUEST_TIMEOUT_MS | 30000 | HTTP request timeout |
///
/// # Example
///
/// ```ignore
/// WORK_DIR=/srv/onescan HTTP_PORT=9000 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub work_dir: String,
    pub http_port: u16,
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
    pub sheet: Option<SheetConfig>,
    pub sync_interval_secs: u64,
    pub sync_max_attempts: u32,
    pub sync_retry_delay_secs: u64,
    pub sync_cycle_timeout_secs: u64,
    pub request_timeout_ms: u64,
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let sheet = var("GOOGLE_SHEETS_SPREADSHEET_ID").map(|id| SheetConfig {
            spreadsheet_id: id.trim().to_string(),
            credentials_path: var("GOOGLE_SHEETS_CREDENTIALS_PATH")
                .unwrap_or_else(|| "credentials.json".into())
                .into(),
            worksheet_name: var("GOOGLE_SHEETS_WORKSHEET_NAME").unwrap_or_else(|| "tracker".into()),
        });

        let d = Self::default();
        Ok(Self {
            work_dir: var("WORK_DIR").unwrap_or(d.work_dir),
            http_port: parse_or(&lookup, "HTTP_PORT", d.http_port)?,
            environment: var("ENVIRONMENT").unwrap_or(d.environment),
            log_level: var("LOG_LEVEL").unwrap_or(d.log_level),
            log_json: parse_or(&lookup, "LOG_JSON", d.log_json)?,
            log_dir: var("LOG_DIR"),
            sheet,
            sync_interval_secs: parse_or(&lookup, "SYNC_INTERVAL_SECS", d.sync_interval_secs)?,
            sync_max_attempts: parse_or(&lookup, "SYNC_MAX_ATTEMPTS", d.sync_max_attempts)?,
            sync_retry_delay_secs: parse_or(&lookup, "SYNC_RETRY_DELAY_SECS", d.sync_retry_delay_secs)?,
            sync_cycle_timeout_secs: parse_or(
                &lookup,
                "SYNC_CYCLE_TIMEOUT_SECS",
                d.sync_cycle_timeout_secs,
            )?,
            request_timeout_ms: parse_or(&lookup, "REQUEST_TIMEOUT_MS", d.request_timeout_ms)?,
        })
    }

    /// Override the work directory and port, keeping the defaults
    ///
    /// Commonly used in tests
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        Self {
            work_dir: work_dir.into(),
            http_port,
            ..Self::default()
        }
    }

    pub fn sync_enabled(&self) -> bool {
        self.sheet.is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: "./data".into(),
            http_port: 8080,
            environment: "development".into(),
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
            sheet: None,
            sync_interval_secs: 300,
            sync_max_attempts: 3,
            sync_retry_delay_secs: 2,
            sync_cycle_timeout_secs: 120,
            request_timeout_ms: 30000,
        }
    }
}
