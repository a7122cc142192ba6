use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_QUOTE_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_GEOCODING_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_USER_AGENT: &str = "freight-quote/0.1 (cotizaciones)";
const DEFAULT_REGION_HINT: &str = "El Salvador";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_GEOCODING_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_MAP_READY_ATTEMPTS: u32 = 3;
const DEFAULT_MAP_READY_DELAY_MS: u64 = 250;
const DEFAULT_UTC_OFFSET_MINUTES: i32 = -360; // America/El_Salvador, no DST

/// Quote backend settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default)]
pub struct QuoteApiConfig {
    /// Base URL of the REST service (quotes live under `{base_url}/quotes`)
    #[validate(url)]
    pub base_url: String,

    /// Bearer token of the signed-in client
    pub auth_token: Option<String>,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 120))]
    pub timeout_secs: u64,

    /// Value sent as `createdFrom` on every quote
    pub created_from: String,

    /// Value sent as `version` on every quote
    pub payload_version: String,
}

impl Default for QuoteApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_QUOTE_API_URL.to_string(),
            auth_token: None,
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            created_from: "app-cliente".to_string(),
            payload_version: "1.0".to_string(),
        }
    }
}

impl QuoteApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Geocoding lookup settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default)]
pub struct GeocodingConfig {
    /// Base URL of the Nominatim-compatible service
    #[validate(url)]
    pub base_url: String,

    /// User agent sent with every lookup (required by public Nominatim)
    #[validate(length(min = 1))]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 60))]
    pub timeout_secs: u64,

    /// Full passes over the query variants before giving up
    #[validate(range(min = 1, max = 5))]
    pub max_attempts: u32,

    /// Pause between passes, in milliseconds
    pub retry_delay_ms: u64,

    /// Country/region name preferred when picking among candidates
    pub region_hint: String,

    /// Locality suffixes appended to the raw text, tried in order
    pub locality_suffixes: Vec<String>,

    /// Reverse lookup zoom levels, most precise first
    #[validate(length(min = 1))]
    pub reverse_zoom_levels: Vec<u8>,

    /// Candidates requested per forward lookup
    #[validate(range(min = 1, max = 50))]
    pub result_limit: u32,

    /// Consecutive transport failures before lookups fail fast
    #[validate(range(min = 1))]
    pub breaker_failure_threshold: u32,

    /// Seconds the breaker stays open before a trial request is allowed
    pub breaker_reset_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEOCODING_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            max_attempts: DEFAULT_GEOCODING_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            region_hint: DEFAULT_REGION_HINT.to_string(),
            locality_suffixes: vec![
                "El Salvador".to_string(),
                "San Salvador, El Salvador".to_string(),
            ],
            reverse_zoom_levels: vec![18, 16, 14, 10],
            result_limit: 5,
            breaker_failure_threshold: 5,
            breaker_reset_secs: 30,
        }
    }
}

impl GeocodingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Map surface handshake settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default)]
pub struct MapBridgeConfig {
    /// Readiness checks before the queue is flushed best-effort
    #[validate(range(min = 1, max = 10))]
    pub ready_max_attempts: u32,

    /// First wait in milliseconds; doubled on every attempt
    pub ready_base_delay_ms: u64,
}

impl Default for MapBridgeConfig {
    fn default() -> Self {
        Self {
            ready_max_attempts: DEFAULT_MAP_READY_ATTEMPTS,
            ready_base_delay_ms: DEFAULT_MAP_READY_DELAY_MS,
        }
    }
}

/// Schedule derivation settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Offset of the operating timezone from UTC, in minutes
    #[validate(custom = "validate_utc_offset")]
    pub utc_offset_minutes: i32,

    /// Departure time pre-filled on a new session
    pub default_departure_time: String,

    /// Whether the carrier may shift the pickup time
    pub flexibility_allowed: bool,

    /// Tolerance window in minutes when flexibility is allowed
    pub tolerance_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            default_departure_time: "8:00 AM".to_string(),
            flexibility_allowed: true,
            tolerance_minutes: 30,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    #[validate]
    pub quote_api: QuoteApiConfig,

    #[serde(default)]
    #[validate]
    pub geocoding: GeocodingConfig,

    #[serde(default)]
    #[validate]
    pub map_bridge: MapBridgeConfig,

    #[serde(default)]
    #[validate]
    pub schedule: ScheduleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            quote_api: QuoteApiConfig::default(),
            geocoding: GeocodingConfig::default(),
            map_bridge: MapBridgeConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl AppConfig {
    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_utc_offset(minutes: i32) -> Result<(), ValidationError> {
    if (-720..=840).contains(&minutes) {
        Ok(())
    } else {
        let mut err = ValidationError::new("utc_offset_minutes");
        err.message = Some("utc_offset_minutes must be between -720 and 840".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("freight_quote={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(
            File::with_name(&config_dir.join("default").to_string_lossy()).required(false),
        )
        .add_source(File::with_name(&config_dir.join(&run_env).to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
