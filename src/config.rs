use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Well-known name the durable queue entries are scoped to
    #[serde(default = "default_queue_name")]
    pub name: String,
    /// Maximum events reserved per persistence batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_queue_name() -> String {
    "log_queue".to_string()
}

fn default_batch_size() -> usize {
    100
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Fixed drain interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Base delay for exponential backoff after a failed commit
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Maximum backoff delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Failed commits tolerated within one drain before giving up until the next trigger
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_base_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    5
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestConfig {
    /// Drain through the new event before answering and report `persisted`
    #[serde(default)]
    pub persist_inline: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared API key expected in `x-api-key`
    #[serde(default)]
    pub api_key: Option<String>,
    /// Reject ingestion when no key is configured
    #[serde(default = "default_auth_required")]
    pub required: bool,
}

fn default_auth_required() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            required: default_auth_required(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.url", "postgres://localhost/loghook")?
            .set_default("database.max_connections", 5)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("LOGHOOK_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // LOGHOOK_DATABASE__URL, LOGHOOK_AUTH__API_KEY, ...
            .add_source(
                Environment::with_prefix("LOGHOOK")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Configuration for local runs and tests
    pub fn local(api_key: Option<&str>) -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/loghook".to_string(),
                max_connections: default_max_connections(),
            },
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
            ingest: IngestConfig::default(),
            auth: AuthConfig {
                api_key: api_key.map(str::to_string),
                required: true,
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.queue.name.trim().is_empty() {
            errors.push("queue.name must not be empty".to_string());
        }

        // One connection holds the drain lease while another commits batches
        if self.database.max_connections < 2 {
            errors.push("database.max_connections must be at least 2".to_string());
        }

        if self.queue.batch_size == 0 {
            errors.push("queue.batch_size must be positive".to_string());
        }

        if self.worker.interval_ms == 0 {
            errors.push("worker.interval_ms must be positive".to_string());
        }

        if self.worker.base_backoff_ms > self.worker.max_backoff_ms {
            errors.push("worker.base_backoff_ms must not exceed worker.max_backoff_ms".to_string());
        }

        if self
            .auth
            .api_key
            .as_deref()
            .is_some_and(|k| k.trim().is_empty())
        {
            errors.push("auth.api_key must not be blank when set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
