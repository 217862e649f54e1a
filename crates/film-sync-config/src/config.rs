//! Process configuration.
//!
//! Values are merged in three layers, later layers winning:
//! built-in defaults, environment variables, then the optional JSON file.

use crate::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default Redis endpoint for the event log.
pub const DEFAULT_STREAM_URL: &str = "redis://127.0.0.1:6379";

/// Default HTTP port for the write API.
pub const DEFAULT_APP_PORT: u16 = 8080;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Bounded execution window applied to every store call.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// XREADGROUP block timeout in milliseconds.
pub const DEFAULT_BLOCK_MS: u64 = 5000;

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Relational store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// SQLite database path, or `:memory:`.
    pub dsn: String,
    /// Upper bound for a single store call.
    pub query_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Event log settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Redis connection URL.
    pub url: String,
    /// Topic name; combined with the partition into the stream key.
    pub topic: String,
    pub partition: u32,
    /// Consumer group. Each process kind supplies its own default.
    pub group: Option<String>,
    /// Consumer name inside the group. Must be stable across restarts so
    /// uncommitted messages are picked up again.
    pub consumer: Option<String>,
    pub block_ms: u64,
    /// Replicas that must acknowledge a publish before it counts as written.
    pub min_replicas: u32,
    pub publish_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            topic: String::new(),
            partition: 0,
            group: None,
            consumer: None,
            block_ms: DEFAULT_BLOCK_MS,
            min_replicas: 0,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

impl StreamConfig {
    /// Redis stream key for the configured topic partition.
    pub fn stream_key(&self) -> String {
        format!("{}:{}", self.topic, self.partition)
    }

    /// Consumer group, falling back to the process default.
    pub fn group_or(&self, default_group: &str) -> String {
        self.group
            .clone()
            .unwrap_or_else(|| default_group.to_string())
    }

    /// Consumer name, falling back to `<group>-0`.
    pub fn consumer_or(&self, default_group: &str) -> String {
        self.consumer
            .clone()
            .unwrap_or_else(|| format!("{}-0", self.group_or(default_group)))
    }
}

/// Write API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_APP_PORT,
        }
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Complete process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub store: StoreConfig,
    pub stream: StreamConfig,
    pub app: AppConfig,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            stream: StreamConfig::default(),
            app: AppConfig::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Build the configuration from defaults, the process environment and
    /// the optional config file.
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an explicit environment lookup.
    pub fn load_with_env<F>(config_path: Option<&Path>, env: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_env(env);

        if let Some(path) = config_path {
            let overlay = FileOverlay::read(path)?;
            config.apply_file(overlay);
        }

        Ok(config)
    }

    /// Reject configurations no process can run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.store.dsn.trim().is_empty() {
            return Err(ConfigError::Invalid("store dsn is empty".to_string()));
        }
        if self.stream.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("stream topic is empty".to_string()));
        }
        if self.store.query_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "store query timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Unparsable environment values are ignored and the previous value kept.
    fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|key| env(*key));

        if let Some(dsn) = env("DATABASE_DSN") {
            self.store.dsn = dsn;
        }
        if let Some(secs) = env("STORE_QUERY_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.store.query_timeout = Duration::from_secs(secs);
        }

        if let Some(url) = first(&["STREAM_URL", "KAFKA_DSN"]) {
            self.stream.url = url;
        }
        if let Some(topic) = first(&["STREAM_TOPIC", "KAFKA_TOPIC"]) {
            self.stream.topic = topic;
        }
        if let Some(partition) =
            first(&["STREAM_PARTITION", "KAFKA_PARTITION"]).and_then(|s| s.parse().ok())
        {
            self.stream.partition = partition;
        }
        if let Some(group) = env("STREAM_GROUP") {
            self.stream.group = Some(group);
        }
        if let Some(consumer) = env("STREAM_CONSUMER") {
            self.stream.consumer = Some(consumer);
        }
        if let Some(block_ms) = env("STREAM_BLOCK_MS").and_then(|s| s.parse().ok()) {
            self.stream.block_ms = block_ms;
        }
        if let Some(replicas) = env("STREAM_MIN_REPLICAS").and_then(|s| s.parse().ok()) {
            self.stream.min_replicas = replicas;
        }

        if let Some(port) = env("APP_PORT").and_then(|s| s.parse().ok()) {
            self.app.port = port;
        }
        if let Some(level) = env("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(format) = env("LOG_FORMAT").and_then(|s| LogFormat::parse(&s)) {
            self.log_format = format;
        }
    }

    fn apply_file(&mut self, overlay: FileOverlay) {
        if let Some(db) = overlay.db {
            if let Some(dsn) = db.dsn {
                self.store.dsn = dsn;
            }
            if let Some(secs) = db.query_timeout_secs {
                self.store.query_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(stream) = overlay.stream {
            if let Some(url) = stream.dsn {
                self.stream.url = url;
            }
            if let Some(topic) = stream.topic {
                self.stream.topic = topic;
            }
            if let Some(partition) = stream.partition {
                self.stream.partition = partition;
            }
            if stream.group.is_some() {
                self.stream.group = stream.group;
            }
            if stream.consumer.is_some() {
                self.stream.consumer = stream.consumer;
            }
            if let Some(block_ms) = stream.block_ms {
                self.stream.block_ms = block_ms;
            }
            if let Some(replicas) = stream.min_replicas {
                self.stream.min_replicas = replicas;
            }
            if let Some(secs) = stream.publish_timeout_secs {
                self.stream.publish_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(app) = overlay.app {
            if let Some(port) = app.port {
                self.app.port = port;
            }
        }

        if let Some(log) = overlay.log {
            if let Some(level) = log.level {
                self.log_level = level;
            }
            if let Some(format) = log.format.as_deref().and_then(LogFormat::parse) {
                self.log_format = format;
            }
        }
    }
}

/// On-disk layout. Every key is optional; absent keys keep the value from
/// the earlier layers.
#[derive(Debug, Default, Deserialize)]
struct FileOverlay {
    #[serde(default)]
    db: Option<DbSection>,
    #[serde(default, alias = "kafka")]
    stream: Option<StreamSection>,
    #[serde(default)]
    app: Option<AppSection>,
    #[serde(default)]
    log: Option<LogSection>,
}

#[derive(Debug, Default, Deserialize)]
struct DbSection {
    dsn: Option<String>,
    query_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamSection {
    #[serde(alias = "url")]
    dsn: Option<String>,
    topic: Option<String>,
    partition: Option<u32>,
    group: Option<String>,
    consumer: Option<String>,
    block_ms: Option<u64>,
    min_replicas: Option<u32>,
    publish_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AppSection {
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LogSection {
    level: Option<String>,
    format: Option<String>,
}

impl FileOverlay {
    fn read(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
