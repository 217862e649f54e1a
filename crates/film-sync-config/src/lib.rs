//! Configuration and logging bootstrap shared by every film-sync process.
//!
//! A process builds exactly one [`Config`] at startup (defaults, then
//! environment, then an optional JSON file) and hands it down to the store,
//! the stream client and the HTTP layer. Nothing reads the environment after
//! that point.

mod config;
mod error;
mod logging;

pub use config::{
    AppConfig, Config, LogFormat, StoreConfig, StreamConfig, DEFAULT_APP_PORT, DEFAULT_BLOCK_MS,
    DEFAULT_LOG_LEVEL, DEFAULT_QUERY_TIMEOUT, DEFAULT_STREAM_URL,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::init_logging;
