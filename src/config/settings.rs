use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::error::ConfigError;

pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 3000;
pub const MIN_BATCH_INTERVAL_MS: u64 = 100;
pub const MAX_BATCH_INTERVAL_MS: u64 = 60_000;

pub const DEFAULT_BATCH_MAX_SIZE: usize = 100;
pub const MIN_BATCH_MAX_SIZE: usize = 1;
pub const MAX_BATCH_MAX_SIZE: usize = 10_000;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub batch: BatchSettings,
    pub logging: LoggingSettings,
}

/// Where the WebSocket server binds.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Flush policy of the batch scheduler.
///
/// A flush happens when `interval_ms` has elapsed since the previous one, or
/// as soon as `max_size` distinct vehicles are waiting, whichever comes first.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub interval_ms: u64,
    pub max_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled in from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub batch: Option<PartialBatchSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBatchSettings {
    pub interval_ms: Option<u64>,
    pub max_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            batch: BatchSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_BATCH_INTERVAL_MS,
            max_size: DEFAULT_BATCH_MAX_SIZE,
        }
    }
}

impl Settings {
    /// Fill the gaps in `partial` with defaults.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let server = partial.server;
        let batch = partial.batch;
        let logging = partial.logging;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
            },
            batch: BatchSettings {
                interval_ms: batch
                    .as_ref()
                    .and_then(|b| b.interval_ms)
                    .unwrap_or(default.batch.interval_ms),
                max_size: batch
                    .as_ref()
                    .and_then(|b| b.max_size)
                    .unwrap_or(default.batch.max_size),
            },
            logging: LoggingSettings {
                level: logging
                    .and_then(|l| l.level)
                    .unwrap_or(default.logging.level),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batch.validate()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl BatchSettings {
    pub fn new(interval_ms: u64, max_size: usize) -> Result<Self, ConfigError> {
        let settings = Self {
            interval_ms,
            max_size,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BATCH_INTERVAL_MS..=MAX_BATCH_INTERVAL_MS).contains(&self.interval_ms) {
            return Err(ConfigError::OutOfRange {
                name: "batch.interval_ms",
                value: self.interval_ms,
                min: MIN_BATCH_INTERVAL_MS,
                max: MAX_BATCH_INTERVAL_MS,
            });
        }
        if !(MIN_BATCH_MAX_SIZE..=MAX_BATCH_MAX_SIZE).contains(&self.max_size) {
            return Err(ConfigError::OutOfRange {
                name: "batch.max_size",
                value: self.max_size as u64,
                min: MIN_BATCH_MAX_SIZE as u64,
                max: MAX_BATCH_MAX_SIZE as u64,
            });
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
