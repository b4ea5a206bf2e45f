//! Configuration loading.
//!
//! Settings are layered as: built-in defaults, then `config/default.*`
//! (any format the `config` crate understands), then environment variables
//! prefixed with `FLEETCAST_`, using `__` between nested keys
//! (`FLEETCAST_BATCH__INTERVAL_MS=500`). The merged result is validated
//! before it is handed out, so an out-of-range batch setting stops the
//! process at start-up.

mod settings;

use config::{Config, Environment, File};

use crate::utils::error::ConfigError;
use settings::PartialSettings;

pub use settings::{
    BatchSettings, LoggingSettings, ServerSettings, Settings, DEFAULT_BATCH_INTERVAL_MS,
    DEFAULT_BATCH_MAX_SIZE, MAX_BATCH_INTERVAL_MS, MAX_BATCH_MAX_SIZE, MIN_BATCH_INTERVAL_MS,
    MIN_BATCH_MAX_SIZE,
};

pub const ENV_PREFIX: &str = "FLEETCAST";

/// Loads `config/default` relative to the working directory, then the
/// environment, and validates the result.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit base path for the config file
/// (without extension).
pub fn load_config_from(base: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(base).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = Settings::merge(partial);
    settings.validate()?;
    Ok(settings)
}
