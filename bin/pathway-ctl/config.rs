use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub console: ConsoleConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    pub host_ip: String,
    pub port: u16,
    /// Per-call connect/read timeout in seconds
    pub timeout_secs: f64,
    pub buffer_size: usize,
    /// Settling time between send and receive in milliseconds
    pub settle_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConsoleConfig {
    pub verbosity: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host_ip: "127.0.0.1".to_string(),
            port: 20121,
            timeout_secs: 5.0,
            buffer_size: 1024,
            settle_delay_ms: 500,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            verbosity: "info".to_string(),
        }
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    let mut config_file_found = false;

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
            config_file_found = true;
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else if Path::new("pathway.toml").exists() {
        builder = builder.add_source(File::with_name("pathway.toml"));
        config_file_found = true;
    }

    // If no config file was found, use defaults
    if !config_file_found {
        builder = builder.add_source(Config::try_from(&AppConfig::default())?);
    }

    // Add environment variable overrides with prefix "PATHWAY_"
    builder = builder.add_source(
        Environment::with_prefix("PATHWAY")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize::<AppConfig>()
}

/// Load configuration with error handling
///
/// If a config path is provided and loading fails, this function will panic
/// rather than silently falling back to defaults, since that would likely
/// cause unexpected behavior.
pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            if config_path.is_some() {
                panic!(
                    "Failed to load configuration: {}\n\
                    Please fix the configuration file or remove the --config argument to use defaults.",
                    e
                );
            } else {
                log::warn!("No configuration file found, using defaults");
                AppConfig::default()
            }
        }
    }
}
