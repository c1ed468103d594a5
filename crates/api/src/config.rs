use persistence::{StoreBackend, StoreSettings};
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Realtime database connection.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `memory` or `firebase`
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database URL, e.g. `https://<project>-default-rtdb.firebaseio.com`
    #[serde(default)]
    pub url: String,

    /// Database secret or ID token appended as `auth=`
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_store_timeout")]
    pub request_timeout_secs: u64,
}

impl StoreConfig {
    pub fn settings(&self) -> StoreSettings {
        StoreSettings {
            backend: self.backend,
            url: self.url.clone(),
            auth_token: self.auth_token.clone(),
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Delay after which a command still sitting in the device inbox is
    /// cleared.
    #[serde(default = "default_clear_delay_ms")]
    pub clear_delay_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            clear_delay_ms: default_clear_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicesConfig {
    /// Device used when a request does not name one.
    #[serde(default = "default_device_id")]
    pub default_device_id: String,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            default_device_id: default_device_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_store_timeout() -> u64 {
    10
}
fn default_clear_delay_ms() -> u64 {
    5000
}
fn default_device_id() -> String {
    "PILL_DISPENSER_DEFAULT".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with PD__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("PD").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds the config from embedded defaults and overrides only, without
    /// touching config files.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30

            [store]
            backend = "memory"
            url = ""
            request_timeout_secs = 10

            [dispatcher]
            clear_delay_ms = 5000

            [devices]
            default_device_id = "PILL_DISPENSER_DEFAULT"

            [logging]
            level = "info"
            format = "pretty"

            [security]
            cors_origins = []
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        // Validation is skipped so tests can build partial configs.
        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.store.backend == StoreBackend::Firebase && self.store.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "PD__STORE__URL must be set for the firebase backend".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.dispatcher.clear_delay_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatcher.clear_delay_ms must be greater than 0".to_string(),
            ));
        }

        if shared::validation::validate_path_key(&self.devices.default_device_id).is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "devices.default_device_id is not a valid key: {}",
                self.devices.default_device_id
            )));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ConfigValidationError::InvalidValue(format!("Invalid socket address: {}", e)))
    }
}
