use std::env;

pub const DEFAULT_JETSTREAM_URL: &str = "wss://jetstream2.us-east.bsky.network/subscribe";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub jetstream_url: String,
    /// `env_logger` filter directives used by the binary
    pub rust_log: String,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jetstream_url =
            env::var("JETSTREAM_URL").unwrap_or_else(|_| DEFAULT_JETSTREAM_URL.to_string());
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let config = Self {
            jetstream_url,
            rust_log,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jetstream_url.trim().is_empty() {
            return Err(ConfigError::MissingVariable("JETSTREAM_URL".to_string()));
        }

        if !self.jetstream_url.starts_with("ws://") && !self.jetstream_url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(format!(
                "JETSTREAM_URL must start with ws:// or wss://, got {}",
                self.jetstream_url
            )));
        }

        Ok(())
    }
}
