pub mod config;
pub mod error_handler;
pub mod jetstream_client;

pub use config::{ConfigError, RuntimeConfig};
pub use jetstream_client::{run_with_reconnect, ClientError};
