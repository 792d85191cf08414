pub mod config;
pub mod seed;

pub use config::{ConfigError, ServerConfig};
