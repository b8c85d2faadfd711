//! Configuration and wiring for the courier notification sender

pub mod config;

pub use config::{Config, ConfigError, Courier, DEFAULT_CONFIG_PATH};
