//! # shmbridge Utilities
//!
//! Shared utilities, logging, and config for shmbridge.
//!
//! This crate provides the ambient pieces hosts of the bridge need around
//! `shmbridge-core`: a `tracing` subscriber setup and environment-driven
//! agent settings.

pub mod config;
pub mod logging;

pub use config::{AgentSettings, ConfigError};
// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with, init_logging_with_level, LogConfig, LogFormat, LogLevel, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
