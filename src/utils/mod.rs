//! Shared utilities: error types and logging

pub mod error;
pub mod logging;

pub use error::{ClassifierError, Result};
pub use logging::{init_logging, LogConfig, LogLevel};
