//! # Bootstrap Services
//!
//! The three services every [`Kernel`](crate::kernel::Kernel) registers on
//! construction: `config` reads per-service config files, `logger` writes
//! per-service log files and `error` reports failures through the logger.
pub mod config;
pub mod error;
pub mod logger;

pub use config::{ConfigService, ConfigServiceFactory};
pub use error::{ErrorService, ErrorServiceFactory};
pub use logger::{LogLevel, LoggerService, LoggerServiceFactory, format_line};

#[cfg(test)]
mod tests;
