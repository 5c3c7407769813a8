use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use crate::kernel::constants::{self, keys};
use crate::kernel::error::{Error, Result};
use crate::kernel::registry::Kernel;
use crate::kernel::service::{Service, ServiceArgs, ServiceFactory, ServiceHandle};
use crate::storage::{ConfigData, StorageProvider};

/// Severity written at the start of every log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Emergency => "emergency",
            LogLevel::Alert => "alert",
            LogLevel::Critical => "critical",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    /// Level used when mirroring the line to the `log` facade
    pub fn as_log_level(&self) -> log::Level {
        match self {
            LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical | LogLevel::Error => log::Level::Error,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Notice | LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "emergency" => Ok(LogLevel::Emergency),
            "alert" => Ok(LogLevel::Alert),
            "critical" => Ok(LogLevel::Critical),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "notice" => Ok(LogLevel::Notice),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(Error::Other(format!("Unknown log level '{}'", other))),
        }
    }
}

/// `"<level>: <message> ( <context> )"` plus a trailing newline
pub fn format_line(level: LogLevel, message: &str, context: &ConfigData) -> String {
    format!("{}: {} ( {} )\n", level, message, context.to_json())
}

/// Writes per-service log files under the configured log root.
#[derive(Debug)]
pub struct LoggerService {
    storage: Arc<dyn StorageProvider>,
    log_root: PathBuf,
    max_size: u64,
    // size check and write must not interleave
    write_lock: Mutex<()>,
}

impl LoggerService {
    pub fn new(storage: Arc<dyn StorageProvider>, log_root: PathBuf, max_size: u64) -> Self {
        Self {
            storage,
            log_root,
            max_size,
            write_lock: Mutex::new(()),
        }
    }

    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn log_file_path(&self, service_name: &str, log_name: &str) -> PathBuf {
        self.log_root.join(service_name).join(format!("{}.log", log_name))
    }

    /// Append one line; a file already past `max_size` is truncated first.
    pub fn log(
        &self,
        service_name: &str,
        log_name: &str,
        level: LogLevel,
        message: &str,
        context: &ConfigData,
    ) -> Result<()> {
        log::log!(
            target: "plpkernel::service",
            level.as_log_level(),
            "[{}/{}] {}",
            service_name,
            log_name,
            message
        );

        let line = format_line(level, message, context);
        let service_dir = self.log_root.join(service_name);
        let path = self.log_file_path(service_name, log_name);

        let _write = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.storage.is_dir(&service_dir) {
            self.storage.create_dir_all(&service_dir)?;
        }
        if self.storage.is_file(&path) && self.storage.file_len(&path)? > self.max_size {
            log::debug!("Rotating log file {}", path.display());
            self.storage.write_string(&path, &line)
        } else {
            self.storage.append_string(&path, &line)
        }
    }
}

impl Service for LoggerService {
    fn default_configs(&self) -> ConfigData {
        ConfigData::new().with(keys::LOG_MAX_SIZE, constants::DEFAULT_LOG_MAX_SIZE)
    }

    fn into_instance(self: Box<Self>) -> ServiceHandle {
        Arc::new(*self)
    }
}

pub struct LoggerServiceFactory;

impl ServiceFactory for LoggerServiceFactory {
    fn construct(&self, kernel: &Kernel, _args: &ServiceArgs) -> Result<Box<dyn Service>> {
        let log_root: PathBuf = kernel
            .config_value(keys::LOG_PATH)
            .unwrap_or_else(|| PathBuf::from(constants::LOGS_DIR));
        let max_size = kernel
            .config_value(keys::LOG_MAX_SIZE)
            .unwrap_or(constants::DEFAULT_LOG_MAX_SIZE);
        Ok(Box::new(LoggerService::new(kernel.storage(), log_root, max_size)))
    }
}
