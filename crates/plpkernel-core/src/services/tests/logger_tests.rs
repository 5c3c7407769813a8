use std::str::FromStr;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use crate::kernel::constants::keys;
use crate::kernel::error::{Error, Result};
use crate::kernel::registry::Kernel;
use crate::services::logger::{LogLevel, LoggerService, format_line};
use crate::storage::{ConfigData, LocalStorageProvider, StorageProvider, StorageSystemError};

#[test]
fn test_format_line() {
    let empty = format_line(LogLevel::Info, "started", &ConfigData::new());
    assert_eq!(empty, "info: started ( {} )\n");

    let context = ConfigData::new().with("user", "ana").with("attempt", 2);
    let line = format_line(LogLevel::Warning, "retrying", &context);
    assert_eq!(line, "warning: retrying ( {\"attempt\":2,\"user\":\"ana\"} )\n");
}

#[test]
fn test_log_level_parsing() -> Result<()> {
    assert_eq!(LogLevel::from_str("ALERT")?, LogLevel::Alert);
    assert_eq!(LogLevel::from_str("warn")?, LogLevel::Warning);
    assert!(matches!(LogLevel::from_str("loud"), Err(Error::Other(_))));
    assert_eq!(LogLevel::Critical.as_log_level(), log::Level::Error);
    assert_eq!(LogLevel::Notice.as_log_level(), log::Level::Info);
    Ok(())
}

#[test]
fn test_log_creates_service_directory() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let kernel = Kernel::builder().root_path(temp_dir.path()).build()?;

    kernel.log("widget", "events", LogLevel::Info, "spun up", &ConfigData::new())?;
    kernel.log("widget", "events", LogLevel::Debug, "tick", &ConfigData::new().with("n", 1))?;

    let path = temp_dir.path().join("logs/widget/events.log");
    let content = std::fs::read_to_string(&path).expect("log file should exist");
    assert_eq!(content, "info: spun up ( {} )\ndebug: tick ( {\"n\":1} )\n");
    assert_eq!(kernel.logger()?.log_file_path("widget", "events"), path);
    Ok(())
}

#[test]
fn test_log_truncates_past_max_size() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let provider = Arc::new(LocalStorageProvider::new(temp_dir.path().to_path_buf())) as Arc<dyn StorageProvider>;
    let logger = LoggerService::new(provider, temp_dir.path().join("logs"), 64);
    let path = logger.log_file_path("svc", "main");
    let filler = "x".repeat(40);

    logger.log("svc", "main", LogLevel::Info, &filler, &ConfigData::new())?;
    logger.log("svc", "main", LogLevel::Info, &filler, &ConfigData::new())?;
    let grown = std::fs::read_to_string(&path).unwrap();
    assert_eq!(grown.lines().count(), 2);
    assert!(grown.len() as u64 > 64);

    // next write starts over
    logger.log("svc", "main", LogLevel::Notice, "fresh", &ConfigData::new())?;
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "notice: fresh ( {} )\n");
    Ok(())
}

#[test]
fn test_default_threshold_is_one_kib() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let kernel = Kernel::builder().root_path(temp_dir.path()).build()?;
    let logger = kernel.logger()?;
    assert_eq!(logger.max_size(), 1024);

    let line = "y".repeat(100);
    for _ in 0..9 {
        kernel.log("svc", "bulk", LogLevel::Info, &line, &ConfigData::new())?;
    }
    // 114-byte lines: eight fit under 1 KiB, the ninth pushes the file past it
    let content = std::fs::read_to_string(temp_dir.path().join("logs/svc/bulk.log")).unwrap();
    assert_eq!(content.lines().count(), 9);
    assert_eq!(content.len(), 9 * 114);

    kernel.log("svc", "bulk", LogLevel::Info, "after", &ConfigData::new())?;
    let content = std::fs::read_to_string(temp_dir.path().join("logs/svc/bulk.log")).unwrap();
    assert_eq!(content.lines().count(), 1);
    Ok(())
}

#[test]
fn test_max_size_configurable_through_kernel() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let kernel = Kernel::builder()
        .root_path(temp_dir.path())
        .with_option(keys::LOG_MAX_SIZE, 10)
        .with_option(keys::LOG_PATH, json!("elsewhere"))
        .build()?;

    let logger = kernel.logger()?;
    assert_eq!(logger.max_size(), 10);
    kernel.log("svc", "main", LogLevel::Info, "one", &ConfigData::new())?;
    assert!(temp_dir.path().join("elsewhere/svc/main.log").is_file());
    Ok(())
}

#[test]
fn test_unwritable_log_root_reports_io_error() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    // a file where the log root directory should be
    std::fs::write(temp_dir.path().join("logs"), "not a directory").unwrap();
    let kernel = Kernel::builder().root_path(temp_dir.path()).build()?;

    let result = kernel.log("svc", "main", LogLevel::Info, "lost", &ConfigData::new());
    assert!(matches!(result, Err(Error::StorageSystem(StorageSystemError::Io { .. }))));
    Ok(())
}
