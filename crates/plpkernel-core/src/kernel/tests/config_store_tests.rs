use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::tempdir;

use super::common::{CountingFactory, test_kernel};
use crate::kernel::constants::{self, keys};
use crate::kernel::error::{Error, Result};
use crate::kernel::registry::Kernel;
use crate::kernel::service::InstantiationMode;
use crate::storage::{ConfigData, StorageSystemError};

#[test]
fn test_get_config_value_default_when_absent() {
    let (kernel, _guard) = test_kernel();
    assert_eq!(kernel.get_config_value("x", false), Value::Bool(false));
    assert_eq!(kernel.get_config_value("x", "fallback"), json!("fallback"));
    assert_eq!(kernel.config_value::<String>("x"), None);
}

#[test]
fn test_kernel_defaults_seeded() {
    let (kernel, guard) = test_kernel();
    let root = guard.path();

    assert_eq!(kernel.config_value::<std::path::PathBuf>(keys::ROOT_PATH).as_deref(), Some(root));
    assert_eq!(
        kernel.config_value::<std::path::PathBuf>(keys::LOG_PATH),
        Some(root.join(constants::LOGS_DIR))
    );
    assert_eq!(
        kernel.config_value::<std::path::PathBuf>(keys::SERVICE_CONFIG_PATH),
        Some(root.join(constants::CONFIGS_DIR))
    );

    let assets = root.join("assets");
    assert_eq!(kernel.config_value::<std::path::PathBuf>(keys::ASSETS_PATH), Some(assets.clone()));
    assert_eq!(kernel.config_value::<std::path::PathBuf>(keys::JS_PATH), Some(assets.join("js")));
    assert_eq!(kernel.config_value::<std::path::PathBuf>(keys::IMG_PATH), Some(assets.join("img")));
    assert_eq!(kernel.config_value::<std::path::PathBuf>(keys::CSS_PATH), Some(assets.join("css")));
}

#[test]
fn test_defaults_merged_on_first_resolution() -> Result<()> {
    let (kernel, _guard) = test_kernel();
    let factory = CountingFactory::new().with_defaults(ConfigData::new().with("x", 7).with("color", "blue"));
    kernel.register_factory("widget", Arc::new(factory), InstantiationMode::LazySingleton, None)?;

    // not merged until the service is built
    assert_eq!(kernel.get_config_value("x", false), Value::Bool(false));

    kernel.resolve("widget")?;
    assert_eq!(kernel.get_config_value("x", false), json!(7));
    assert_eq!(kernel.config_value::<String>("color").as_deref(), Some("blue"));
    Ok(())
}

#[test]
fn test_kernel_overrides_win_over_defaults() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let kernel = Kernel::builder()
        .root_path(temp_dir.path())
        .with_option("color", "green")
        .build()?;
    let factory = CountingFactory::new().with_defaults(ConfigData::new().with("color", "blue").with("x", 1));
    kernel.register_factory("widget", Arc::new(factory), InstantiationMode::LazySingleton, None)?;

    kernel.resolve("widget")?;
    assert_eq!(kernel.get_config_value("color", false), json!("green"));
    assert_eq!(kernel.get_config_value("x", false), json!(1));
    Ok(())
}

#[test]
fn test_first_declared_default_is_kept() -> Result<()> {
    let (kernel, _guard) = test_kernel();
    let first = CountingFactory::new().with_defaults(ConfigData::new().with("shared", "first"));
    let second = CountingFactory::new().with_defaults(ConfigData::new().with("shared", "second"));
    kernel.register_factory("first", Arc::new(first), InstantiationMode::LazySingleton, None)?;
    kernel.register_factory("second", Arc::new(second), InstantiationMode::LazySingleton, None)?;

    kernel.resolve("first")?;
    kernel.resolve("second")?;
    assert_eq!(kernel.get_config_value("shared", false), json!("first"));
    Ok(())
}

#[test]
fn test_merge_is_idempotent_across_factory_resolutions() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let kernel = Kernel::builder()
        .root_path(temp_dir.path())
        .with_option("limit", 10)
        .build()?;
    let defaults = ConfigData::new().with("limit", 3).with("mode", "fast");
    kernel.register_factory(
        "widget",
        Arc::new(CountingFactory::new().with_defaults(defaults.clone())),
        InstantiationMode::Factory,
        None,
    )?;

    kernel.resolve("widget")?;
    let after_first = kernel.config_snapshot();
    kernel.resolve("widget")?;
    assert_eq!(kernel.config_snapshot(), after_first);

    kernel.merge_defaults("widget", &defaults, &ConfigData::new());
    assert_eq!(kernel.config_snapshot(), after_first);
    assert_eq!(after_first.get::<i64>("limit"), Some(10));
    Ok(())
}

#[test]
fn test_logger_default_max_size_merged() -> Result<()> {
    let (kernel, _guard) = test_kernel();
    assert_eq!(kernel.config_value::<u64>(keys::LOG_MAX_SIZE), None);

    kernel.logger()?;
    assert_eq!(kernel.config_value::<u64>(keys::LOG_MAX_SIZE), Some(constants::DEFAULT_LOG_MAX_SIZE));
    Ok(())
}

#[test]
fn test_kernel_config_file_layered_under_builder() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config_dir = temp_dir.path().join("etc");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("kernel.json"),
        r#"{"log_max_size": 64, "greeting": "from file", "log_path": "var/log"}"#,
    )
    .unwrap();

    let kernel = Kernel::builder()
        .root_path(temp_dir.path())
        .config_dir(&config_dir)
        .with_option("greeting", "from builder")
        .build()?;

    assert_eq!(kernel.get_config_value("greeting", false), json!("from builder"));
    assert_eq!(kernel.get_config_value(keys::LOG_PATH, false), json!("var/log"));
    assert_eq!(
        kernel.config_value::<std::path::PathBuf>(keys::SERVICE_CONFIG_PATH),
        Some(config_dir.clone())
    );

    // the logger's own default loses to the kernel file
    let logger = kernel.logger()?;
    assert_eq!(logger.max_size(), 64);
    assert_eq!(kernel.config_value::<u64>(keys::LOG_MAX_SIZE), Some(64));
    Ok(())
}

#[test]
fn test_malformed_kernel_config_fails_construction() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    std::fs::write(temp_dir.path().join("kernel.json"), "{ broken").unwrap();

    let result = Kernel::builder()
        .root_path(temp_dir.path())
        .config_dir(temp_dir.path())
        .build();
    assert!(matches!(
        result,
        Err(Error::StorageSystem(StorageSystemError::DeserializationError { .. }))
    ));
}

#[test]
fn test_service_config_file_layered_between_defaults_and_kernel() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config_dir = temp_dir.path().join("configs");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("widget.json"), r#"{"color": "red", "size": 4, "extra": true}"#).unwrap();
    std::fs::write(config_dir.join("kernel.json"), r#"{"size": 9}"#).unwrap();

    let kernel = Kernel::builder()
        .root_path(temp_dir.path())
        .config_dir(&config_dir)
        .build()?;
    let defaults = ConfigData::new().with("color", "blue").with("size", 1).with("shape", "round");
    kernel.register_factory(
        "widget",
        Arc::new(CountingFactory::new().with_defaults(defaults)),
        InstantiationMode::LazySingleton,
        None,
    )?;

    kernel.resolve("widget")?;
    assert_eq!(kernel.get_config_value("color", false), json!("red"));
    assert_eq!(kernel.get_config_value("size", false), json!(9));
    assert_eq!(kernel.get_config_value("shape", false), json!("round"));
    // only declared keys reach the store
    assert_eq!(kernel.get_config_value("extra", false), json!(false));
    Ok(())
}

#[test]
fn test_service_config_file_uses_registered_file_name() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    std::fs::write(temp_dir.path().join("shared.toml"), "color = \"teal\"\n").unwrap();

    let kernel = Kernel::builder()
        .root_path(temp_dir.path())
        .config_dir(temp_dir.path())
        .build()?;
    let factory = CountingFactory::new().with_defaults(ConfigData::new().with("color", "blue"));
    kernel.register_factory("widget", Arc::new(factory), InstantiationMode::Factory, Some("shared"))?;

    kernel.resolve("widget")?;
    let after_first = kernel.config_snapshot();
    kernel.resolve("widget")?;
    assert_eq!(kernel.config_snapshot(), after_first);
    assert_eq!(after_first.get::<String>("color").as_deref(), Some("teal"));
    Ok(())
}
