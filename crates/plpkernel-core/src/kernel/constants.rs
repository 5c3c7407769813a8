/// Application name
pub const APP_NAME: &str = "plpkernel";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bootstrap service: configuration reader
pub const CONFIG_SERVICE: &str = "config";

/// Bootstrap service: per-service file logger
pub const LOGGER_SERVICE: &str = "logger";

/// Bootstrap service: error reporter
pub const ERROR_SERVICE: &str = "error";

/// Services the kernel registers before anything else
pub const BOOTSTRAP_SERVICES: [&str; 3] = [CONFIG_SERVICE, LOGGER_SERVICE, ERROR_SERVICE];

/// Name of the kernel's own config file inside the config directory
pub const KERNEL_CONFIG_NAME: &str = "kernel";

/// Default log directory, relative to the root path
pub const LOGS_DIR: &str = "logs";

/// Default config directory, relative to the root path
pub const CONFIGS_DIR: &str = "configs";

/// Default assets directory, relative to the root path
pub const ASSETS_DIR: &str = "assets";

/// Subdirectories of the assets directory
pub const JS_DIR: &str = "js";
pub const IMG_DIR: &str = "img";
pub const CSS_DIR: &str = "css";

/// Log file that `report_error` writes to
pub const ERROR_LOG_NAME: &str = "error";

/// Log files larger than this are truncated on the next write
pub const DEFAULT_LOG_MAX_SIZE: u64 = 1024;

/// Option names the kernel seeds into the configuration store
pub mod keys {
    pub const ROOT_PATH: &str = "root_path";
    pub const LOG_PATH: &str = "log_path";
    pub const CONFIG_PATH: &str = "config_path";
    pub const ASSETS_PATH: &str = "assets_path";
    pub const JS_PATH: &str = "js_path";
    pub const IMG_PATH: &str = "img_path";
    pub const CSS_PATH: &str = "css_path";
    pub const SERVICE_CONFIG_PATH: &str = "service_config_path";
    pub const LOG_MAX_SIZE: &str = "log_max_size";
}
