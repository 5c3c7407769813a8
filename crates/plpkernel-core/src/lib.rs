//! Lazy, memoized service registry with layered configuration.
//!
//! ```no_run
//! use plpkernel_core::{Kernel, LogLevel, ConfigData};
//!
//! let kernel = Kernel::new(None)?;
//! let config = kernel.config()?;
//! assert!(config.config_dir().is_none());
//! kernel.log("app", "boot", LogLevel::Info, "started", &ConfigData::new())?;
//! # Ok::<(), plpkernel_core::KernelError>(())
//! ```
pub mod kernel;
pub mod services;
pub mod storage;

pub use kernel::error::Error as KernelError;
pub use kernel::{InstantiationMode, Kernel, KernelBuilder, Registration, Service, ServiceArgs, ServiceFactory, ServiceHandle};
pub use services::{ConfigService, ErrorService, LogLevel, LoggerService};
pub use storage::{ConfigData, ConfigFormat, StorageProvider};
