//! # Storage
//!
//! Filesystem access for the kernel: a [`StorageProvider`] abstraction with a
//! local implementation, the [`ConfigData`] value map and the
//! [`ConfigDirectory`] loader used by the `config` service.
pub mod config;
pub mod error;
pub mod local;
pub mod provider;

pub use config::{ConfigData, ConfigDirectory, ConfigFormat};
pub use error::StorageSystemError;
pub use local::LocalStorageProvider;
pub use provider::StorageProvider;
