use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::kernel::error::Result;
use crate::kernel::registry::Kernel;
use crate::kernel::service::{Service, ServiceArgs, ServiceFactory, ServiceHandle};
use crate::storage::{ConfigData, ConfigDirectory};

/// Reads per-name config files from the kernel's config directory.
///
/// Lookups use `"<file>.<key>[.<nested>...]"`, so `get_value("test1.test1")`
/// reads key `test1` from `test1.json` (or `.toml`/`.yaml`). Without a
/// config directory every lookup comes back empty.
#[derive(Debug, Clone)]
pub struct ConfigService {
    directory: Option<Arc<ConfigDirectory>>,
}

impl ConfigService {
    pub fn new(directory: Option<Arc<ConfigDirectory>>) -> Self {
        Self { directory }
    }

    pub fn config_dir(&self) -> Option<&Path> {
        self.directory.as_deref().map(ConfigDirectory::path)
    }

    /// Whole config file `name`; empty when there is no such file
    pub fn load(&self, name: &str) -> Result<ConfigData> {
        match &self.directory {
            Some(directory) => directory.load(name),
            None => Ok(ConfigData::new()),
        }
    }

    /// Config file backing a service, as passed to its factory
    pub fn load_for(&self, args: &ServiceArgs) -> Result<ConfigData> {
        self.load(&args.config_name)
    }

    /// Dotted lookup: the first segment names the file, the rest walk into it
    pub fn get_value(&self, path: &str) -> Result<Option<Value>> {
        let Some((file, key_path)) = path.split_once('.') else {
            return Ok(None);
        };
        let config = self.load(file)?;

        let mut segments = key_path.split('.');
        let Some(first) = segments.next() else {
            return Ok(None);
        };
        let mut current = match config.get_raw(first) {
            Some(value) => value,
            None => return Ok(None),
        };
        for segment in segments {
            current = match current.get(segment) {
                Some(value) => value,
                None => return Ok(None),
            };
        }
        Ok(Some(current.clone()))
    }

    /// Typed dotted lookup, falling back to `default` when missing or of another type
    pub fn get_value_or<T: for<'de> Deserialize<'de>>(&self, path: &str, default: T) -> Result<T> {
        Ok(self
            .get_value(path)?
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or(default))
    }

    pub fn list_configs(&self) -> Result<Vec<String>> {
        match &self.directory {
            Some(directory) => directory.list_configs(),
            None => Ok(vec![]),
        }
    }

    /// Drop cached files so the next lookup rereads them
    pub fn reload(&self) {
        if let Some(directory) = &self.directory {
            directory.clear_cache();
        }
    }
}

impl Service for ConfigService {
    fn into_instance(self: Box<Self>) -> ServiceHandle {
        Arc::new(*self)
    }
}

pub struct ConfigServiceFactory;

impl ServiceFactory for ConfigServiceFactory {
    fn construct(&self, kernel: &Kernel, _args: &ServiceArgs) -> Result<Box<dyn Service>> {
        Ok(Box::new(ConfigService::new(kernel.config_directory())))
    }
}
