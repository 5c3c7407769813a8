use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kernel::error::Result;
use crate::storage::StorageProvider;
use crate::storage::error::StorageSystemError;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Formats probed, in order, when a config name has no extension
    pub const SEARCH_ORDER: &'static [ConfigFormat] = &[
        ConfigFormat::Json,
        #[cfg(feature = "toml-config")]
        ConfigFormat::Toml,
        #[cfg(feature = "yaml-config")]
        ConfigFormat::Yaml,
    ];

    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// Flat map of option name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigData {
    #[serde(flatten)]
    values: HashMap<String, Value>,
}

impl ConfigData {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Create a configuration from a HashMap
    pub fn from_hashmap(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    /// Get a configuration value
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Get a configuration value with default
    pub fn get_or<T: for<'de> Deserialize<'de>>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Get the raw JSON value
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set a configuration value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value).map_err(|e| StorageSystemError::SerializationError {
            format: "json".to_string(),
            source: Box::new(e),
        })?;
        self.values.insert(key.to_string(), json_value);
        Ok(())
    }

    /// Builder-style `set` for values already in JSON form
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Insert a raw value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Insert only when the key is absent; returns whether it was inserted
    pub fn insert_if_absent(&mut self, key: &str, value: Value) -> bool {
        if self.values.contains_key(key) {
            return false;
        }
        self.values.insert(key.to_string(), value);
        true
    }

    /// Remove a configuration value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Check if key exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Get all keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Merge with another config, overriding existing values
    pub fn merge(&mut self, other: &ConfigData) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// JSON object with keys in sorted order
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Serialize to string based on format
    pub fn serialize(&self, format: ConfigFormat) -> Result<String> {
        let serialized = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(&self).map_err(|e| Box::new(e) as BoxedError),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(&self).map_err(|e| Box::new(e) as BoxedError),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(&self).map_err(|e| Box::new(e) as BoxedError),
        };
        serialized.map_err(|source| {
            StorageSystemError::SerializationError {
                format: format.extension().to_string(),
                source,
            }
            .into()
        })
    }

    /// Deserialize from string based on format; `path` is only used for error context
    pub fn deserialize(data: &str, format: ConfigFormat, path: &Path) -> Result<Self> {
        let parsed = match format {
            ConfigFormat::Json => serde_json::from_str(data).map_err(|e| Box::new(e) as BoxedError),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| Box::new(e) as BoxedError),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(|e| Box::new(e) as BoxedError),
        };
        parsed.map_err(|source| {
            StorageSystemError::DeserializationError {
                format: format.extension().to_string(),
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }
}

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

impl FromIterator<(String, Value)> for ConfigData {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A directory of per-name configuration files (`<dir>/<name>.<ext>`)
/// with an in-memory cache of everything loaded so far.
#[derive(Debug)]
pub struct ConfigDirectory {
    provider: Arc<dyn StorageProvider>,
    dir: PathBuf,
    cache: RwLock<HashMap<String, ConfigData>>,
}

impl ConfigDirectory {
    pub fn new(provider: Arc<dyn StorageProvider>, dir: PathBuf) -> Self {
        Self {
            provider,
            dir,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Locate the file backing `name`.
    ///
    /// A name with a recognised extension maps straight to a file; otherwise
    /// each format in [`ConfigFormat::SEARCH_ORDER`] is probed and the first
    /// existing file wins. Returns `None` when nothing exists.
    pub fn resolve_config_path(&self, name: &str) -> Option<PathBuf> {
        if ConfigFormat::from_path(Path::new(name)).is_some() {
            let path = self.dir.join(name);
            return self.provider.is_file(&path).then_some(path);
        }

        let mut candidates: Vec<PathBuf> = ConfigFormat::SEARCH_ORDER
            .iter()
            .map(|format| self.dir.join(format!("{}.{}", name, format.extension())))
            .collect();
        #[cfg(feature = "yaml-config")]
        candidates.push(self.dir.join(format!("{}.yml", name)));

        candidates.into_iter().find(|path| self.provider.is_file(path))
    }

    /// Load (or fetch from cache) the config stored under `name`.
    /// A missing file yields an empty config.
    pub fn load(&self, name: &str) -> Result<ConfigData> {
        if let Some(config) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(name) {
            return Ok(config.clone());
        }

        let config = match self.resolve_config_path(name) {
            Some(path) => {
                let format = ConfigFormat::from_path(&path)
                    .ok_or_else(|| StorageSystemError::UnsupportedConfigFormat(path.clone()))?;
                let content = self.provider.read_to_string(&path)?;
                log::debug!("Loaded config '{}' from {}", name, path.display());
                ConfigData::deserialize(&content, format, &path)?
            }
            None => ConfigData::new(),
        };

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), config.clone());
        Ok(config)
    }

    /// Invalidate the cache for a specific configuration
    pub fn invalidate_cache(&self, name: &str) {
        self.cache.write().unwrap_or_else(PoisonError::into_inner).remove(name);
    }

    /// Clear the entire configuration cache
    pub fn clear_cache(&self) {
        self.cache.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Names (file stems) of every recognised config file in the directory
    pub fn list_configs(&self) -> Result<Vec<String>> {
        if !self.provider.is_dir(&self.dir) {
            return Ok(vec![]);
        }

        let mut names: Vec<String> = self
            .provider
            .read_dir(&self.dir)?
            .into_iter()
            .filter(|path| self.provider.is_file(path) && ConfigFormat::from_path(path).is_some())
            .filter_map(|path| path.file_stem().and_then(|stem| stem.to_str().map(String::from)))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
