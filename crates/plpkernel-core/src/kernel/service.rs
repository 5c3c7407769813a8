use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::kernel::error::Result;
use crate::kernel::registry::Kernel;
use crate::storage::ConfigData;

/// A live, shareable service instance as handed out by [`Kernel::resolve`].
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

/// How a registration turns into instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstantiationMode {
    /// Built on first resolution, cached for the kernel's lifetime.
    LazySingleton,
    /// Built fresh on every resolution, never cached.
    Factory,
    /// Name reserved without a constructor; resolves to nothing.
    Placeholder,
}

impl fmt::Display for InstantiationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstantiationMode::LazySingleton => "lazy-singleton",
            InstantiationMode::Factory => "factory",
            InstantiationMode::Placeholder => "placeholder",
        };
        f.write_str(s)
    }
}

/// Descriptor created by `register`; never mutated afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    name: String,
    source_id: String,
    mode: InstantiationMode,
    config_file_name: Option<String>,
}

impl Registration {
    pub(crate) fn new(
        name: &str,
        source_id: &str,
        mode: InstantiationMode,
        config_file_name: Option<&str>,
    ) -> Self {
        Self {
            name: name.to_string(),
            source_id: source_id.to_string(),
            mode,
            config_file_name: config_file_name.map(str::to_string),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn mode(&self) -> InstantiationMode {
        self.mode
    }

    pub fn config_file_name(&self) -> Option<&str> {
        self.config_file_name.as_deref()
    }

    /// Config name the service reads, falling back to the service name
    pub fn config_name(&self) -> &str {
        self.config_file_name.as_deref().unwrap_or(&self.name)
    }
}

/// What a factory receives besides the kernel itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceArgs {
    /// Name the service was registered under
    pub service_name: String,
    /// Config name inside the service config directory (file stem or file name)
    pub config_name: String,
    /// `service_config_path` joined with `config_name`
    pub config_path: PathBuf,
}

/// A constructed service, before it is handed out.
///
/// `into_instance` may return a different object than `self`: construction
/// can do setup work and expose only the usable handle.
pub trait Service: Send {
    /// Options this service expects, with their default values
    fn default_configs(&self) -> ConfigData {
        ConfigData::new()
    }

    fn into_instance(self: Box<Self>) -> ServiceHandle;
}

/// Named constructor stored per registration
pub trait ServiceFactory: Send + Sync {
    fn construct(&self, kernel: &Kernel, args: &ServiceArgs) -> Result<Box<dyn Service>>;
}

impl<F> ServiceFactory for F
where
    F: Fn(&Kernel, &ServiceArgs) -> Result<Box<dyn Service>> + Send + Sync,
{
    fn construct(&self, kernel: &Kernel, args: &ServiceArgs) -> Result<Box<dyn Service>> {
        self(kernel, args)
    }
}

/// Service names are lowercase slugs: `mon_service` is fine, `Mon Service` is not.
pub fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
