use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use serde::Deserialize;
use serde_json::Value;

use crate::kernel::constants::{self, keys};
use crate::kernel::error::{Error, Result};
use crate::kernel::service::{
    InstantiationMode, Registration, ServiceArgs, ServiceFactory, ServiceHandle, is_valid_service_name,
};
use crate::services::{
    ConfigService, ConfigServiceFactory, ErrorService, ErrorServiceFactory, LogLevel, LoggerService,
    LoggerServiceFactory,
};
use crate::storage::{ConfigData, ConfigDirectory, LocalStorageProvider, StorageProvider};

thread_local! {
    /// Names currently being constructed on this thread, outermost first
    static RESOLVING: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Marks `name` as under construction on this thread until dropped
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter(name: &str) -> Result<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|n| n == name) {
                let mut chain = stack.clone();
                chain.push(name.to_string());
                return Err(Error::CircularResolution {
                    service: name.to_string(),
                    chain: chain.join(" -> "),
                });
            }
            stack.push(name.to_string());
            Ok(ResolutionGuard)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Singletons under construction and what their builders are blocked on.
///
/// A thread that would wait on a slot whose builder is, through a chain of
/// other waiting builders, waiting on this thread gets `CircularResolution`
/// instead of blocking forever.
#[derive(Default)]
struct ConstructionTracker {
    state: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    owners: HashMap<String, ThreadId>,
    waiting: HashMap<ThreadId, String>,
}

impl ConstructionTracker {
    /// Record that this thread is about to wait for `name`'s slot
    fn wait_for(&self, name: &str) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut chain = vec![name.to_string()];
        let mut current = name.to_string();
        // every hop visits a distinct owner, so this ends within owners.len() steps
        for _ in 0..=state.owners.len() {
            let Some(owner) = state.owners.get(&current) else {
                break;
            };
            if *owner == me {
                return Err(Error::CircularResolution {
                    service: name.to_string(),
                    chain: chain.join(" -> "),
                });
            }
            let Some(next) = state.waiting.get(owner) else {
                break;
            };
            chain.push(next.clone());
            current = next.clone();
        }

        state.waiting.insert(me, name.to_string());
        Ok(())
    }

    /// This thread now holds `name`'s slot
    fn claim(&self, name: &str) -> ConstructionClaim<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.waiting.remove(&me);
        state.owners.insert(name.to_string(), me);
        ConstructionClaim {
            tracker: self,
            name: name.to_string(),
        }
    }
}

struct ConstructionClaim<'a> {
    tracker: &'a ConstructionTracker,
    name: String,
}

impl Drop for ConstructionClaim<'_> {
    fn drop(&mut self) {
        self.tracker
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .owners
            .remove(&self.name);
    }
}

struct ServiceEntry {
    registration: Registration,
    /// Bound at registration; `None` only for placeholders
    factory: Option<Arc<dyn ServiceFactory>>,
    /// Singleton slot; its lock is the per-name claim for first construction
    instance: Mutex<Option<ServiceHandle>>,
}

/// Builder for [`Kernel`]
#[derive(Debug, Default)]
pub struct KernelBuilder {
    config_dir: Option<PathBuf>,
    root_path: Option<PathBuf>,
    overrides: ConfigData,
}

impl KernelBuilder {
    /// Directory holding `kernel.*` and per-service config files
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Root the default `logs/` and `configs/` paths derive from; defaults to the working directory
    pub fn root_path(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_path = Some(root.into());
        self
    }

    /// Kernel-level value that wins over any service default
    pub fn with_option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.overrides.insert(key, value.into());
        self
    }

    pub fn with_options(mut self, options: &ConfigData) -> Self {
        self.overrides.merge(options);
        self
    }

    pub fn build(self) -> Result<Kernel> {
        let root_path = match self.root_path {
            Some(root) => root,
            None => std::env::current_dir().map_err(|e| {
                crate::storage::StorageSystemError::io(e, "current_dir", PathBuf::from("."))
            })?,
        };
        Kernel::with_parts(root_path, self.config_dir, self.overrides)
    }
}

/// The service registry.
///
/// Owns registrations, the singleton cache and the merged configuration
/// store. `config`, `logger` and `error` are registered during construction,
/// so they are always resolvable before any user service.
pub struct Kernel {
    storage: Arc<dyn StorageProvider>,
    config_directory: Option<Arc<ConfigDirectory>>,
    factories: RwLock<HashMap<String, Arc<dyn ServiceFactory>>>,
    services: RwLock<HashMap<String, Arc<ServiceEntry>>>,
    constructing: ConstructionTracker,
    /// Kernel-declared values; they win over service defaults
    overrides: ConfigData,
    store: RwLock<ConfigData>,
}

impl Kernel {
    /// Creates a kernel rooted at the working directory.
    ///
    /// `config_dir = None` means every service runs on its built-in defaults.
    pub fn new(config_dir: Option<PathBuf>) -> Result<Self> {
        let mut builder = KernelBuilder::default();
        builder.config_dir = config_dir;
        builder.build()
    }

    pub fn builder() -> KernelBuilder {
        KernelBuilder::default()
    }

    fn with_parts(root_path: PathBuf, config_dir: Option<PathBuf>, builder_overrides: ConfigData) -> Result<Self> {
        log::info!("Initializing {} v{}", constants::APP_NAME, constants::APP_VERSION);

        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::new(root_path.clone()));
        let config_directory = config_dir.map(|dir| Arc::new(ConfigDirectory::new(storage.clone(), dir)));

        // kernel.* from the config dir first, builder values on top
        let mut overrides = match &config_directory {
            Some(directory) => {
                log::info!("Using config directory: {}", directory.path().display());
                directory.load(constants::KERNEL_CONFIG_NAME)?
            }
            None => ConfigData::new(),
        };
        overrides.merge(&builder_overrides);

        let mut store = Self::default_configs(&root_path, config_directory.as_deref());
        store.merge(&overrides);

        let kernel = Kernel {
            storage,
            config_directory,
            factories: RwLock::new(HashMap::new()),
            services: RwLock::new(HashMap::new()),
            constructing: ConstructionTracker::default(),
            overrides,
            store: RwLock::new(store),
        };
        kernel.register_bootstrap_services();
        Ok(kernel)
    }

    /// Kernel-level defaults seeded into the configuration store
    pub fn default_configs(root_path: &Path, config_directory: Option<&ConfigDirectory>) -> ConfigData {
        let config_path = root_path.join(constants::CONFIGS_DIR);
        let assets_path = root_path.join(constants::ASSETS_DIR);
        let service_config_path = config_directory
            .map(|directory| directory.path().to_path_buf())
            .unwrap_or_else(|| config_path.clone());

        ConfigData::new()
            .with(keys::ROOT_PATH, path_value(root_path))
            .with(keys::LOG_PATH, path_value(&root_path.join(constants::LOGS_DIR)))
            .with(keys::CONFIG_PATH, path_value(&config_path))
            .with(keys::JS_PATH, path_value(&assets_path.join(constants::JS_DIR)))
            .with(keys::IMG_PATH, path_value(&assets_path.join(constants::IMG_DIR)))
            .with(keys::CSS_PATH, path_value(&assets_path.join(constants::CSS_DIR)))
            .with(keys::ASSETS_PATH, path_value(&assets_path))
            .with(keys::SERVICE_CONFIG_PATH, path_value(&service_config_path))
    }

    fn register_bootstrap_services(&self) {
        let bootstrap: [(&str, Arc<dyn ServiceFactory>); 3] = [
            (constants::CONFIG_SERVICE, Arc::new(ConfigServiceFactory)),
            (constants::LOGGER_SERVICE, Arc::new(LoggerServiceFactory)),
            (constants::ERROR_SERVICE, Arc::new(ErrorServiceFactory)),
        ];
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        for (name, factory) in bootstrap {
            factories.insert(name.to_string(), factory.clone());
            services.insert(
                name.to_string(),
                Arc::new(ServiceEntry {
                    registration: Registration::new(name, name, InstantiationMode::LazySingleton, None),
                    factory: Some(factory),
                    instance: Mutex::new(None),
                }),
            );
        }
    }

    /// Storage provider shared by the bootstrap services
    pub fn storage(&self) -> Arc<dyn StorageProvider> {
        self.storage.clone()
    }

    /// Config directory given at construction, if any
    pub fn config_directory(&self) -> Option<Arc<ConfigDirectory>> {
        self.config_directory.clone()
    }

    /// Make a constructor available under `source_id` for later `register` calls.
    ///
    /// A source id is provided once; the bootstrap services own theirs from
    /// construction.
    pub fn provide_factory(&self, source_id: &str, factory: Arc<dyn ServiceFactory>) -> Result<()> {
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(source_id) {
            log::warn!("Refusing to replace factory source '{}'", source_id);
            return Err(Error::SourceAlreadyProvided {
                source_id: source_id.to_string(),
            });
        }
        factories.insert(source_id.to_string(), factory);
        Ok(())
    }

    /// Register `name`, built by the factory provided under `source_id`.
    ///
    /// Nothing is constructed here. Fails without touching any state when
    /// the name is taken or the source is unknown.
    pub fn register(
        &self,
        name: &str,
        source_id: &str,
        mode: InstantiationMode,
        config_file_name: Option<&str>,
    ) -> Result<()> {
        if !is_valid_service_name(name) {
            return Err(Error::InvalidServiceName(name.to_string()));
        }
        let factory = match mode {
            InstantiationMode::Placeholder => None,
            _ => Some(self.factory(source_id).ok_or_else(|| Error::SourceNotFound {
                service: name.to_string(),
                source_id: source_id.to_string(),
            })?),
        };

        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        Self::insert_entry(&mut services, name, source_id, mode, config_file_name, factory)
    }

    fn insert_entry(
        services: &mut HashMap<String, Arc<ServiceEntry>>,
        name: &str,
        source_id: &str,
        mode: InstantiationMode,
        config_file_name: Option<&str>,
        factory: Option<Arc<dyn ServiceFactory>>,
    ) -> Result<()> {
        if services.contains_key(name) {
            log::warn!("Refusing to re-register service '{}'", name);
            return Err(Error::AlreadyRegistered { service: name.to_string() });
        }
        services.insert(
            name.to_string(),
            Arc::new(ServiceEntry {
                registration: Registration::new(name, source_id, mode, config_file_name),
                factory,
                instance: Mutex::new(None),
            }),
        );
        log::debug!("Registered service '{}' ({}) from source '{}'", name, mode, source_id);
        Ok(())
    }

    /// Provide `factory` under the service's own name and register it
    pub fn register_factory(
        &self,
        name: &str,
        factory: Arc<dyn ServiceFactory>,
        mode: InstantiationMode,
        config_file_name: Option<&str>,
    ) -> Result<()> {
        if !is_valid_service_name(name) {
            return Err(Error::InvalidServiceName(name.to_string()));
        }
        // both checks before either insert, under both locks
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if services.contains_key(name) {
            log::warn!("Refusing to re-register service '{}'", name);
            return Err(Error::AlreadyRegistered { service: name.to_string() });
        }
        if factories.contains_key(name) {
            log::warn!("Refusing to replace factory source '{}'", name);
            return Err(Error::SourceAlreadyProvided {
                source_id: name.to_string(),
            });
        }
        factories.insert(name.to_string(), factory.clone());
        Self::insert_entry(&mut services, name, name, mode, config_file_name, Some(factory))
    }

    /// Reserve a name without a constructor
    pub fn reserve(&self, name: &str) -> Result<()> {
        self.register(name, name, InstantiationMode::Placeholder, None)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Whether a singleton has already been built
    pub fn is_instantiated(&self, name: &str) -> bool {
        self.entry(name).is_some_and(|entry| {
            entry
                .instance
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
        })
    }

    /// All registrations, sorted by name
    pub fn registrations(&self) -> Vec<Registration> {
        let mut registrations: Vec<Registration> = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|entry| entry.registration.clone())
            .collect();
        registrations.sort_by(|a, b| a.name().cmp(b.name()));
        registrations
    }

    fn entry(&self, name: &str) -> Option<Arc<ServiceEntry>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn factory(&self, source_id: &str) -> Option<Arc<dyn ServiceFactory>> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_id)
            .cloned()
    }

    /// Resolve `name` to a live instance.
    ///
    /// Unknown names and placeholders give `Ok(None)`. Singletons are built
    /// at most once, even when several threads race for the first instance.
    pub fn resolve(&self, name: &str) -> Result<Option<ServiceHandle>> {
        let Some(entry) = self.entry(name) else {
            log::debug!("Service '{}' not found", name);
            return Ok(None);
        };

        match entry.registration.mode() {
            InstantiationMode::Placeholder => {
                log::debug!("Service '{}' is a placeholder", name);
                Ok(None)
            }
            InstantiationMode::Factory => {
                let _guard = ResolutionGuard::enter(name)?;
                self.instantiate(&entry).map(Some)
            }
            InstantiationMode::LazySingleton => {
                let _guard = ResolutionGuard::enter(name)?;
                self.constructing.wait_for(name)?;
                let mut slot = entry.instance.lock().unwrap_or_else(PoisonError::into_inner);
                let _claim = self.constructing.claim(name);
                if let Some(instance) = slot.as_ref() {
                    return Ok(Some(instance.clone()));
                }
                let instance = self.instantiate(&entry)?;
                *slot = Some(instance.clone());
                log::debug!("Cached singleton service '{}'", name);
                Ok(Some(instance))
            }
        }
    }

    /// Resolve and downcast to the concrete service type.
    /// A type mismatch is treated like a missing service.
    pub fn resolve_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Option<Arc<T>>> {
        Ok(self.resolve(name)?.and_then(|handle| match handle.downcast::<T>() {
            Ok(typed) => Some(typed),
            Err(_) => {
                log::warn!(
                    "Service '{}' is not a {}",
                    name,
                    std::any::type_name::<T>()
                );
                None
            }
        }))
    }

    fn instantiate(&self, entry: &ServiceEntry) -> Result<ServiceHandle> {
        let registration = &entry.registration;
        let name = registration.name();
        let factory = entry.factory.as_ref().ok_or_else(|| Error::SourceNotFound {
            service: name.to_string(),
            source_id: registration.source_id().to_string(),
        })?;
        let args = self.service_args(registration);
        let service_config = match &self.config_directory {
            Some(directory) => directory.load(registration.config_name())?,
            None => ConfigData::new(),
        };

        log::debug!("Constructing service '{}'", name);
        let service = factory.construct(self, &args).map_err(|e| match e {
            Error::CircularResolution { .. } => e,
            other => Error::ServiceConstruction {
                service: name.to_string(),
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        })?;

        self.merge_defaults(name, &service.default_configs(), &service_config);
        Ok(service.into_instance())
    }

    fn service_args(&self, registration: &Registration) -> ServiceArgs {
        let service_config_path: PathBuf = self
            .config_value(keys::SERVICE_CONFIG_PATH)
            .unwrap_or_else(|| PathBuf::from(constants::CONFIGS_DIR));
        ServiceArgs {
            service_name: registration.name().to_string(),
            config_name: registration.config_name().to_string(),
            config_path: service_config_path.join(registration.config_name()),
        }
    }

    /// Fold a service's defaults into the store.
    ///
    /// For each declared key: a kernel-declared value wins, then the
    /// service's own config file; otherwise the default only fills a key
    /// nobody set yet. Running it again with the same input changes nothing.
    pub(crate) fn merge_defaults(&self, service_name: &str, defaults: &ConfigData, service_config: &ConfigData) {
        if defaults.is_empty() {
            return;
        }
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        for (key, default) in defaults.iter() {
            match self.overrides.get_raw(key).or_else(|| service_config.get_raw(key)) {
                Some(value) => {
                    store.insert(key.clone(), value.clone());
                }
                None => {
                    if store.insert_if_absent(key, default.clone()) {
                        log::trace!("Service '{}' declared default '{}'", service_name, key);
                    }
                }
            }
        }
    }

    /// Merged value of `option_name`, or `default` when absent
    pub fn get_config_value(&self, option_name: &str, default: impl Into<Value>) -> Value {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_raw(option_name)
            .cloned()
            .unwrap_or_else(|| default.into())
    }

    /// Typed lookup in the merged store
    pub fn config_value<T: for<'de> Deserialize<'de>>(&self, option_name: &str) -> Option<T> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(option_name)
    }

    /// Snapshot of the merged configuration store
    pub fn config_snapshot(&self) -> ConfigData {
        self.store.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn config(&self) -> Result<Arc<ConfigService>> {
        self.bootstrap_service(constants::CONFIG_SERVICE)
    }

    pub fn logger(&self) -> Result<Arc<LoggerService>> {
        self.bootstrap_service(constants::LOGGER_SERVICE)
    }

    pub fn error_handler(&self) -> Result<Arc<ErrorService>> {
        self.bootstrap_service(constants::ERROR_SERVICE)
    }

    fn bootstrap_service<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.resolve_as::<T>(name)?
            .ok_or_else(|| Error::Other(format!("Bootstrap service '{}' is unavailable", name)))
    }

    /// Append a line to `<log_path>/<service_name>/<log_name>.log`
    pub fn log(
        &self,
        service_name: &str,
        log_name: &str,
        level: LogLevel,
        message: &str,
        context: &ConfigData,
    ) -> Result<()> {
        self.logger()?.log(service_name, log_name, level, message, context)
    }

    /// Log an error for `service_name`; with `fatal` the call also fails
    /// with [`Error::FatalServiceError`].
    pub fn report_error(
        &self,
        service_name: &str,
        message: &str,
        code: i64,
        context: &ConfigData,
        fatal: bool,
    ) -> Result<()> {
        self.error_handler()?.report(service_name, message, code, context, fatal)
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .registrations()
            .into_iter()
            .map(|registration| registration.name().to_string())
            .collect();
        f.debug_struct("Kernel")
            .field("storage", &self.storage)
            .field("config_directory", &self.config_directory.as_ref().map(|d| d.path().to_path_buf()))
            .field("services", &names)
            .finish()
    }
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}
