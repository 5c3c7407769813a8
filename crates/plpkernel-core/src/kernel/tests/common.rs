use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;

use crate::kernel::error::Result;
use crate::kernel::registry::Kernel;
use crate::kernel::service::{Service, ServiceArgs, ServiceFactory, ServiceHandle};
use crate::storage::ConfigData;

/// The usable handle a widget service hands out
#[derive(Debug)]
pub struct Widget {
    pub id: usize,
    pub config_name: String,
}

struct WidgetService {
    id: usize,
    config_name: String,
    defaults: ConfigData,
}

impl Service for WidgetService {
    fn default_configs(&self) -> ConfigData {
        self.defaults.clone()
    }

    fn into_instance(self: Box<Self>) -> ServiceHandle {
        Arc::new(Widget {
            id: self.id,
            config_name: self.config_name,
        })
    }
}

/// Builds widgets and counts how often it was asked to
pub struct CountingFactory {
    pub constructed: Arc<AtomicUsize>,
    pub defaults: ConfigData,
    pub delay: Option<Duration>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self {
            constructed: Arc::new(AtomicUsize::new(0)),
            defaults: ConfigData::new(),
            delay: None,
        }
    }

    pub fn with_defaults(mut self, defaults: ConfigData) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn count(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }
}

impl ServiceFactory for CountingFactory {
    fn construct(&self, _kernel: &Kernel, args: &ServiceArgs) -> Result<Box<dyn Service>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let id = self.constructed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(WidgetService {
            id,
            config_name: args.config_name.clone(),
            defaults: self.defaults.clone(),
        }))
    }
}

/// Kernel rooted in a fresh temp dir; keep the guard alive for the test
pub fn test_kernel() -> (Kernel, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temporary directory");
    let kernel = Kernel::builder()
        .root_path(temp_dir.path())
        .build()
        .expect("Kernel::build failed");
    (kernel, temp_dir)
}
