use std::sync::Arc;

use crate::kernel::constants;
use crate::kernel::error::{Error, Result};
use crate::kernel::registry::Kernel;
use crate::kernel::service::{Service, ServiceArgs, ServiceFactory, ServiceHandle};
use crate::services::logger::{LogLevel, LoggerService};
use crate::storage::ConfigData;

/// Records service errors in `<service>/error.log` through the logger.
#[derive(Debug)]
pub struct ErrorService {
    logger: Arc<LoggerService>,
}

impl ErrorService {
    pub fn new(logger: Arc<LoggerService>) -> Self {
        Self { logger }
    }

    /// Non-fatal errors are logged at `error` and return `Ok`. Fatal ones are
    /// logged at `alert` and always come back as
    /// [`Error::FatalServiceError`], with any logging failure as its source.
    pub fn report(
        &self,
        service_name: &str,
        message: &str,
        code: i64,
        context: &ConfigData,
        fatal: bool,
    ) -> Result<()> {
        let mut context = context.clone();
        context.insert("code", code.into());

        let level = if fatal { LogLevel::Alert } else { LogLevel::Error };
        let logged = self
            .logger
            .log(service_name, constants::ERROR_LOG_NAME, level, message, &context);

        if !fatal {
            return logged;
        }
        Err(Error::FatalServiceError {
            service: service_name.to_string(),
            code,
            message: message.to_string(),
            source: logged.err().map(Box::new),
        })
    }
}

impl Service for ErrorService {
    fn into_instance(self: Box<Self>) -> ServiceHandle {
        Arc::new(*self)
    }
}

pub struct ErrorServiceFactory;

impl ServiceFactory for ErrorServiceFactory {
    fn construct(&self, kernel: &Kernel, _args: &ServiceArgs) -> Result<Box<dyn Service>> {
        Ok(Box::new(ErrorService::new(kernel.logger()?)))
    }
}
