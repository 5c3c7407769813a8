//! # Kernel
//!
//! The service registry at the heart of `plpkernel-core`.
//!
//! - [`Kernel`](registry::Kernel) owns registrations, the singleton cache and
//!   the merged configuration store, and resolves names to live instances.
//! - [`Service`](service::Service) and [`ServiceFactory`](service::ServiceFactory)
//!   are the contract every registrable service implements.
//! - [`constants`] holds bootstrap service names and option keys.
//! - [`Error`](error::Error) and the `Result` alias live in `error`.
pub mod constants;
pub mod error;
pub mod registry;
pub mod service;

pub use error::{Error, Result};
pub use registry::{Kernel, KernelBuilder};
pub use service::{InstantiationMode, Registration, Service, ServiceArgs, ServiceFactory, ServiceHandle};

#[cfg(test)]
mod tests;
