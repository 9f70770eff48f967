//! Meridian - a microservice control plane: service registry, config server,
//! and API gateway in one binary.
//!
//! Meridian implements a **hexagonal architecture**: business logic lives in
//! `core`, the seams are traits in `ports`, and the I/O lives in `adapters`.
//! This library exposes the building blocks so you can embed the control
//! plane or compose parts of it inside your own application.
//!
//! # Features
//! - Service registry with lease-based liveness: instances register, send
//!   heartbeats, and are evicted when their lease lapses
//! - Config server over a local file repository with layered resolution
//!   (application / profile / label precedence) and hot re-scan on change
//! - API gateway with prefix routing, per-route filter chains, and
//!   round-robin / random load balancing over live registry instances
//! - Two listeners: the gateway data plane and the registry + config
//!   control plane
//! - Configuration validation and structured tracing via `tracing`
//! - Graceful shutdown
//!
//! # Quick Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use meridian::{ServiceRegistry, core::RouteTable};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let registry = Arc::new(ServiceRegistry::new(Duration::from_secs(30)));
//! registry.register("task-service", "a", "10.0.0.5", 9001).await;
//! let table = RouteTable::from_definitions(&[])?;
//! // You would normally wire these into GatewayService and the provided
//! // HTTP routers (see the binary crate)
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping business logic inside `core`. End users should prefer the
//! re-exports documented below instead of reaching into internal modules
//! directly.
//!
//! # Error Handling
//! All fallible APIs return `eyre::Result<T>` or a domain specific error type
//! (`RegistryError`, `ConfigError`, `UpstreamError`, `GatewayError`). Custom
//! error context is attached using `WrapErr` for debuggability.
//!
//! # Concurrency & Data Structures
//! For shared mutable maps the project uses `scc::HashMap` instead of
//! `dashmap` to maintain predictable performance characteristics under
//! contention. Configuration snapshots are published through `arc-swap` so
//! readers never block writers.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{FileConfigSource, GatewayHandler, UpstreamClient},
    core::{ConfigResolver, GatewayService, ServiceRegistry},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
