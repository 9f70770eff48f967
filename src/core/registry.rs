//! In-memory service registry with lease-based eviction.
//!
//! The registry is the authoritative directory of live downstream service
//! instances. Instances register themselves, refresh their lease with
//! heartbeats, and are evicted once the lease expires — either lazily at
//! lookup time or by the background sweep task. State is deliberately
//! ephemeral: after a restart the directory rebuilds itself from the
//! re-registrations that arrive on the normal heartbeat cadence.
//!
//! Concurrency model: the directory is an `scc::HashMap` keyed by service
//! name, so mutations on one service never serialize operations on another.
//! `lookup` reads a single service entry under its bucket lock and returns a
//! cloned snapshot, never a partially-mutated set.
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use thiserror::Error;

/// Lifecycle status of a registered instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Starting,
    Up,
    Down,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Starting => write!(f, "starting"),
            InstanceStatus::Up => write!(f, "up"),
            InstanceStatus::Down => write!(f, "down"),
        }
    }
}

/// One running, addressable copy of a downstream service.
#[derive(Debug, Clone)]
pub struct ServiceInstance {
    pub service_name: String,
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub status: InstanceStatus,
    pub last_heartbeat: Instant,
}

impl ServiceInstance {
    pub fn new(service_name: &str, instance_id: &str, host: &str, port: u16) -> Self {
        Self {
            service_name: service_name.to_string(),
            instance_id: instance_id.to_string(),
            host: host.to_string(),
            port,
            status: InstanceStatus::Starting,
            last_heartbeat: Instant::now(),
        }
    }

    /// Base URL for forwarding requests to this instance.
    pub fn address(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Status as observed right now: an instance whose lease has lapsed is
    /// reported `Down` even before the sweeper removes it.
    pub fn effective_status(&self, lease_timeout: Duration) -> InstanceStatus {
        if self.status == InstanceStatus::Up && self.last_heartbeat.elapsed() > lease_timeout {
            InstanceStatus::Down
        } else {
            self.status
        }
    }

    fn lease_expired(&self, lease_timeout: Duration) -> bool {
        self.last_heartbeat.elapsed() > lease_timeout
    }
}

/// Errors returned by registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The instance is unknown or was evicted; the caller must re-register.
    #[error("instance '{instance_id}' of service '{service}' is not registered")]
    InstanceNotFound { service: String, instance_id: String },
}

#[derive(Default)]
struct ServiceEntry {
    instances: HashMap<String, ServiceInstance>,
}

/// Directory of live service instances keyed by logical service name.
///
/// Cheap to share behind an `Arc`; all operations take `&self`.
pub struct ServiceRegistry {
    directory: scc::HashMap<String, ServiceEntry>,
    lease_timeout: Duration,
}

impl ServiceRegistry {
    pub fn new(lease_timeout: Duration) -> Self {
        Self {
            directory: scc::HashMap::new(),
            lease_timeout,
        }
    }

    pub fn lease_timeout(&self) -> Duration {
        self.lease_timeout
    }

    /// Register an instance, or replace it if the id is already known.
    ///
    /// Idempotent: repeated calls with the same id simply refresh the lease
    /// and update the advertised address. The instance transitions
    /// Starting -> Up as part of registration.
    pub async fn register(&self, service: &str, instance_id: &str, host: &str, port: u16) {
        let mut instance = ServiceInstance::new(service, instance_id, host, port);
        instance.status = InstanceStatus::Up;

        let mut entry = self
            .directory
            .entry_async(service.to_string())
            .await
            .or_insert_with(ServiceEntry::default);
        let replaced = entry
            .get_mut()
            .instances
            .insert(instance_id.to_string(), instance)
            .is_some();

        if replaced {
            tracing::debug!(service, instance_id, host, port, "re-registered instance");
        } else {
            tracing::info!(service, instance_id, host, port, "registered instance");
        }
    }

    /// Refresh an instance's lease.
    ///
    /// Fails with [`RegistryError::InstanceNotFound`] when the instance was
    /// never registered or has already been evicted — including the window
    /// where the lease lapsed but the sweeper has not run yet. Callers
    /// recover by re-registering.
    pub async fn heartbeat(&self, service: &str, instance_id: &str) -> Result<(), RegistryError> {
        let not_found = || RegistryError::InstanceNotFound {
            service: service.to_string(),
            instance_id: instance_id.to_string(),
        };

        let lease_timeout = self.lease_timeout;
        self.directory
            .update_async(service, |_, entry| {
                match entry.instances.get_mut(instance_id) {
                    Some(instance) if !instance.lease_expired(lease_timeout) => {
                        instance.last_heartbeat = Instant::now();
                        Ok(())
                    }
                    Some(_) => {
                        // Lapsed but unswept: treat as evicted so the caller
                        // re-registers instead of resurrecting a stale record.
                        entry.instances.remove(instance_id);
                        Err(not_found())
                    }
                    None => Err(not_found()),
                }
            })
            .await
            .unwrap_or_else(|| Err(not_found()))
    }

    /// Remove an instance immediately, regardless of lease state.
    pub async fn deregister(&self, service: &str, instance_id: &str) {
        let removed = self
            .directory
            .update_async(service, |_, entry| {
                entry.instances.remove(instance_id).is_some()
            })
            .await
            .unwrap_or(false);
        if removed {
            tracing::info!(service, instance_id, "deregistered instance");
        }
    }

    /// Snapshot of the instances currently Up and within their lease window.
    ///
    /// An empty vector means "service unavailable", not a usage error. The
    /// result is sorted by instance id so round-robin rotation over it is
    /// stable between calls.
    pub async fn lookup(&self, service: &str) -> Vec<ServiceInstance> {
        let lease_timeout = self.lease_timeout;
        let mut instances = self
            .directory
            .read_async(service, |_, entry| {
                entry
                    .instances
                    .values()
                    .filter(|i| i.effective_status(lease_timeout) == InstanceStatus::Up)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await
            .unwrap_or_default();
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        instances
    }

    /// Names of all services with at least one registered instance.
    pub async fn service_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.directory
            .retain_async(|name, _| {
                names.push(name.clone());
                true
            })
            .await;
        names.sort();
        names
    }

    /// Remove every instance whose lease has expired. Returns the number of
    /// evicted instances. Empty service entries are dropped as well.
    pub async fn evict_expired(&self) -> usize {
        let lease_timeout = self.lease_timeout;
        let mut evicted = 0;
        let evicted_ref = &mut evicted;
        self.directory
            .retain_async(|service, entry| {
                entry.instances.retain(|instance_id, instance| {
                    if instance.lease_expired(lease_timeout) {
                        tracing::info!(service, instance_id, "evicting expired instance");
                        *evicted_ref += 1;
                        false
                    } else {
                        true
                    }
                });
                !entry.instances.is_empty()
            })
            .await;
        evicted
    }
}

/// Spawn the background sweep that evicts expired instances every
/// `sweep_interval`. The task runs until aborted.
pub fn spawn_eviction_sweeper(
    registry: Arc<ServiceRegistry>,
    sweep_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = registry.evict_expired().await;
            if evicted > 0 {
                tracing::debug!(evicted, "eviction sweep removed expired instances");
            }
        }
    })
}
