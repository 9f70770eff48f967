use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::core::registry::ServiceInstance;

/// Trait defining the interface for load balancing strategies.
///
/// `instances` is the lookup snapshot for `service`; implementations must
/// tolerate the set changing size between calls for the same service.
pub trait LoadBalancingStrategy: Send + Sync + 'static {
    /// Pick one instance from a non-empty snapshot; `None` when empty.
    fn select<'a>(
        &self,
        service: &str,
        instances: &'a [ServiceInstance],
    ) -> Option<&'a ServiceInstance>;
}

/// Round-robin selection with one rotating cursor per service.
///
/// The cursor is an atomic counter taken modulo the *current* snapshot size,
/// so a shrinking instance set can never index out of bounds; consecutive
/// requests spread across all instances in stable (instance id) order.
#[derive(Default)]
pub struct RoundRobinStrategy {
    cursors: scc::HashMap<String, AtomicUsize>,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancingStrategy for RoundRobinStrategy {
    fn select<'a>(
        &self,
        service: &str,
        instances: &'a [ServiceInstance],
    ) -> Option<&'a ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let cursor = self
            .cursors
            .entry_sync(service.to_string())
            .or_insert_with(|| AtomicUsize::new(0));
        let index = cursor.get().fetch_add(1, Ordering::Relaxed) % instances.len();
        instances.get(index)
    }
}

/// Uniform random selection.
#[derive(Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancingStrategy for RandomStrategy {
    fn select<'a>(
        &self,
        _service: &str,
        instances: &'a [ServiceInstance],
    ) -> Option<&'a ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..instances.len());
        instances.get(index)
    }
}
