//! Core gateway orchestration service.
//!
//! `GatewayService` joins the immutable route table with the live service
//! registry: it matches inbound requests against routes and selects one Up
//! instance of the target service through the configured load-balancing
//! strategy. This layer does no I/O of its own — forwarding is the
//! gateway handler adapter's job — so it stays fast and easily testable.
use std::sync::Arc;

use http::Method;
use thiserror::Error;

use crate::{
    config::models::LoadBalanceStrategy,
    core::{
        load_balancer::{LoadBalancingStrategy, RandomStrategy, RoundRobinStrategy},
        registry::{ServiceInstance, ServiceRegistry},
        route_table::{Route, RouteTable},
    },
};

/// Terminal per-request routing failures, each mapped to a distinct caller
/// response by the gateway handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No route predicate matched the request.
    #[error("no route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// The matched route's service has zero Up instances.
    #[error("service '{service}' has no available instances")]
    Unavailable { service: String },
}

/// Matches routes and picks upstream instances. Cheap to share via `Arc`.
pub struct GatewayService {
    registry: Arc<ServiceRegistry>,
    route_table: RouteTable,
    round_robin: RoundRobinStrategy,
    random: RandomStrategy,
}

impl GatewayService {
    pub fn new(registry: Arc<ServiceRegistry>, route_table: RouteTable) -> Self {
        if route_table.is_empty() {
            tracing::warn!("gateway started with an empty route table; all requests will 404");
        }
        Self {
            registry,
            route_table,
            round_robin: RoundRobinStrategy::new(),
            random: RandomStrategy::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.route_table
    }

    /// Match the request against the route table (ascending order, first
    /// predicate hit wins).
    pub fn match_route(&self, path: &str, method: &Method) -> Result<&Route, GatewayError> {
        self.route_table
            .match_route(path, method)
            .ok_or_else(|| GatewayError::RouteNotFound {
                method: method.to_string(),
                path: path.to_string(),
            })
    }

    /// Look up the route's target service and pick one Up instance with the
    /// route's load-balancing strategy. Fails with `Unavailable` (and
    /// performs no further work) when the lookup snapshot is empty.
    pub async fn select_instance(&self, route: &Route) -> Result<ServiceInstance, GatewayError> {
        let instances = self.registry.lookup(&route.service).await;
        let strategy: &dyn LoadBalancingStrategy = match route.strategy {
            LoadBalanceStrategy::RoundRobin => &self.round_robin,
            LoadBalanceStrategy::Random => &self.random,
        };
        strategy
            .select(&route.service, &instances)
            .cloned()
            .ok_or_else(|| GatewayError::Unavailable {
                service: route.service.clone(),
            })
    }
}
