//! Configuration data structures for Meridian.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files.
//! They are intentionally serde-friendly and include defaults so that
//! minimal configs remain concise. The route list here is declarative input;
//! it is compiled into the immutable runtime route table at startup.
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_control_addr() -> String {
    "127.0.0.1:8761".to_string()
}

/// Top-level node configuration: one file drives the registry, the config
/// server, and the gateway.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NodeConfig {
    /// Address the gateway (data plane) listens on.
    pub listen_addr: String,
    /// Address the registry + config APIs (control plane) listen on.
    pub control_addr: String,
    pub registry: RegistrySettings,
    pub config_repo: ConfigRepoSettings,
    pub upstream: UpstreamSettings,
    pub routes: Vec<RouteDefinition>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            control_addr: default_control_addr(),
            registry: RegistrySettings::default(),
            config_repo: ConfigRepoSettings::default(),
            upstream: UpstreamSettings::default(),
            routes: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Create a new node configuration builder.
    pub fn builder() -> NodeConfigBuilder {
        NodeConfigBuilder::default()
    }
}

/// Lease and sweep timing for the service registry. Durations are humantime
/// strings ("30s", "2m"). The lease should be a small multiple of the
/// heartbeat interval the downstream services are told to use.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RegistrySettings {
    pub lease_timeout: String,
    pub heartbeat_interval: String,
    pub sweep_interval: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            lease_timeout: "30s".to_string(),
            heartbeat_interval: "10s".to_string(),
            sweep_interval: "5s".to_string(),
        }
    }
}

impl RegistrySettings {
    pub fn lease_timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.lease_timeout)
    }

    pub fn heartbeat_interval(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.heartbeat_interval)
    }

    pub fn sweep_interval(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.sweep_interval)
    }
}

/// Location and default label of the configuration repository.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ConfigRepoSettings {
    /// Root directory: files at the root belong to the default label,
    /// subdirectories are additional labels.
    pub root: String,
    /// Label used when a resolve request does not name one.
    pub default_label: String,
}

impl Default for ConfigRepoSettings {
    fn default() -> Self {
        Self {
            root: "./config-repo".to_string(),
            default_label: "main".to_string(),
        }
    }
}

/// Forwarding behaviour towards upstream instances.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Per-request timeout for the whole upstream exchange (humantime).
    pub timeout: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            timeout: "10s".to_string(),
        }
    }
}

impl UpstreamSettings {
    pub fn timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.timeout)
    }
}

/// Declarative routing rule: predicate, target service, filters.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RouteDefinition {
    pub id: String,
    /// Tie-break for overlapping predicates; lower values win.
    #[serde(default)]
    pub order: i32,
    pub path_prefix: String,
    /// Optional method predicate ("GET", "POST", ...); absent means any.
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    /// Logical service name resolved through the registry.
    pub service: String,
    #[serde(default)]
    pub strategy: LoadBalanceStrategy,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    #[default]
    RoundRobin,
    Random,
}

/// Filter definitions (tagged enum) applied by the gateway around
/// forwarding. A closed set: each kind is interpreted by `core::filters`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind")]
#[serde(rename_all = "snake_case")]
pub enum FilterConfig {
    /// Remove the first `parts` path segments before forwarding.
    StripPrefix { parts: usize },
    /// Rewrite the path with a regex substitution before forwarding.
    RewritePath { pattern: String, replacement: String },
    AddRequestHeader { name: String, value: String },
    RemoveRequestHeader { name: String },
    AddResponseHeader { name: String, value: String },
    /// Reject disallowed cross-origin requests before any upstream call and
    /// stamp allow headers on responses. `allow_origins` may contain "*".
    Cors {
        allow_origins: Vec<String>,
        #[serde(default)]
        allow_methods: Vec<String>,
    },
}

/// Builder for NodeConfig to allow for cleaner configuration creation.
#[derive(Default)]
pub struct NodeConfigBuilder {
    listen_addr: Option<String>,
    control_addr: Option<String>,
    registry: Option<RegistrySettings>,
    config_repo: Option<ConfigRepoSettings>,
    upstream: Option<UpstreamSettings>,
    routes: Vec<RouteDefinition>,
}

impl NodeConfigBuilder {
    /// Set the gateway listen address.
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Set the control plane (registry + config) listen address.
    pub fn control_addr(mut self, addr: impl Into<String>) -> Self {
        self.control_addr = Some(addr.into());
        self
    }

    /// Set registry lease/sweep timings.
    pub fn registry(mut self, settings: RegistrySettings) -> Self {
        self.registry = Some(settings);
        self
    }

    /// Set the configuration repository location.
    pub fn config_repo(mut self, settings: ConfigRepoSettings) -> Self {
        self.config_repo = Some(settings);
        self
    }

    /// Set upstream forwarding settings.
    pub fn upstream(mut self, settings: UpstreamSettings) -> Self {
        self.upstream = Some(settings);
        self
    }

    /// Add a routing rule.
    pub fn route(mut self, route: RouteDefinition) -> Self {
        self.routes.push(route);
        self
    }

    /// Build the final NodeConfig.
    pub fn build(self) -> NodeConfig {
        let defaults = NodeConfig::default();
        NodeConfig {
            listen_addr: self.listen_addr.unwrap_or(defaults.listen_addr),
            control_addr: self.control_addr.unwrap_or(defaults.control_addr),
            registry: self.registry.unwrap_or_default(),
            config_repo: self.config_repo.unwrap_or_default(),
            upstream: self.upstream.unwrap_or_default(),
            routes: self.routes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = NodeConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.control_addr, "127.0.0.1:8761");
        assert!(config.routes.is_empty());
        assert_eq!(
            config.registry.lease_timeout().unwrap(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn builder_fills_unset_fields_from_defaults() {
        let config = NodeConfig::builder()
            .listen_addr("0.0.0.0:9000")
            .route(RouteDefinition {
                id: "tasks".to_string(),
                order: 0,
                path_prefix: "/api/tasks".to_string(),
                methods: None,
                service: "task-service".to_string(),
                strategy: LoadBalanceStrategy::RoundRobin,
                filters: vec![FilterConfig::StripPrefix { parts: 1 }],
            })
            .build();

        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.control_addr, "127.0.0.1:8761");
        assert_eq!(config.routes.len(), 1);
    }

    #[test]
    fn filter_config_deserializes_from_tagged_form() {
        let filter: FilterConfig =
            serde_json::from_value(serde_json::json!({ "kind": "strip_prefix", "parts": 2 }))
                .unwrap();
        assert!(matches!(filter, FilterConfig::StripPrefix { parts: 2 }));

        let filter: FilterConfig = serde_json::from_value(serde_json::json!({
            "kind": "cors",
            "allow_origins": ["https://app.example.com"],
        }))
        .unwrap();
        assert!(matches!(filter, FilterConfig::Cors { .. }));
    }
}
