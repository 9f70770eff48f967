use std::{collections::HashSet, net::SocketAddr, time::Duration};

use regex::Regex;

use crate::config::models::{FilterConfig, NodeConfig, RegistrySettings, RouteDefinition};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Node configuration validator
pub struct NodeConfigValidator;

impl NodeConfigValidator {
    /// Validate the entire node configuration
    pub fn validate(config: &NodeConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        for (field, address) in [
            ("listen_addr", &config.listen_addr),
            ("control_addr", &config.control_addr),
        ] {
            if let Err(e) = Self::validate_listen_address(field, address) {
                errors.push(e);
            }
        }
        if config.listen_addr == config.control_addr {
            errors.push(ValidationError::InvalidField {
                field: "control_addr".to_string(),
                message: "gateway and control plane must not share an address".to_string(),
            });
        }

        if let Err(mut registry_errors) = Self::validate_registry(&config.registry) {
            errors.append(&mut registry_errors);
        }

        if let Err(e) = Self::validate_duration("upstream.timeout", &config.upstream.timeout) {
            errors.push(e);
        }

        let mut seen_ids = HashSet::new();
        for route in &config.routes {
            if !seen_ids.insert(route.id.as_str()) {
                errors.push(ValidationError::RouteConflict {
                    message: format!("duplicate route id '{}'", route.id),
                });
            }
            if let Err(mut route_errors) = Self::validate_route(route) {
                errors.append(&mut route_errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(field: &str, address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: format!("{field}={address}"),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_registry(settings: &RegistrySettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("registry.lease_timeout", &settings.lease_timeout),
            ("registry.heartbeat_interval", &settings.heartbeat_interval),
            ("registry.sweep_interval", &settings.sweep_interval),
        ] {
            if let Err(e) = Self::validate_duration(field, value) {
                errors.push(e);
            }
        }

        if let (Ok(lease), Ok(heartbeat)) =
            (settings.lease_timeout(), settings.heartbeat_interval())
        {
            if lease <= heartbeat {
                errors.push(ValidationError::InvalidField {
                    field: "registry.lease_timeout".to_string(),
                    message: format!(
                        "lease timeout ({}) must exceed the heartbeat interval ({})",
                        settings.lease_timeout, settings.heartbeat_interval
                    ),
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_duration(field: &str, value: &str) -> ValidationResult<()> {
        match humantime::parse_duration(value) {
            Ok(duration) if duration > Duration::ZERO => Ok(()),
            Ok(_) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "duration must be positive".to_string(),
            }),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("not a valid duration (e.g. '30s', '2m'): {e}"),
            }),
        }
    }

    /// Validate a single routing rule
    fn validate_route(route: &RouteDefinition) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let field = |name: &str| format!("routes[{}].{name}", route.id);

        if route.id.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes[].id".to_string(),
            });
        }
        if route.service.is_empty() {
            errors.push(ValidationError::MissingField {
                field: field("service"),
            });
        }
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: field("path_prefix"),
                message: "Route path prefixes must start with '/'".to_string(),
            });
        }

        if let Some(methods) = &route.methods {
            for method in methods {
                if method.parse::<http::Method>().is_err() {
                    errors.push(ValidationError::InvalidField {
                        field: field("methods"),
                        message: format!("'{method}' is not an HTTP method"),
                    });
                }
            }
        }

        for filter in &route.filters {
            match filter {
                FilterConfig::RewritePath { pattern, .. } => {
                    if let Err(e) = Regex::new(pattern) {
                        errors.push(ValidationError::InvalidField {
                            field: field("filters.rewrite_path.pattern"),
                            message: format!("invalid regex: {e}"),
                        });
                    }
                }
                FilterConfig::StripPrefix { parts } => {
                    if *parts == 0 {
                        errors.push(ValidationError::InvalidField {
                            field: field("filters.strip_prefix.parts"),
                            message: "must strip at least one segment".to_string(),
                        });
                    }
                }
                FilterConfig::AddRequestHeader { name, .. }
                | FilterConfig::RemoveRequestHeader { name }
                | FilterConfig::AddResponseHeader { name, .. } => {
                    if name.parse::<http::HeaderName>().is_err() {
                        errors.push(ValidationError::InvalidField {
                            field: field("filters.header.name"),
                            message: format!("'{name}' is not a valid header name"),
                        });
                    }
                }
                FilterConfig::Cors { allow_origins, .. } => {
                    if allow_origins.is_empty() {
                        errors.push(ValidationError::InvalidField {
                            field: field("filters.cors.allow_origins"),
                            message: "at least one origin (or '*') is required".to_string(),
                        });
                    }
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        let error_messages: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
        format!(
            "Found {} validation error(s):\n{}",
            errors.len(),
            error_messages.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::LoadBalanceStrategy;

    fn route(id: &str, prefix: &str) -> RouteDefinition {
        RouteDefinition {
            id: id.to_string(),
            order: 0,
            path_prefix: prefix.to_string(),
            methods: None,
            service: "task-service".to_string(),
            strategy: LoadBalanceStrategy::RoundRobin,
            filters: Vec::new(),
        }
    }

    #[test]
    fn default_config_validates() {
        assert!(NodeConfigValidator::validate(&NodeConfig::default()).is_ok());
    }

    #[test]
    fn rejects_bad_listen_address() {
        let config = NodeConfig::builder().listen_addr("not-an-address").build();
        assert!(NodeConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn rejects_shared_addresses() {
        let config = NodeConfig::builder()
            .listen_addr("127.0.0.1:8080")
            .control_addr("127.0.0.1:8080")
            .build();
        assert!(NodeConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn rejects_duplicate_route_ids() {
        let config = NodeConfig::builder()
            .route(route("tasks", "/api/tasks"))
            .route(route("tasks", "/api/other"))
            .build();
        let err = NodeConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate route id"));
    }

    #[test]
    fn rejects_prefix_without_leading_slash() {
        let config = NodeConfig::builder().route(route("tasks", "api/tasks")).build();
        assert!(NodeConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn rejects_lease_not_exceeding_heartbeat() {
        let config = NodeConfig::builder()
            .registry(RegistrySettings {
                lease_timeout: "5s".to_string(),
                heartbeat_interval: "10s".to_string(),
                sweep_interval: "5s".to_string(),
            })
            .build();
        assert!(NodeConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn rejects_invalid_rewrite_regex() {
        let mut bad = route("tasks", "/api/tasks");
        bad.filters.push(FilterConfig::RewritePath {
            pattern: "(unclosed".to_string(),
            replacement: "/x".to_string(),
        });
        let config = NodeConfig::builder().route(bad).build();
        assert!(NodeConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn rejects_unknown_method() {
        let mut bad = route("tasks", "/api/tasks");
        bad.methods = Some(vec!["FETCH?".to_string()]);
        let config = NodeConfig::builder().route(bad).build();
        assert!(NodeConfigValidator::validate(&config).is_err());
    }
}
