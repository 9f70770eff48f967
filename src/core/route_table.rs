//! Ordered routing rules for the gateway.
//!
//! Routes are compiled once from the declarative config and the table is
//! immutable afterwards: every request scans it in ascending `order` (route
//! id breaks ties) and the first predicate match wins. A predicate is a path
//! prefix plus an optional method set.
use eyre::{Context, Result};
use http::Method;

use crate::{
    config::models::{LoadBalanceStrategy, RouteDefinition},
    core::filters::FilterSpec,
};

/// A compiled routing rule.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub order: i32,
    pub path_prefix: String,
    pub methods: Option<Vec<Method>>,
    pub service: String,
    pub strategy: LoadBalanceStrategy,
    pub filters: Vec<FilterSpec>,
}

impl Route {
    /// Compile a declarative definition: parse methods, build filters.
    pub fn from_definition(def: &RouteDefinition) -> Result<Self> {
        let methods = def
            .methods
            .as_ref()
            .map(|methods| {
                methods
                    .iter()
                    .map(|m| {
                        m.parse::<Method>()
                            .with_context(|| format!("route '{}': invalid method '{m}'", def.id))
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;

        let filters = def
            .filters
            .iter()
            .map(|f| {
                FilterSpec::from_config(f)
                    .with_context(|| format!("route '{}': invalid filter", def.id))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: def.id.clone(),
            order: def.order,
            path_prefix: def.path_prefix.clone(),
            methods,
            service: def.service.clone(),
            strategy: def.strategy,
            filters,
        })
    }

    /// Whether this route's predicate matches the request.
    pub fn matches(&self, path: &str, method: &Method) -> bool {
        if let Some(methods) = &self.methods
            && !methods.contains(method)
        {
            return false;
        }
        prefix_matches(&self.path_prefix, path)
    }
}

/// Prefix match on segment boundaries: `/api` matches `/api` and
/// `/api/tasks` but not `/apiary`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    let prefix = prefix.strip_suffix('/').unwrap_or(prefix);
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

/// Ordered, immutable sequence of routes.
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the table from already-compiled routes, sorting by (order, id).
    pub fn new(mut routes: Vec<Route>) -> Self {
        routes.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        Self { routes }
    }

    /// Compile and order a table from declarative definitions.
    pub fn from_definitions(definitions: &[RouteDefinition]) -> Result<Self> {
        let routes = definitions
            .iter()
            .map(Route::from_definition)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(routes))
    }

    /// First route (in ascending order) whose predicate matches.
    pub fn match_route(&self, path: &str, method: &Method) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path, method))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
