//! Gateway filter chain.
//!
//! Filters are a closed set of request/response transformations declared per
//! route and applied in declared order: request filters run before instance
//! selection is acted on (and may short-circuit with a response, in which
//! case no upstream is ever contacted), response filters run on the way back
//! to the caller.
use axum::body::Body as AxumBody;
use eyre::{Context, Result, eyre};
use http::{HeaderName, HeaderValue, Method, StatusCode, header};
use hyper::{Request, Response};
use regex::Regex;

use crate::config::models::FilterConfig;

/// A compiled filter. One variant per supported kind; the chain is
/// interpreted, not dynamically dispatched.
#[derive(Debug, Clone)]
pub enum FilterSpec {
    StripPrefix {
        parts: usize,
    },
    RewritePath {
        pattern: Regex,
        replacement: String,
    },
    AddRequestHeader {
        name: HeaderName,
        value: HeaderValue,
    },
    RemoveRequestHeader {
        name: HeaderName,
    },
    AddResponseHeader {
        name: HeaderName,
        value: HeaderValue,
    },
    Cors {
        allow_origins: Vec<String>,
        allow_methods: Vec<String>,
    },
}

impl FilterSpec {
    /// Compile a declarative filter definition.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        match config {
            FilterConfig::StripPrefix { parts } => {
                if *parts == 0 {
                    return Err(eyre!("strip_prefix requires parts >= 1"));
                }
                Ok(FilterSpec::StripPrefix { parts: *parts })
            }
            FilterConfig::RewritePath {
                pattern,
                replacement,
            } => Ok(FilterSpec::RewritePath {
                pattern: Regex::new(pattern)
                    .with_context(|| format!("invalid rewrite pattern '{pattern}'"))?,
                replacement: replacement.clone(),
            }),
            FilterConfig::AddRequestHeader { name, value } => Ok(FilterSpec::AddRequestHeader {
                name: parse_header_name(name)?,
                value: parse_header_value(value)?,
            }),
            FilterConfig::RemoveRequestHeader { name } => Ok(FilterSpec::RemoveRequestHeader {
                name: parse_header_name(name)?,
            }),
            FilterConfig::AddResponseHeader { name, value } => Ok(FilterSpec::AddResponseHeader {
                name: parse_header_name(name)?,
                value: parse_header_value(value)?,
            }),
            FilterConfig::Cors {
                allow_origins,
                allow_methods,
            } => Ok(FilterSpec::Cors {
                allow_origins: allow_origins.clone(),
                allow_methods: allow_methods.clone(),
            }),
        }
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName> {
    name.parse::<HeaderName>()
        .with_context(|| format!("invalid header name '{name}'"))
}

fn parse_header_value(value: &str) -> Result<HeaderValue> {
    value
        .parse::<HeaderValue>()
        .with_context(|| format!("invalid header value '{value}'"))
}

/// Run the request-side of the chain in declared order.
///
/// Returns `Some(response)` when a filter short-circuits; the caller must
/// relay that response without contacting any upstream.
pub fn apply_request_filters(
    filters: &[FilterSpec],
    req: &mut Request<AxumBody>,
) -> Option<Response<AxumBody>> {
    for filter in filters {
        match filter {
            FilterSpec::StripPrefix { parts } => {
                let stripped = strip_prefix_segments(req.uri().path(), *parts);
                set_request_path(req, &stripped);
            }
            FilterSpec::RewritePath {
                pattern,
                replacement,
            } => {
                let rewritten = pattern
                    .replace_all(req.uri().path(), replacement.as_str())
                    .into_owned();
                set_request_path(req, &rewritten);
            }
            FilterSpec::AddRequestHeader { name, value } => {
                req.headers_mut().insert(name.clone(), value.clone());
            }
            FilterSpec::RemoveRequestHeader { name } => {
                req.headers_mut().remove(name);
            }
            FilterSpec::Cors {
                allow_origins,
                allow_methods,
            } => {
                if let Some(response) = enforce_cors(req, allow_origins, allow_methods) {
                    return Some(response);
                }
            }
            FilterSpec::AddResponseHeader { .. } => {}
        }
    }
    None
}

/// Run the response-side of the chain in declared order. `request_origin`
/// is the Origin header observed on the inbound request, used to stamp CORS
/// allow headers.
pub fn apply_response_filters(
    filters: &[FilterSpec],
    resp: &mut Response<AxumBody>,
    request_origin: Option<&str>,
) {
    for filter in filters {
        match filter {
            FilterSpec::AddResponseHeader { name, value } => {
                resp.headers_mut().insert(name.clone(), value.clone());
            }
            FilterSpec::Cors { allow_origins, .. } => {
                if let Some(value) = allowed_origin_value(allow_origins, request_origin) {
                    resp.headers_mut()
                        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
                }
            }
            _ => {}
        }
    }
}

/// CORS enforcement: reject disallowed origins outright and answer
/// preflights locally. Requests without an Origin header pass through.
fn enforce_cors(
    req: &Request<AxumBody>,
    allow_origins: &[String],
    allow_methods: &[String],
) -> Option<Response<AxumBody>> {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())?
        .to_string();

    let allowed = allowed_origin_value(allow_origins, Some(&origin));
    let Some(allow_value) = allowed else {
        tracing::debug!(%origin, "rejecting request from disallowed origin");
        return Some(text_response(StatusCode::FORBIDDEN, "origin not allowed"));
    };

    if req.method() == Method::OPTIONS {
        let methods = if allow_methods.is_empty() {
            "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string()
        } else {
            allow_methods.join(", ")
        };
        let mut response = Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_value);
        if let Ok(value) = methods.parse::<HeaderValue>() {
            response = response.header(header::ACCESS_CONTROL_ALLOW_METHODS, value);
        }
        return Some(
            response
                .body(AxumBody::empty())
                .unwrap_or_else(|_| Response::new(AxumBody::empty())),
        );
    }

    None
}

fn allowed_origin_value(allow_origins: &[String], origin: Option<&str>) -> Option<HeaderValue> {
    if allow_origins.iter().any(|o| o == "*") {
        return Some(HeaderValue::from_static("*"));
    }
    let origin = origin?;
    if allow_origins.iter().any(|o| o == origin) {
        origin.parse().ok()
    } else {
        None
    }
}

/// Drop the first `parts` path segments: `/api/tasks/1` with one part
/// stripped becomes `/tasks/1`. Stripping everything yields `/`.
fn strip_prefix_segments(path: &str, parts: usize) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts >= segments.len() {
        return "/".to_string();
    }
    format!("/{}", segments[parts..].join("/"))
}

/// Replace the request path, preserving any query string.
fn set_request_path(req: &mut Request<AxumBody>, new_path: &str) {
    let query = req
        .uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    match format!("{new_path}{query}").parse() {
        Ok(uri) => *req.uri_mut() = uri,
        Err(e) => tracing::warn!(new_path, error = %e, "filter produced an unparsable path"),
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<AxumBody> {
    Response::builder()
        .status(status)
        .body(AxumBody::from(body))
        .unwrap_or_else(|_| Response::new(AxumBody::from(body)))
}
