//! Gateway request handler (data plane).
//!
//! Drives one request through the routing state machine: match the route
//! table, run request filters (which may short-circuit), resolve a live
//! instance via the registry, forward, run response filters, relay. Each
//! terminal failure maps to a distinct caller-visible response carrying an
//! `x-meridian-error` header, so clients can tell "the gateway failed this
//! request" apart from "the service answered with an error".
//!
//! The handler holds no per-request state between calls; if the caller
//! disconnects, axum drops the in-flight future and the upstream call is
//! aborted with it.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::ConnectInfo,
    http::{HeaderName, HeaderValue, StatusCode, header},
    routing::any,
};
use hyper::{Request, Response};

use crate::{
    core::{
        filters::{apply_request_filters, apply_response_filters},
        gateway::{GatewayError, GatewayService},
    },
    ports::http_client::{HttpClient, UpstreamError},
};

/// Header distinguishing gateway-level failures from upstream responses.
pub const GATEWAY_ERROR_HEADER: &str = "x-meridian-error";

const HOP_BY_HOP_HEADERS: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

/// HTTP handler for the gateway listener.
pub struct GatewayHandler {
    gateway: Arc<GatewayService>,
    http_client: Arc<dyn HttpClient>,
    upstream_timeout: Duration,
}

impl GatewayHandler {
    pub fn new(
        gateway: Arc<GatewayService>,
        http_client: Arc<dyn HttpClient>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            http_client,
            upstream_timeout,
        }
    }

    /// Route and forward one request.
    pub async fn handle(
        &self,
        mut req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        tracing::debug!(%method, %path, "handling gateway request");

        let route = match self.gateway.match_route(&path, &method) {
            Ok(route) => route,
            Err(e @ GatewayError::RouteNotFound { .. }) => {
                tracing::debug!(%method, %path, "no matching route");
                return error_response(StatusCode::NOT_FOUND, "route_not_found", &e.to_string());
            }
            Err(e) => {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    &e.to_string(),
                );
            }
        };

        let request_origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Request filters may rewrite the path/headers or answer locally
        // without ever contacting an upstream.
        if let Some(mut response) = apply_request_filters(&route.filters, &mut req) {
            tracing::debug!(route = %route.id, "request short-circuited by filter");
            apply_response_filters(&route.filters, &mut response, request_origin.as_deref());
            return response;
        }

        let instance = match self.gateway.select_instance(route).await {
            Ok(instance) => instance,
            Err(e @ GatewayError::Unavailable { .. }) => {
                tracing::warn!(service = %route.service, "no instances available");
                return error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    &e.to_string(),
                );
            }
            Err(e) => {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    &e.to_string(),
                );
            }
        };

        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let upstream_uri = format!("{}{}", instance.address(), path_and_query);
        match upstream_uri.parse() {
            Ok(uri) => *req.uri_mut() = uri,
            Err(e) => {
                tracing::error!(%upstream_uri, error = %e, "failed to build upstream URI");
                return error_response(
                    StatusCode::BAD_GATEWAY,
                    "upstream_address_invalid",
                    "selected instance has an unusable address",
                );
            }
        }

        prepare_forwarded_headers(&mut req, client_addr);

        tracing::debug!(
            route = %route.id,
            service = %route.service,
            instance = %instance.instance_id,
            uri = %req.uri(),
            "forwarding request"
        );

        match self.http_client.forward(req, self.upstream_timeout).await {
            Ok(mut response) => {
                // Application-level errors from the instance are relayed
                // as-is; only gateway-level failures get the error header.
                apply_response_filters(&route.filters, &mut response, request_origin.as_deref());
                response
            }
            Err(e @ UpstreamError::Timeout { .. }) => {
                tracing::warn!(service = %route.service, instance = %instance.instance_id, "{e}");
                error_response(StatusCode::GATEWAY_TIMEOUT, "upstream_timeout", &e.to_string())
            }
            Err(e) => {
                tracing::warn!(service = %route.service, instance = %instance.instance_id, "{e}");
                error_response(StatusCode::BAD_GATEWAY, "upstream_connect_error", &e.to_string())
            }
        }
    }
}

/// Strip hop-by-hop headers and stamp the x-forwarded-* set.
fn prepare_forwarded_headers(req: &mut Request<AxumBody>, client_addr: Option<SocketAddr>) {
    let forwarded_host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let headers = req.headers_mut();
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }

    if let Some(addr) = client_addr
        && let Ok(value) = HeaderValue::from_str(&addr.ip().to_string())
    {
        headers.insert(HeaderName::from_static("x-forwarded-for"), value);
    }
    headers.insert(
        HeaderName::from_static("x-forwarded-proto"),
        HeaderValue::from_static("http"),
    );
    if let Some(host) = forwarded_host
        && let Ok(value) = HeaderValue::from_str(&host)
    {
        headers.insert(HeaderName::from_static("x-forwarded-host"), value);
    }
}

fn error_response(status: StatusCode, code: &'static str, message: &str) -> Response<AxumBody> {
    let body = serde_json::json!({ "error": code, "message": message }).to_string();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(GATEWAY_ERROR_HEADER, code)
        .body(AxumBody::from(body))
        .unwrap_or_else(|_| Response::new(AxumBody::empty()))
}

/// Build the gateway listener router: every method and path funnels into
/// the handler.
pub fn router(handler: Arc<GatewayHandler>) -> Router {
    let make_route = |handler: Arc<GatewayHandler>| {
        any(
            move |ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
                  req: Request<AxumBody>| {
                let handler = handler.clone();
                async move { handler.handle(req, Some(client_addr)).await }
            },
        )
    };

    Router::new()
        .route("/{*path}", make_route(handler.clone()))
        .route("/", make_route(handler))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use http::Method;
    use tokio::sync::Mutex;

    use super::*;
    use crate::{
        config::models::{FilterConfig, LoadBalanceStrategy, RouteDefinition},
        core::{
            registry::ServiceRegistry,
            route_table::RouteTable,
        },
        ports::http_client::UpstreamResult,
    };

    /// Mock upstream client: records forwarded URIs and replies 200.
    struct RecordingClient {
        calls: AtomicUsize,
        uris: Mutex<Vec<String>>,
        failure: Option<fn(String) -> UpstreamError>,
    }

    impl RecordingClient {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                uris: Mutex::new(Vec::new()),
                failure: None,
            }
        }

        fn failing(failure: fn(String) -> UpstreamError) -> Self {
            Self {
                failure: Some(failure),
                ..Self::ok()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn forward(
            &self,
            req: Request<AxumBody>,
            _timeout: Duration,
        ) -> UpstreamResult<Response<AxumBody>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let uri = req.uri().to_string();
            self.uris.lock().await.push(uri.clone());
            if let Some(failure) = self.failure {
                return Err(failure(uri));
            }
            Ok(Response::new(AxumBody::from("upstream ok")))
        }
    }

    fn route_definition(filters: Vec<FilterConfig>) -> RouteDefinition {
        RouteDefinition {
            id: "tasks".to_string(),
            order: 0,
            path_prefix: "/api/tasks".to_string(),
            methods: None,
            service: "task-service".to_string(),
            strategy: LoadBalanceStrategy::RoundRobin,
            filters,
        }
    }

    async fn handler_with(
        client: Arc<RecordingClient>,
        filters: Vec<FilterConfig>,
        instances: &[(&str, u16)],
    ) -> GatewayHandler {
        let registry = Arc::new(ServiceRegistry::new(Duration::from_secs(30)));
        for (id, port) in instances {
            registry.register("task-service", id, "host1", *port).await;
        }
        let table = RouteTable::from_definitions(&[route_definition(filters)]).unwrap();
        let gateway = Arc::new(GatewayService::new(registry, table));
        GatewayHandler::new(gateway, client, Duration::from_secs(5))
    }

    fn get(path: &str) -> Request<AxumBody> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(AxumBody::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_path_is_route_not_found() {
        let client = Arc::new(RecordingClient::ok());
        let handler = handler_with(client.clone(), vec![], &[("a", 9001)]).await;

        let response = handler.handle(get("/nope"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(GATEWAY_ERROR_HEADER).unwrap(),
            "route_not_found"
        );
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn unavailable_service_makes_no_upstream_call() {
        let client = Arc::new(RecordingClient::ok());
        let handler = handler_with(client.clone(), vec![], &[]).await;

        let response = handler.handle(get("/api/tasks/1"), None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(GATEWAY_ERROR_HEADER).unwrap(),
            "service_unavailable"
        );
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn strip_prefix_rewrites_forwarded_path() {
        let client = Arc::new(RecordingClient::ok());
        let handler = handler_with(
            client.clone(),
            vec![FilterConfig::StripPrefix { parts: 1 }],
            &[("a", 9001)],
        )
        .await;

        let response = handler.handle(get("/api/tasks/1"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            client.uris.lock().await.as_slice(),
            ["http://host1:9001/tasks/1"]
        );
    }

    #[tokio::test]
    async fn round_robin_alternates_between_instances() {
        let client = Arc::new(RecordingClient::ok());
        let handler = handler_with(
            client.clone(),
            vec![FilterConfig::StripPrefix { parts: 1 }],
            &[("a", 9001), ("b", 9002)],
        )
        .await;

        for _ in 0..4 {
            handler.handle(get("/api/tasks/1"), None).await;
        }
        assert_eq!(
            client.uris.lock().await.as_slice(),
            [
                "http://host1:9001/tasks/1",
                "http://host1:9002/tasks/1",
                "http://host1:9001/tasks/1",
                "http://host1:9002/tasks/1",
            ]
        );
    }

    #[tokio::test]
    async fn rejecting_filter_short_circuits_before_any_upstream_call() {
        let client = Arc::new(RecordingClient::ok());
        let handler = handler_with(
            client.clone(),
            vec![FilterConfig::Cors {
                allow_origins: vec!["https://app.example.com".to_string()],
                allow_methods: vec![],
            }],
            &[("a", 9001)],
        )
        .await;

        let mut req = get("/api/tasks/1");
        req.headers_mut()
            .insert(header::ORIGIN, "https://evil.example.com".parse().unwrap());

        let response = handler.handle(req, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn upstream_timeout_maps_to_gateway_timeout() {
        let client = Arc::new(RecordingClient::failing(|url| UpstreamError::Timeout {
            url,
            timeout: Duration::from_secs(5),
        }));
        let handler = handler_with(client.clone(), vec![], &[("a", 9001)]).await;

        let response = handler.handle(get("/api/tasks/1"), None).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            response.headers().get(GATEWAY_ERROR_HEADER).unwrap(),
            "upstream_timeout"
        );
    }

    #[tokio::test]
    async fn upstream_connection_failure_maps_to_bad_gateway() {
        let client = Arc::new(RecordingClient::failing(|url| UpstreamError::Connection {
            url,
            reason: "refused".to_string(),
        }));
        let handler = handler_with(client.clone(), vec![], &[("a", 9001)]).await;

        let response = handler.handle(get("/api/tasks/1"), None).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get(GATEWAY_ERROR_HEADER).unwrap(),
            "upstream_connect_error"
        );
    }

    #[tokio::test]
    async fn upstream_application_errors_are_relayed_without_gateway_marker() {
        struct AppErrorClient;
        #[async_trait]
        impl HttpClient for AppErrorClient {
            async fn forward(
                &self,
                _req: Request<AxumBody>,
                _timeout: Duration,
            ) -> UpstreamResult<Response<AxumBody>> {
                Ok(Response::builder()
                    .status(StatusCode::UNPROCESSABLE_ENTITY)
                    .body(AxumBody::from("validation failed"))
                    .unwrap())
            }
        }

        let registry = Arc::new(ServiceRegistry::new(Duration::from_secs(30)));
        registry.register("task-service", "a", "host1", 9001).await;
        let table = RouteTable::from_definitions(&[route_definition(vec![])]).unwrap();
        let gateway = Arc::new(GatewayService::new(registry, table));
        let handler =
            GatewayHandler::new(gateway, Arc::new(AppErrorClient), Duration::from_secs(5));

        let response = handler.handle(get("/api/tasks/1"), None).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!response.headers().contains_key(GATEWAY_ERROR_HEADER));
    }

    #[tokio::test]
    async fn response_filters_run_on_relayed_responses() {
        let client = Arc::new(RecordingClient::ok());
        let handler = handler_with(
            client,
            vec![FilterConfig::AddResponseHeader {
                name: "x-served-by".to_string(),
                value: "meridian".to_string(),
            }],
            &[("a", 9001)],
        )
        .await;

        let response = handler.handle(get("/api/tasks/1"), None).await;
        assert_eq!(response.headers().get("x-served-by").unwrap(), "meridian");
    }
}
