use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use http::header::HeaderValue;
use hyper::{Request, Response, Version, header};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tokio::time::timeout;

use crate::ports::http_client::{HttpClient, UpstreamError, UpstreamResult};

/// Upstream HTTP client adapter using Hyper (HTTP/1.1, plaintext).
///
/// Responsibilities:
/// * Sets the Host header from the target authority
/// * Bounds the whole exchange with the caller-supplied timeout; dropping
///   the in-flight future on timeout releases the pooled connection
/// * Converts between Hyper and Axum body types
///
/// Registered instances advertise plain `host:port` addresses, so no TLS
/// stack is carried here.
pub struct UpstreamClient {
    client: Client<HttpConnector, AxumBody>,
}

impl UpstreamClient {
    /// Create a new upstream client with a shared connection pool.
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(connector);
        Self { client }
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for UpstreamClient {
    async fn forward(
        &self,
        mut req: Request<AxumBody>,
        deadline: Duration,
    ) -> UpstreamResult<Response<AxumBody>> {
        let url = req.uri().to_string();

        let host_value = match req.uri().authority() {
            Some(authority) => HeaderValue::from_str(authority.as_str())
                .map_err(|e| UpstreamError::InvalidRequest(format!("bad authority: {e}")))?,
            None => {
                return Err(UpstreamError::InvalidRequest(format!(
                    "outgoing URI has no authority: {url}"
                )));
            }
        };
        req.headers_mut().insert(header::HOST, host_value);

        let method = req.method().to_string();
        let span = tracing::info_span!(
            "upstream_request",
            upstream.url = %url,
            http.method = %method,
            http.status_code = tracing::field::Empty,
        );
        let _enter = span.enter();

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let outgoing = Request::from_parts(parts, body);

        match timeout(deadline, self.client.request(outgoing)).await {
            Ok(Ok(response)) => {
                tracing::Span::current().record("http.status_code", response.status().as_u16());

                let (mut parts, hyper_body) = response.into_parts();
                // The body is re-framed on the way back to the caller.
                parts.headers.remove(header::TRANSFER_ENCODING);
                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, %url, "upstream request failed");
                Err(UpstreamError::Connection {
                    url,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(%url, ?deadline, "upstream request timed out");
                Err(UpstreamError::Timeout {
                    url,
                    timeout: deadline,
                })
            }
        }
    }
}
