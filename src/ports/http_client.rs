use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Errors raised while forwarding a request to an upstream instance.
///
/// These are gateway-level failures, distinct from an application-level
/// error status returned by a healthy instance: a caller seeing one of
/// these knows the upstream never produced a response for this request.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Connecting to or talking to the upstream failed.
    #[error("connection to {url} failed: {reason}")]
    Connection { url: String, reason: String },

    /// The upstream did not answer within the per-request timeout.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// The request could not be turned into a valid upstream call.
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for upstream forwarding operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// HttpClient defines the port (interface) for forwarding requests to
/// upstream service instances.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Forward a fully addressed request to its upstream, bounded by
    /// `timeout`. On timeout the in-flight call is dropped, releasing any
    /// held connection.
    async fn forward(
        &self,
        req: Request<AxumBody>,
        timeout: Duration,
    ) -> UpstreamResult<Response<AxumBody>>;
}
