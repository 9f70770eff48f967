//! Registry HTTP surface (control plane).
//!
//! Consumed by downstream services: register on startup, heartbeat on a
//! fixed cadence, deregister on shutdown. Lookups are served to anything
//! that wants the current Up set (the gateway uses the in-process handle
//! instead of this API).
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use crate::core::registry::{RegistryError, ServiceInstance, ServiceRegistry};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub host: String,
    pub port: u16,
}

/// Wire view of a registered instance.
#[derive(Debug, Serialize)]
pub struct InstanceView {
    pub service: String,
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub status: String,
}

impl InstanceView {
    fn from_instance(instance: &ServiceInstance, lease: std::time::Duration) -> Self {
        Self {
            service: instance.service_name.clone(),
            instance_id: instance.instance_id.clone(),
            host: instance.host.clone(),
            port: instance.port,
            status: instance.effective_status(lease).to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceView {
    pub service: String,
    pub instances: Vec<InstanceView>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Build the registry API router.
pub fn router(registry: Arc<ServiceRegistry>) -> Router {
    Router::new()
        .route("/registry/services", get(list_services))
        .route("/registry/services/{service}", get(lookup_service))
        .route(
            "/registry/services/{service}/instances",
            post(register_generated),
        )
        .route(
            "/registry/services/{service}/instances/{instance_id}",
            put(register).delete(deregister),
        )
        .route(
            "/registry/services/{service}/instances/{instance_id}/heartbeat",
            post(heartbeat),
        )
        .with_state(registry)
}

async fn register(
    State(registry): State<Arc<ServiceRegistry>>,
    Path((service, instance_id)): Path<(String, String)>,
    Json(body): Json<RegisterRequest>,
) -> Response {
    registry
        .register(&service, &instance_id, &body.host, body.port)
        .await;
    instance_response(&service, &instance_id, &body)
}

/// Registration variant that assigns the instance id server-side; useful
/// for services that have no stable identity of their own.
async fn register_generated(
    State(registry): State<Arc<ServiceRegistry>>,
    Path(service): Path<String>,
    Json(body): Json<RegisterRequest>,
) -> Response {
    let instance_id = uuid::Uuid::new_v4().to_string();
    registry
        .register(&service, &instance_id, &body.host, body.port)
        .await;
    instance_response(&service, &instance_id, &body)
}

fn instance_response(service: &str, instance_id: &str, body: &RegisterRequest) -> Response {
    let view = InstanceView {
        service: service.to_string(),
        instance_id: instance_id.to_string(),
        host: body.host.clone(),
        port: body.port,
        status: crate::core::registry::InstanceStatus::Up.to_string(),
    };
    (StatusCode::OK, Json(view)).into_response()
}

async fn heartbeat(
    State(registry): State<Arc<ServiceRegistry>>,
    Path((service, instance_id)): Path<(String, String)>,
) -> Response {
    match registry.heartbeat(&service, &instance_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e @ RegistryError::InstanceNotFound { .. }) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "not_found",
                "message": e.to_string(),
            })),
        )
            .into_response(),
    }
}

async fn deregister(
    State(registry): State<Arc<ServiceRegistry>>,
    Path((service, instance_id)): Path<(String, String)>,
) -> StatusCode {
    registry.deregister(&service, &instance_id).await;
    StatusCode::NO_CONTENT
}

async fn lookup_service(
    State(registry): State<Arc<ServiceRegistry>>,
    Path(service): Path<String>,
) -> Json<ServiceView> {
    let lease = registry.lease_timeout();
    let instances = registry
        .lookup(&service)
        .await
        .iter()
        .map(|i| InstanceView::from_instance(i, lease))
        .collect();
    Json(ServiceView {
        service,
        instances,
        timestamp: chrono::Utc::now(),
    })
}

async fn list_services(State(registry): State<Arc<ServiceRegistry>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "services": registry.service_names().await,
        "timestamp": chrono::Utc::now(),
    }))
}
