//! Config server HTTP surface (control plane).
//!
//! Downstream services call this at startup to fetch their merged
//! configuration document for an (application, profile[, label]) triple.
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{core::config_resolver::ConfigResolver, ports::config_source::ConfigError};

/// Build the config API router.
pub fn router(resolver: Arc<ConfigResolver>) -> Router {
    Router::new()
        .route("/config/{application}/{profile}", get(resolve_default))
        .route(
            "/config/{application}/{profile}/{label}",
            get(resolve_labeled),
        )
        .with_state(resolver)
}

async fn resolve_default(
    State(resolver): State<Arc<ConfigResolver>>,
    Path((application, profile)): Path<(String, String)>,
) -> Response {
    resolve(&resolver, &application, &profile, None).await
}

async fn resolve_labeled(
    State(resolver): State<Arc<ConfigResolver>>,
    Path((application, profile, label)): Path<(String, String, String)>,
) -> Response {
    resolve(&resolver, &application, &profile, Some(&label)).await
}

async fn resolve(
    resolver: &ConfigResolver,
    application: &str,
    profile: &str,
    label: Option<&str>,
) -> Response {
    match resolver.resolve(application, profile, label).await {
        Ok(document) => (StatusCode::OK, Json(document)).into_response(),
        Err(e @ (ConfigError::NotFound { .. } | ConfigError::UnknownLabel(_))) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "not_found",
                "message": e.to_string(),
            })),
        )
            .into_response(),
        Err(e @ ConfigError::Repository(_)) => {
            tracing::error!("config resolution failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "repository_error",
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use super::*;
    use crate::adapters::file_config_source::FileConfigSource;

    async fn test_router() -> (Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("application.yml"), "a: 1\nb: 1\n").unwrap();
        std::fs::write(dir.path().join("application-dev.yml"), "b: 2\n").unwrap();
        std::fs::write(dir.path().join("svc.yml"), "c: 3\n").unwrap();
        std::fs::write(dir.path().join("svc-dev.yml"), "c: 4\n").unwrap();

        let source = Arc::new(FileConfigSource::new(dir.path(), "main").unwrap());
        let resolver = Arc::new(ConfigResolver::new(source, "main"));
        (router(resolver), dir)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn serves_merged_document_with_precedence() {
        let (app, _dir) = test_router().await;
        let (status, body) = get_json(app, "/config/svc/dev").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["properties"]["a"], "1");
        assert_eq!(body["properties"]["b"], "2");
        assert_eq!(body["properties"]["c"], "4");
        assert_eq!(body["label"], "main");
    }

    #[tokio::test]
    async fn unknown_application_still_receives_shared_defaults() {
        let (app, _dir) = test_router().await;
        let (status, body) = get_json(app, "/config/ghost/dev").await;

        // The shared application layers apply to every application, so an
        // unknown one resolves to just those defaults.
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["properties"]["a"], "1");
        assert_eq!(body["properties"]["b"], "2");
        assert!(body["properties"].get("c").is_none());
        assert_eq!(
            body["layers"],
            serde_json::json!(["application", "application-dev"])
        );
    }

    #[tokio::test]
    async fn unknown_application_without_shared_layers_is_404() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("svc.yml"), "c: 3\n").unwrap();

        let source = Arc::new(FileConfigSource::new(dir.path(), "main").unwrap());
        let resolver = Arc::new(ConfigResolver::new(source, "main"));
        let (status, body) = get_json(router(resolver), "/config/ghost/dev").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn unknown_label_is_404() {
        let (app, _dir) = test_router().await;
        let (status, _) = get_json(app, "/config/svc/dev/no-such-label").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
