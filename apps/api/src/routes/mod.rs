pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::admin::handlers as admin;
use crate::conversion::MAX_DOCUMENT_BYTES;
use crate::requests::handlers as requests;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Request API
        .route("/api/v1/requests", post(requests::handle_create_request))
        .route(
            "/api/v1/requests/active",
            get(requests::handle_get_active_request),
        )
        .route(
            "/api/v1/requests/:id",
            get(requests::handle_get_request).delete(requests::handle_cancel_request),
        )
        .route(
            "/api/v1/requests/:id/analysis",
            get(requests::handle_get_analysis),
        )
        .route(
            "/api/v1/requests/:id/documents",
            post(requests::handle_upload_document),
        )
        .route(
            "/api/v1/requests/:id/documents/text",
            post(requests::handle_add_text_document),
        )
        .route(
            "/api/v1/requests/:id/documents/fetch",
            post(requests::handle_fetch_document),
        )
        // Admin API
        .route("/api/v1/admin/login", post(admin::handle_login))
        .route("/api/v1/admin/logout", post(admin::handle_logout))
        .route("/api/v1/admin/status", get(admin::handle_status))
        .route("/api/v1/admin/cleanup", post(admin::handle_cleanup))
        // Room for the multipart envelope around a maximum-size upload
        .layer(DefaultBodyLimit::max(MAX_DOCUMENT_BYTES + 64 * 1024))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::admin::{AdminAuth, AuthSettings};
    use crate::analysis::AnalysisOrchestrator;
    use crate::config::{Config, Environment};
    use crate::conversion::{ConversionCapability, DocumentPipeline};
    use crate::requests::RequestManager;
    use crate::storage::{MemoryKv, Storage};
    use crate::test_support::ScriptedInference;

    fn test_state(config: Config) -> AppState {
        let kv = Arc::new(MemoryKv::new());
        let storage = Storage::new(kv.clone(), None);
        let pipeline = Arc::new(DocumentPipeline::new(
            storage.clone(),
            ConversionCapability::Unavailable,
        ));
        let inference = Arc::new(ScriptedInference::with_scores([80, 60, 70, 90]));
        let orchestrator = Arc::new(AnalysisOrchestrator::new(inference));
        AppState {
            manager: RequestManager::new(storage, pipeline, orchestrator),
            auth: Arc::new(AdminAuth::new(kv, AuthSettings::from_config(&config))),
            file_fetcher: None,
            config,
        }
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state(Config::for_tests()));
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "jobmatch-api");
    }

    #[tokio::test]
    async fn test_full_request_flow_over_http() {
        let app = build_router(test_state(Config::for_tests()));

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/v1/requests",
            Some(json!({"owner_id": "u1", "chat_id": "c1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["status"], "collecting");
        let id = created["id"].as_str().unwrap().to_string();

        let (status, active) =
            send(&app, Method::GET, "/api/v1/requests/active?owner_id=u1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(active["id"], id.as_str());

        let (status, _) = send(&app, Method::GET, &format!("/api/v1/requests/{id}/analysis"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, doc) = send(
            &app,
            Method::POST,
            &format!("/api/v1/requests/{id}/documents/text"),
            Some(json!({"type": "resume", "text": "Senior Rust engineer, 7 years"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["type"], "resume");
        assert_eq!(doc["conversion_method"], "plain-text");

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/v1/requests/{id}/documents/text"),
            Some(json!({"type": "job_post", "text": "Hiring a Rust engineer, 5+ years"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let mut analysis = Value::Null;
        for _ in 0..200 {
            let (status, body) =
                send(&app, Method::GET, &format!("/api/v1/requests/{id}/analysis"), None).await;
            if status == StatusCode::OK {
                analysis = body;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(analysis["overall_score"], 75);

        let (status, _) =
            send(&app, Method::GET, "/api/v1/requests/active?owner_id=u1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_duplicate_document_is_rejected() {
        let app = build_router(test_state(Config::for_tests()));
        let (_, created) = send(
            &app,
            Method::POST,
            "/api/v1/requests",
            Some(json!({"owner_id": "u1", "chat_id": "c1"})),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/requests/{id}/documents/text");
        let body = json!({"type": "resume", "text": "Some resume"});

        send(&app, Method::POST, &uri, Some(body.clone())).await;
        let (status, error) = send(&app, Method::POST, &uri, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_cancel_then_get_is_not_found() {
        let app = build_router(test_state(Config::for_tests()));
        let (_, created) = send(
            &app,
            Method::POST,
            "/api/v1/requests",
            Some(json!({"owner_id": "u1", "chat_id": "c1"})),
        )
        .await;
        let uri = format!("/api/v1/requests/{}", created["id"].as_str().unwrap());

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fetch_without_bucket_is_rejected() {
        let app = build_router(test_state(Config::for_tests()));
        let (_, created) = send(
            &app,
            Method::POST,
            "/api/v1/requests",
            Some(json!({"owner_id": "u1", "chat_id": "c1"})),
        )
        .await;
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/v1/requests/{}/documents/fetch", created["id"].as_str().unwrap()),
            Some(json!({"type": "resume", "file_ref": "uploads/cv.pdf"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_cleanup_rejects_huge_window() {
        let app = build_router(test_state(Config::for_tests()));
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/admin/cleanup",
            Some(json!({"owner_id": "admin", "older_than_hours": i64::MAX})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_admin_cleanup_requires_login_in_production() {
        let config = Config {
            environment: Environment::Production,
            ..Config::for_tests()
        };
        let app = build_router(test_state(config));

        let (status, body) =
            send(&app, Method::GET, "/api/v1/admin/status?owner_id=admin", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["auth_required"], true);
        assert_eq!(body["authenticated"], false);

        let cleanup = json!({"owner_id": "admin"});
        let (status, _) =
            send(&app, Method::POST, "/api/v1/admin/cleanup", Some(cleanup.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/admin/login",
            Some(json!({"owner_id": "admin", "chat_id": "c", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/admin/login",
            Some(json!({"owner_id": "admin", "chat_id": "c", "password": "s3cret"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, body) = send(&app, Method::POST, "/api/v1/admin/cleanup", Some(cleanup)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 0);
    }

    #[tokio::test]
    async fn test_admin_lockout_returns_too_many_requests() {
        let config = Config {
            environment: Environment::Production,
            ..Config::for_tests()
        };
        let app = build_router(test_state(config));
        let wrong = json!({"owner_id": "admin", "chat_id": "c", "password": "nope"});

        for _ in 0..2 {
            let (status, _) =
                send(&app, Method::POST, "/api/v1/admin/login", Some(wrong.clone())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, body) = send(&app, Method::POST, "/api/v1/admin/login", Some(wrong)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "AUTH_ERROR");
    }
}
