//! HTTP routes for the order API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /order/{order_uid}  - Order lookup (JSON)
//! GET  /health             - Liveness check
//! GET  /health/ready       - Readiness check (pings storage)
//! GET  /*                  - Static files, when a static directory is configured
//! ```

pub mod health;
pub mod orders;

use std::path::Path;

use axum::http::{Method, Request};
use axum::{Router, middleware::from_fn, routing::get};
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/order/{order_uid}", get(orders::show))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
}

/// Build the complete application with its middleware stack.
///
/// Paths outside the API are served from `static_dir` when one is given.
pub fn app(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut router = routes();
    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        })
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    router
        .layer(cors)
        .layer(from_fn(request_id_middleware))
        .layer(trace)
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{StatusCode, header};
    use axum::response::Response;
    use orderbox_core::{Item, Order};
    use tower::ServiceExt;

    use super::*;
    use crate::cache::OrderCache;
    use crate::db::MemoryOrderStore;
    use crate::middleware::REQUEST_ID_HEADER;

    fn stored_order(uid: &str) -> Order {
        Order {
            order_uid: uid.to_owned(),
            track_number: "WBILMTESTTRACK".to_owned(),
            items: vec![Item {
                chrt_id: 9_934_930,
                price: 453,
                name: "Mascaras".to_owned(),
                ..Item::default()
            }],
            ..Order::default()
        }
    }

    fn test_app(store: &Arc<MemoryOrderStore>) -> Router {
        let cache = Arc::new(OrderCache::new(NonZeroUsize::new(4).unwrap()));
        app(AppState::new(store.clone(), cache), None)
    }

    async fn send(app: Router, method: Method, uri: &str) -> Response {
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::ORIGIN, "http://example.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_order() {
        let store = Arc::new(MemoryOrderStore::with_orders([stored_order("b563feb7")]));
        let response = send(test_app(&store), Method::GET, "/order/b563feb7").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        let body = json(response).await;
        assert_eq!(body["order_uid"], "b563feb7");
        assert_eq!(body["items"][0]["name"], "Mascaras");
    }

    #[tokio::test]
    async fn test_unknown_order_is_404_json() {
        let store = Arc::new(MemoryOrderStore::new());
        let response = send(test_app(&store), Method::GET, "/order/missing1").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"], "order not found");
    }

    #[tokio::test]
    async fn test_invalid_id_is_400() {
        let store = Arc::new(MemoryOrderStore::new());
        let response = send(test_app(&store), Method::GET, "/order/not-valid").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json(response).await["error"].is_string());
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_other_methods_are_405() {
        let store = Arc::new(MemoryOrderStore::with_orders([stored_order("abc")]));
        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let response = send(test_app(&store), method, "/order/abc").await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_500() {
        let store = Arc::new(MemoryOrderStore::with_orders([stored_order("abc")]));
        store.set_fail_reads(true);
        let response = send(test_app(&store), Method::GET, "/order/abc").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(response).await["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_health_and_readiness() {
        let store = Arc::new(MemoryOrderStore::new());
        let response = send(test_app(&store), Method::GET, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(test_app(&store), Method::GET, "/health/ready").await;
        assert_eq!(response.status(), StatusCode::OK);

        store.set_fail_reads(true);
        let response = send(test_app(&store), Method::GET, "/health/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(response).await["error"], "storage unreachable");
    }

    #[tokio::test]
    async fn test_request_id_is_echoed_or_generated() {
        let store = Arc::new(MemoryOrderStore::new());
        let response = test_app(&store)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(REQUEST_ID_HEADER, "upstream-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "upstream-42");

        let response = send(test_app(&store), Method::GET, "/health").await;
        let generated = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert_eq!(generated.len(), 36);
    }
}
