//! HTTP application assembly.

use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::onboarding::{DraftStore, OnboardingRouteState, onboarding_routes};
use crate::setup::{SetupOrchestrator, SetupRouteState, setup_routes};
use crate::store::AccountStore;

/// Everything the routers share.
#[derive(Clone)]
pub struct AppState {
    pub drafts: Arc<DraftStore>,
    pub orchestrator: Arc<SetupOrchestrator>,
    pub store: Arc<dyn AccountStore>,
}

/// Build the full router: onboarding, setup, account and health.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(onboarding_routes(OnboardingRouteState {
            drafts: state.drafts,
        }))
        .merge(setup_routes(SetupRouteState {
            orchestrator: state.orchestrator,
            store: state.store,
        }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "receptionist-setup"
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::WebhookConfig;
    use crate::onboarding::MemoryDraftStorage;
    use crate::store::LibSqlBackend;
    use crate::training::HttpAgentTrainer;

    #[tokio::test]
    async fn health_reports_ok() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let drafts = Arc::new(DraftStore::new(Arc::new(MemoryDraftStorage::new())));
        let trainer =
            Arc::new(HttpAgentTrainer::new(WebhookConfig::new("http://127.0.0.1:9/train")).unwrap());
        let orchestrator = Arc::new(SetupOrchestrator::new(store.clone(), trainer, drafts.clone()));
        let app = app_router(AppState {
            drafts,
            orchestrator,
            store,
        });

        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }
}
