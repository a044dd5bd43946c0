//! REST endpoints for setup completion and the dashboard account view.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::error;

use super::orchestrator::SetupOrchestrator;
use crate::error::SetupError;
use crate::onboarding::routes::device_id_from_headers;
use crate::session::require_identity;
use crate::store::AccountStore;

/// Where a precondition failure sends the user.
pub const ONBOARDING_PATH: &str = "/onboarding";

/// Shared state for setup routes.
#[derive(Clone)]
pub struct SetupRouteState {
    pub orchestrator: Arc<SetupOrchestrator>,
    pub store: Arc<dyn AccountStore>,
}

/// Map a setup failure to its HTTP response.
///
/// Fatal step failures carry the underlying message and `retry: true` so
/// the loading screen can offer "Try Again".
pub fn setup_error_response(err: &SetupError) -> Response {
    let (status, body) = match err {
        SetupError::MissingBusinessName => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"error": err.to_string(), "retry": false, "redirect": ONBOARDING_PATH}),
        ),
        SetupError::AlreadyRunning { .. } => (
            StatusCode::CONFLICT,
            json!({"error": err.to_string(), "retry": false}),
        ),
        SetupError::StepFailed { step, message } => (
            StatusCode::BAD_GATEWAY,
            json!({"error": message, "step": step, "retry": true}),
        ),
        SetupError::NotProvisioned { .. } => (
            StatusCode::NOT_FOUND,
            json!({"error": err.to_string(), "retry": false}),
        ),
        SetupError::Interrupted(_) | SetupError::Draft(_) | SetupError::Database(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": err.to_string(), "retry": true}),
        ),
    };
    (status, Json(body)).into_response()
}

/// POST /api/setup/complete
async fn complete_setup(State(state): State<SetupRouteState>, headers: HeaderMap) -> Response {
    let identity = match require_identity(&headers) {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };
    let device_id = match device_id_from_headers(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.orchestrator.complete_setup(&identity, &device_id).await {
        Ok(account) => Json(account).into_response(),
        Err(e) => setup_error_response(&e),
    }
}

/// GET /api/setup/progress
async fn get_progress(State(state): State<SetupRouteState>, headers: HeaderMap) -> Response {
    match require_identity(&headers) {
        Ok(identity) => Json(state.orchestrator.status(&identity.external_id).await).into_response(),
        Err(resp) => resp,
    }
}

/// GET /api/account
///
/// The dashboard view. 404 until setup has written the required records.
async fn get_account(State(state): State<SetupRouteState>, headers: HeaderMap) -> Response {
    let identity = match require_identity(&headers) {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };

    match state.store.find_account_by_external_id(&identity.external_id).await {
        Ok(Some(account)) if account.is_complete() => Json(account).into_response(),
        Ok(_) => setup_error_response(&SetupError::NotProvisioned {
            identity: identity.external_id,
        }),
        Err(e) => {
            error!(identity = %identity.external_id, error = %e, "Account lookup failed");
            setup_error_response(&SetupError::Database(e))
        }
    }
}

/// POST /api/agent/train
async fn train_agent(State(state): State<SetupRouteState>, headers: HeaderMap) -> Response {
    let identity = match require_identity(&headers) {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };

    match state.orchestrator.retrain_agent(&identity).await {
        Ok(account) => Json(account).into_response(),
        Err(e) => setup_error_response(&e),
    }
}

/// Build the setup REST routes.
pub fn setup_routes(state: SetupRouteState) -> Router {
    Router::new()
        .route("/api/setup/complete", post(complete_setup))
        .route("/api/setup/progress", get(get_progress))
        .route("/api/account", get(get_account))
        .route("/api/agent/train", post(train_agent))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::error::WebhookError;
    use crate::onboarding::routes::DEVICE_ID_HEADER;
    use crate::onboarding::{DraftStore, MemoryDraftStorage};
    use crate::session::{AUTH_STATUS_HEADER, IDENTITY_EMAIL_HEADER, IDENTITY_ID_HEADER};
    use crate::setup::ProvisioningStep;
    use crate::store::{AgentAssignment, LibSqlBackend};
    use crate::training::{AgentTrainer, TrainingRequest};

    struct NeverCalled;

    #[async_trait::async_trait]
    impl AgentTrainer for NeverCalled {
        async fn train(&self, _request: &TrainingRequest) -> Result<AgentAssignment, WebhookError> {
            panic!("trainer must not be called");
        }
    }

    async fn router() -> Router {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let drafts = Arc::new(DraftStore::new(Arc::new(MemoryDraftStorage::new())));
        let orchestrator = Arc::new(SetupOrchestrator::new(
            backend.clone(),
            Arc::new(NeverCalled),
            drafts,
        ));
        setup_routes(SetupRouteState {
            orchestrator,
            store: backend,
        })
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn signed_in(builder: axum::http::request::Builder) -> axum::http::request::Builder {
        builder
            .header(IDENTITY_ID_HEADER, "user_1")
            .header(IDENTITY_EMAIL_HEADER, "joe@pizza.test")
            .header(DEVICE_ID_HEADER, "d1")
    }

    #[tokio::test]
    async fn signed_out_is_redirected_to_sign_in() {
        let resp = router()
            .await
            .oneshot(Request::post("/api/setup/complete").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["redirect"], "/sign-in");
    }

    #[tokio::test]
    async fn loading_session_is_retried() {
        let resp = router()
            .await
            .oneshot(
                signed_in(Request::post("/api/setup/complete"))
                    .header(AUTH_STATUS_HEADER, "loading")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn missing_draft_is_unprocessable() {
        let resp = router()
            .await
            .oneshot(
                signed_in(Request::post("/api/setup/complete"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(resp).await;
        assert_eq!(
            body["error"],
            "Business information is missing. Please restart onboarding."
        );
        assert_eq!(body["redirect"], ONBOARDING_PATH);
    }

    #[tokio::test]
    async fn account_is_not_found_before_setup() {
        let resp = router()
            .await
            .oneshot(signed_in(Request::get("/api/account")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn progress_starts_not_started() {
        let resp = router()
            .await
            .oneshot(
                signed_in(Request::get("/api/setup/progress"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["state"], "not_started");
        assert_eq!(body["progress"]["state"], "not_started");
    }

    #[test]
    fn fatal_failure_offers_retry() {
        let resp = setup_error_response(&SetupError::StepFailed {
            step: ProvisioningStep::SavingCallPreferences,
            message: "Query failed: disk full".into(),
        });
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
