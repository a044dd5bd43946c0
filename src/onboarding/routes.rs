//! REST endpoints for draft capture.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing::warn;

use super::capture::DraftStore;
use super::draft::DraftUpdate;
use crate::session::{Access, gate, gate_response, session_from_headers};

/// Header identifying the browser/device whose draft is addressed.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub drafts: Arc<DraftStore>,
}

/// Read the device id, or a 400 response when it is missing.
pub fn device_id_from_headers(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(DEVICE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("missing {DEVICE_ID_HEADER} header")})),
            )
                .into_response()
        })
}

/// The wizard is a public-only view.
fn public_gate(headers: &HeaderMap) -> Result<String, Response> {
    let (session, _) = session_from_headers(headers);
    if let Some(resp) = gate_response(gate(session, Access::Public)) {
        return Err(resp);
    }
    device_id_from_headers(headers)
}

/// PATCH /api/onboarding/draft
///
/// Applies one wizard update and returns the resulting draft.
async fn patch_draft(
    State(state): State<OnboardingRouteState>,
    headers: HeaderMap,
    Json(update): Json<DraftUpdate>,
) -> Response {
    let device_id = match public_gate(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.drafts.dispatch(&device_id, update).await {
        Ok(draft) => Json(draft).into_response(),
        Err(e) => {
            warn!(device = %device_id, error = %e, "Draft update failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// GET /api/onboarding/draft
///
/// Returns the device's draft and where it was found, or 404.
async fn get_draft(State(state): State<OnboardingRouteState>, headers: HeaderMap) -> Response {
    let device_id = match public_gate(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.drafts.load(&device_id).await {
        Ok(Some(recovered)) => Json(serde_json::json!({
            "source": recovered.source,
            "draft": recovered.draft,
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "No draft for this device"})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/draft", get(get_draft).patch(patch_draft))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::onboarding::storage::MemoryDraftStorage;
    use crate::session::IDENTITY_ID_HEADER;

    fn router() -> Router {
        let drafts = Arc::new(DraftStore::new(Arc::new(MemoryDraftStorage::new())));
        onboarding_routes(OnboardingRouteState { drafts })
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn patch(device: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::patch("/api/onboarding/draft")
            .header("content-type", "application/json");
        if let Some(device) = device {
            builder = builder.header(DEVICE_ID_HEADER, device);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn patch_then_get_round_trips() {
        let app = router();

        let resp = app
            .clone()
            .oneshot(patch(
                Some("d1"),
                json!({"type": "business_info", "data": {"business_name": "Joe's Pizza"}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["business_info"]["business_name"], "Joe's Pizza");

        let resp = app
            .oneshot(
                Request::get("/api/onboarding/draft")
                    .header(DEVICE_ID_HEADER, "d1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["source"], "memory");
        assert_eq!(body["draft"]["business_info"]["business_name"], "Joe's Pizza");
    }

    #[tokio::test]
    async fn missing_device_is_bad_request() {
        let resp = router()
            .oneshot(patch(None, json!({"type": "reset"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_device_has_no_draft() {
        let resp = router()
            .oneshot(
                Request::get("/api/onboarding/draft")
                    .header(DEVICE_ID_HEADER, "nobody")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signed_in_visitor_is_sent_to_dashboard() {
        let resp = router()
            .oneshot(
                Request::get("/api/onboarding/draft")
                    .header(DEVICE_ID_HEADER, "d1")
                    .header(IDENTITY_ID_HEADER, "user_1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["redirect"], "/dashboard");
    }
}
