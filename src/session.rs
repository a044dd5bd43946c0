//! Session gate: decides whether a request may reach a view.
//!
//! The identity provider owns sign-up and session state; this module only
//! looks at the `{is_loaded, is_signed_in}` pair it reports and picks between
//! a loading placeholder, a redirect, or rendering the view.

use axum::Json;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Header carrying the identity provider's user id.
pub const IDENTITY_ID_HEADER: &str = "x-identity-id";
/// Header carrying the identity's email address.
pub const IDENTITY_EMAIL_HEADER: &str = "x-identity-email";
/// Header carrying the identity's display name.
pub const IDENTITY_NAME_HEADER: &str = "x-identity-name";
/// Header set to `loading` while the provider has not resolved the session.
pub const AUTH_STATUS_HEADER: &str = "x-auth-status";

/// Where signed-out visitors are sent from protected views.
pub const SIGN_IN_PATH: &str = "/sign-in";
/// Where signed-in visitors are sent from public-only views.
pub const DASHBOARD_PATH: &str = "/dashboard";

/// Session state as reported by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState {
    pub is_loaded: bool,
    pub is_signed_in: bool,
}

/// Kind of view being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Only signed-in users (dashboard, setup).
    Protected,
    /// Only signed-out users (sign-in, sign-up, onboarding wizard).
    Public,
}

/// Outcome of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Loading,
    Redirect(&'static str),
    Render,
}

/// Pure gate predicate.
pub fn gate(session: SessionState, access: Access) -> GateDecision {
    if !session.is_loaded {
        return GateDecision::Loading;
    }
    match (access, session.is_signed_in) {
        (Access::Protected, false) => GateDecision::Redirect(SIGN_IN_PATH),
        (Access::Public, true) => GateDecision::Redirect(DASHBOARD_PATH),
        _ => GateDecision::Render,
    }
}

/// An authenticated user as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque external user id.
    pub external_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(external_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            email: email.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Read the session pair and identity from request headers.
pub fn session_from_headers(headers: &HeaderMap) -> (SessionState, Option<Identity>) {
    let is_loaded = header_str(headers, AUTH_STATUS_HEADER)
        .map(|s| !s.eq_ignore_ascii_case("loading"))
        .unwrap_or(true);

    let identity = header_str(headers, IDENTITY_ID_HEADER).map(|id| {
        let email = header_str(headers, IDENTITY_EMAIL_HEADER).unwrap_or_default();
        let identity = Identity::new(id, email);
        match header_str(headers, IDENTITY_NAME_HEADER) {
            Some(name) => identity.with_display_name(name),
            None => identity,
        }
    });

    let session = SessionState {
        is_loaded,
        is_signed_in: is_loaded && identity.is_some(),
    };
    (session, identity)
}

/// Response for a gate decision that does not render.
pub fn gate_response(decision: GateDecision) -> Option<Response> {
    match decision {
        GateDecision::Render => None,
        GateDecision::Loading => {
            let mut resp = (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"status": "loading"})),
            )
                .into_response();
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            Some(resp)
        }
        GateDecision::Redirect(location) => Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"redirect": location})),
            )
                .into_response(),
        ),
    }
}

/// Run the gate for a protected view and return the signed-in identity.
pub fn require_identity(headers: &HeaderMap) -> Result<Identity, Response> {
    let (session, identity) = session_from_headers(headers);
    if let Some(resp) = gate_response(gate(session, Access::Protected)) {
        return Err(resp);
    }
    identity.ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"redirect": SIGN_IN_PATH})),
        )
            .into_response()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(is_loaded: bool, is_signed_in: bool) -> SessionState {
        SessionState {
            is_loaded,
            is_signed_in,
        }
    }

    #[test]
    fn protected_views() {
        assert_eq!(gate(state(false, false), Access::Protected), GateDecision::Loading);
        assert_eq!(
            gate(state(true, false), Access::Protected),
            GateDecision::Redirect(SIGN_IN_PATH)
        );
        assert_eq!(gate(state(true, true), Access::Protected), GateDecision::Render);
    }

    #[test]
    fn public_views() {
        assert_eq!(gate(state(false, true), Access::Public), GateDecision::Loading);
        assert_eq!(gate(state(true, false), Access::Public), GateDecision::Render);
        assert_eq!(
            gate(state(true, true), Access::Public),
            GateDecision::Redirect(DASHBOARD_PATH)
        );
    }

    #[test]
    fn headers_produce_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(IDENTITY_ID_HEADER, HeaderValue::from_static("user_123"));
        headers.insert(IDENTITY_EMAIL_HEADER, HeaderValue::from_static("joe@pizza.test"));

        let (session, identity) = session_from_headers(&headers);
        assert_eq!(session, state(true, true));
        let identity = identity.unwrap();
        assert_eq!(identity.external_id, "user_123");
        assert_eq!(identity.email, "joe@pizza.test");
        assert!(identity.display_name.is_none());
    }

    #[test]
    fn name_header_sets_display_name() {
        let mut headers = HeaderMap::new();
        headers.insert(IDENTITY_ID_HEADER, HeaderValue::from_static("user_123"));
        headers.insert(IDENTITY_NAME_HEADER, HeaderValue::from_static("Joe"));

        let (_, identity) = session_from_headers(&headers);
        let identity = identity.unwrap();
        assert_eq!(identity.display_name.as_deref(), Some("Joe"));
        assert_eq!(identity.email, "");
    }

    #[test]
    fn loading_header_means_not_signed_in() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTH_STATUS_HEADER, HeaderValue::from_static("loading"));
        headers.insert(IDENTITY_ID_HEADER, HeaderValue::from_static("user_123"));

        let (session, _) = session_from_headers(&headers);
        assert_eq!(session, state(false, false));
        let resp = require_identity(&headers).unwrap_err();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn missing_identity_is_unauthorized() {
        let resp = require_identity(&HeaderMap::new()).unwrap_err();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
