//! axum integration
//!
//! [`protect`] puts a requirement in front of a router's routes. The
//! principal is read from the request extensions, where an upstream
//! authentication layer (or [`header_identity`]) stores a [`PrincipalState`].
//! Requests without one are treated as signed out.

use crate::engine::AccessGate;
use crate::redirect::{Outcome, Redirect, RedirectPolicy};
use crate::requirement::AccessRequirement;
use crate::types::{Principal, PrincipalState};

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

/// Principal id header set by a trusted upstream proxy
pub const X_PRINCIPAL_ID: &str = "x-principal-id";

/// Comma-separated roles header set by a trusted upstream proxy
pub const X_PRINCIPAL_ROLES: &str = "x-principal-roles";

/// Comma-separated permissions header set by a trusted upstream proxy
pub const X_PRINCIPAL_PERMISSIONS: &str = "x-principal-permissions";

/// State shared by the protection middleware of one router
#[derive(Clone)]
pub struct RouteProtection {
    pub gate: Arc<AccessGate>,
    pub policy: Arc<RedirectPolicy>,
    pub requirement: Arc<AccessRequirement>,
}

/// Apply `requirement` to every route of `router`
pub fn protect<S>(
    router: Router<S>,
    gate: Arc<AccessGate>,
    policy: Arc<RedirectPolicy>,
    requirement: AccessRequirement,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let protection = RouteProtection {
        gate,
        policy,
        requirement: Arc::new(requirement),
    };
    router.route_layer(middleware::from_fn_with_state(protection, require))
}

/// Protection middleware: evaluate, then render or redirect
pub async fn require(
    State(protection): State<RouteProtection>,
    request: Request,
    next: Next,
) -> Response {
    let state = request
        .extensions()
        .get::<PrincipalState>()
        .cloned()
        .unwrap_or(PrincipalState::Anonymous);
    let from = request.uri().path().to_string();

    let decision = protection.gate.evaluate(&state, &protection.requirement);
    let outcome = protection.policy.resolve(&decision, state.principal(), &from);

    debug!(path = %from, decision = decision.label(), "Route check");

    match outcome {
        Outcome::Render => next.run(request).await,
        Outcome::Loading => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "1")],
        )
            .into_response(),
        Outcome::Fallback { view, decision } => (
            StatusCode::FORBIDDEN,
            Json(json!({ "view": view, "decision": decision })),
        )
            .into_response(),
        Outcome::Redirect(redirect) => redirect_response(&redirect),
    }
}

/// 303 to the redirect target, carrying the navigation state as JSON
fn redirect_response(redirect: &Redirect) -> Response {
    let location = match HeaderValue::from_str(&redirect.to) {
        Ok(location) => location,
        Err(e) => {
            error!(to = %redirect.to, error = %e, "Redirect target is not a valid header value");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = Json(redirect).into_response();
    *response.status_mut() = StatusCode::SEE_OTHER;
    response.headers_mut().insert(header::LOCATION, location);
    response
}

/// Build the principal state from trusted identity headers
pub fn principal_from_headers(headers: &HeaderMap) -> PrincipalState {
    let Some(id) = header_str(headers, X_PRINCIPAL_ID).filter(|id| !id.is_empty()) else {
        return PrincipalState::Anonymous;
    };

    let principal = Principal::new(id)
        .with_roles(split_list(header_str(headers, X_PRINCIPAL_ROLES)));
    let principal = split_list(header_str(headers, X_PRINCIPAL_PERMISSIONS))
        .into_iter()
        .fold(principal, |p, perm| p.with_permission(perm));

    PrincipalState::Authenticated(principal)
}

/// Middleware storing the header identity in the request extensions
///
/// Only for deployments behind a proxy that authenticates users and strips
/// these headers from client requests.
pub async fn header_identity(mut request: Request, next: Next) -> Response {
    let state = principal_from_headers(request.headers());
    request.extensions_mut().insert(state);
    next.run(request).await
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
