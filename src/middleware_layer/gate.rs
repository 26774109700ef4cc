use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect as RedirectResponse, Response},
    Extension,
};
use tower_cookies::Cookies;

use crate::{
    auth::{
        gate::{GateDecision, RoleGate},
        navigation::{Redirect, RedirectPaths},
    },
    middleware_layer::auth::{CurrentAuth, clear_session_cookie},
    state::AppState,
};

/// State for one gated route group: the app plus the roles it requires.
#[derive(Clone)]
pub struct GateState {
    pub app: AppState,
    pub gate: RoleGate,
}

impl GateState {
    pub fn new(app: AppState, gate: RoleGate) -> Self {
        Self { app, gate }
    }
}

fn loading_placeholder() -> Response {
    (
        StatusCode::ACCEPTED,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::RETRY_AFTER, "1"),
        ],
        r#"{"status":"loading"}"#,
    )
        .into_response()
}

/// Answers with the redirect the session's machine parked, if any, and drops
/// the session cookie along with it.
pub fn deliver_parked_redirect(
    current: &CurrentAuth,
    cookies: &Cookies,
    paths: &RedirectPaths,
) -> Option<Response> {
    let redirect = current.take_redirect()?;
    tracing::info!("↪️ Delivering parked redirect: {:?}", redirect);
    clear_session_cookie(cookies);
    Some(RedirectResponse::to(&redirect.path(paths)).into_response())
}

/// A middleware that renders, redirects or shows a loading placeholder
/// according to the route group's [`RoleGate`].
///
/// A redirect parked by the session's machine (a forced or explicit
/// sign-out) wins over the gate's own decision.
pub async fn require_roles(
    State(gate_state): State<GateState>,
    Extension(current): Extension<CurrentAuth>,
    cookies: Cookies,
    request: Request<Body>,
    next: Next,
) -> Response {
    let paths = &gate_state.app.paths;

    if let Some(parked) = deliver_parked_redirect(&current, &cookies, paths) {
        return parked;
    }

    match gate_state.gate.evaluate(&current.state) {
        GateDecision::Pending => loading_placeholder(),
        GateDecision::Redirect(redirect) => {
            tracing::debug!(
                "🚧 Gate {:?} redirecting to {:?}",
                gate_state.gate.required(),
                redirect
            );
            if redirect == Redirect::SignIn && current.session_id.is_some() {
                clear_session_cookie(&cookies);
            }
            RedirectResponse::to(&redirect.path(paths)).into_response()
        }
        GateDecision::Render => next.run(request).await,
    }
}
