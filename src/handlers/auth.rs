use std::convert::Infallible;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    Extension, Json,
};
use futures::stream::{self, Stream};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use zeroize::Zeroize;

use crate::{
    auth::navigation::Redirect,
    error::{AppError, Result},
    middleware_layer::auth::{CurrentAuth, clear_session_cookie, session_cookie, settle},
    models::auth_state::AuthState,
    services::auth as auth_service,
    state::AppState,
    validation::auth::{normalize_email, validate},
};

/// The request payload for signing in.
#[derive(Deserialize, Validate)]
pub struct SignInRequest {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 8, max = 128))]
    pub password: String,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub state: AuthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

/// Handles sign-in.
///
/// Opens a session, then waits for its auth machine to settle so the
/// response already reflects the profile. A deactivated account is signed
/// straight back out and answered with `403`.
#[axum::debug_handler]
pub async fn sign_in(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(mut payload): Json<SignInRequest>,
) -> Result<Response> {
    let email = normalize_email(&payload.email);

    let checked = match validate(&payload) {
        Ok(()) => auth_service::sign_in(&state, &email, &payload.password).await,
        Err(e) => Err(e),
    };
    payload.password.zeroize();
    let session = checked?;

    cookies.add(session_cookie(session.id, &state.config));
    tracing::info!("✅ Session cookie added: session_id={}", session.id);

    let auth = state.registry.attach(session.id);
    let settled = settle(&auth, &state.config).await;

    let response = match auth.redirects.take() {
        Some(redirect) => {
            clear_session_cookie(&cookies);
            let message = match redirect {
                Redirect::SignInDeactivated => "Account deactivated",
                _ => "Signed out",
            };
            let body = AuthResponse {
                success: false,
                message: message.to_string(),
                state: settled,
                redirect: Some(redirect.path(&state.paths)),
            };
            (StatusCode::FORBIDDEN, Json(body)).into_response()
        }
        None => {
            let body = AuthResponse {
                success: true,
                message: "Sign-in successful".to_string(),
                state: settled,
                redirect: None,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
    };

    Ok(response)
}

/// Handles sign-out. Signing out without a session still succeeds.
#[axum::debug_handler]
pub async fn sign_out(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAuth>,
    cookies: Cookies,
) -> Result<Response> {
    if let Some(handle) = current.handle() {
        handle.sign_out().await;
    }
    current.take_redirect();

    if let Some(session_id) = current.session_id {
        state.registry.detach(&session_id);
        tracing::info!("👋 Signed out session: {}", session_id);
    }
    clear_session_cookie(&cookies);

    let response = AuthResponse {
        success: true,
        message: "Signed out".to_string(),
        state: AuthState::signed_out(),
        redirect: Some(Redirect::SignIn.path(&state.paths)),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Returns the caller's current auth snapshot, plus any parked redirect.
#[axum::debug_handler]
pub async fn auth_state(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAuth>,
    cookies: Cookies,
) -> Result<Response> {
    let redirect = current.take_redirect();
    if redirect.is_some() {
        clear_session_cookie(&cookies);
    }

    let response = AuthResponse {
        success: current.state.is_active(),
        message: format!("{:?}", current.state.phase()),
        state: current.state.clone(),
        redirect: redirect.map(|r| r.path(&state.paths)),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Streams the caller's auth snapshots as Server-Sent Events.
///
/// One `auth` event is sent immediately, then one per change.
pub async fn auth_events(
    Extension(current): Extension<CurrentAuth>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let handle = current.handle().ok_or(AppError::Unauthorized)?;
    let rx = handle.subscribe();

    let events = stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let data = sonic_rs::to_string(&*rx.borrow_and_update())
            .unwrap_or_else(|_| r#"{"error":"serialization"}"#.to_string());
        Some((Ok(Event::default().event("auth").data(data)), (rx, false)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
