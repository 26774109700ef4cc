use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tower_cookies::{Cookie, Cookies};
use tower_cookies::cookie::{SameSite, time::Duration as CookieDuration};
use uuid::Uuid;

use crate::{
    auth::{
        machine::AuthHandle,
        navigation::Redirect,
        registry::SessionAuth,
    },
    config::Config,
    error::{AppError, Result},
    models::{auth_state::AuthState, profile::Profile},
    state::AppState,
};

/// The cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_id";

/// Extra wait on top of the fetch timeout, for the machine to publish.
const SETTLE_GRACE: Duration = Duration::from_secs(1);

/// The auth snapshot a request was served under.
#[derive(Clone)]
pub struct CurrentAuth {
    /// The token from the session cookie, if one was sent.
    pub session_id: Option<Uuid>,
    /// The snapshot taken when the request arrived.
    pub state: AuthState,
    auth: Option<SessionAuth>,
}

impl CurrentAuth {
    /// A request without a session cookie.
    pub fn anonymous() -> Self {
        Self {
            session_id: None,
            state: AuthState::signed_out(),
            auth: None,
        }
    }

    /// A request attached to a session's auth machine.
    pub fn attached(session_id: Uuid, state: AuthState, auth: SessionAuth) -> Self {
        Self {
            session_id: Some(session_id),
            state,
            auth: Some(auth),
        }
    }

    pub fn handle(&self) -> Option<&AuthHandle> {
        self.auth.as_ref().map(|a| &a.handle)
    }

    /// Takes the redirect the session's machine parked, if any.
    pub fn take_redirect(&self) -> Option<Redirect> {
        self.auth.as_ref().and_then(|a| a.redirects.take())
    }

    /// The caller's profile, if the caller is signed in and active.
    pub fn require_active(&self) -> Result<&Profile> {
        if self.state.user().is_none() {
            return Err(AppError::Unauthorized);
        }
        match self.state.profile() {
            Some(profile) if self.state.is_active() => Ok(profile),
            _ => Err(AppError::Forbidden),
        }
    }
}

/// Extracts the session token from the request cookies.
pub fn extract_session_token(cookies: &Cookies) -> Option<Uuid> {
    cookies
        .get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// Builds the session cookie for a new session.
pub fn session_cookie(session_id: Uuid, config: &Config) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, session_id.to_string());
    cookie.set_http_only(true);
    if config.production {
        cookie.set_secure(true);
    }
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::seconds(config.session_ttl_secs() as i64));
    cookie.set_path("/");
    cookie
}

/// Tells the browser to drop the session cookie.
pub fn clear_session_cookie(cookies: &Cookies) {
    let mut cookie = Cookie::new(SESSION_COOKIE, "");
    cookie.set_max_age(CookieDuration::seconds(0));
    cookie.set_path("/");
    cookies.remove(cookie);
}

/// Waits for the session's machine to settle, bounded by the profile fetch
/// timeout. Returns the loading snapshot if it does not.
pub async fn settle(auth: &SessionAuth, config: &Config) -> AuthState {
    let limit = config.profile_fetch_timeout + SETTLE_GRACE;
    match tokio::time::timeout(limit, auth.handle.settled()).await {
        Ok(settled) => settled,
        Err(_) => {
            tracing::warn!("Auth still loading after {:?}", limit);
            auth.handle.snapshot()
        }
    }
}

/// A middleware that resolves the caller's [`CurrentAuth`].
///
/// Requests with a session cookie are attached to that session's auth
/// machine and wait for it to [`settle`].
pub async fn load_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let current = match extract_session_token(&cookies) {
        None => CurrentAuth::anonymous(),
        Some(session_id) => {
            tracing::debug!("🔑 Found session_id: {}", session_id);
            let auth = state.registry.attach(session_id);
            let snapshot = settle(&auth, &state.config).await;
            CurrentAuth::attached(session_id, snapshot, auth)
        }
    };

    request.extensions_mut().insert(current);
    next.run(request).await
}
