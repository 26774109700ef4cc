use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    Extension,
};
use futures::stream::{Stream, StreamExt};
use http::header;
use serde::Deserialize;
use tower_cookies::Cookies;

use crate::{
    auth::{
        gate::{GateDecision, RoleGate},
        navigation::RedirectPaths,
    },
    error::{AppError, Result},
    middleware_layer::{auth::CurrentAuth, gate::deliver_parked_redirect},
    models::{
        auth_state::AuthState,
        role::{Role, RoleSet},
    },
    state::AppState,
};

/// A gated panel page.
#[derive(Debug)]
pub struct Page {
    pub slug: &'static str,
    pub title: &'static str,
    pub roles: RoleSet,
}

impl Page {
    pub fn path(&self) -> String {
        format!("/{}", self.slug)
    }

    pub fn gate(&self) -> RoleGate {
        RoleGate::new(self.roles)
    }
}

pub static PAGES: [Page; 5] = [
    Page {
        slug: "dealers",
        title: "Dealers",
        roles: RoleSet::EMPTY.with(Role::Admin).with(Role::Salesman),
    },
    Page {
        slug: "orders",
        title: "Orders",
        roles: RoleSet::EMPTY
            .with(Role::Admin)
            .with(Role::Salesman)
            .with(Role::Dealer)
            .with(Role::Worker),
    },
    Page {
        slug: "products",
        title: "Products",
        roles: RoleSet::EMPTY
            .with(Role::Admin)
            .with(Role::Worker)
            .with(Role::Salesman),
    },
    Page {
        slug: "price-charts",
        title: "Price charts",
        roles: RoleSet::EMPTY
            .with(Role::Admin)
            .with(Role::Salesman)
            .with(Role::Dealer),
    },
    Page {
        slug: "users",
        title: "Users",
        roles: RoleSet::EMPTY.with(Role::Admin),
    },
];

pub fn find_page(slug: &str) -> Option<&'static Page> {
    PAGES.iter().find(|page| page.slug == slug)
}

/// The pages a snapshot may open, in menu order.
pub fn accessible_pages(state: &AuthState) -> Vec<&'static Page> {
    PAGES
        .iter()
        .filter(|page| page.gate().evaluate(state) == GateDecision::Render)
        .collect()
}

fn json_response(status: StatusCode, body: sonic_rs::Value) -> Result<Response> {
    let body = sonic_rs::to_string(&body)?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

fn viewer(state: &AuthState) -> sonic_rs::Value {
    match (state.user(), state.profile()) {
        (Some(user), Some(profile)) => sonic_rs::json!({
            "email": user.email,
            "displayName": profile.display_name,
            "role": profile.role.as_str(),
            "isAdmin": state.is_admin(),
        }),
        (Some(user), None) => sonic_rs::json!({
            "email": user.email,
            "role": null,
            "isAdmin": false,
        }),
        _ => sonic_rs::json!(null),
    }
}

/// Renders a page that already passed its role gate.
#[axum::debug_handler]
pub async fn render_page(
    Extension(page): Extension<&'static Page>,
    Extension(current): Extension<CurrentAuth>,
) -> Result<Response> {
    let roles: Vec<&str> = page.roles.iter().map(Role::as_str).collect();
    json_response(
        StatusCode::OK,
        sonic_rs::json!({
            "page": page.slug,
            "title": page.title,
            "roles": roles,
            "viewer": viewer(&current.state),
        }),
    )
}

/// The default landing page. Lists the pages the caller may open.
///
/// Not gated, so it delivers a parked redirect itself.
#[axum::debug_handler]
pub async fn landing(
    Extension(current): Extension<CurrentAuth>,
    Extension(paths): Extension<RedirectPaths>,
    cookies: Cookies,
) -> Result<Response> {
    if let Some(parked) = deliver_parked_redirect(&current, &cookies, &paths) {
        return Ok(parked);
    }

    let pages: Vec<sonic_rs::Value> = accessible_pages(&current.state)
        .into_iter()
        .map(|page| sonic_rs::json!({ "slug": page.slug, "title": page.title, "path": page.path() }))
        .collect();

    json_response(
        StatusCode::OK,
        sonic_rs::json!({
            "page": "landing",
            "viewer": viewer(&current.state),
            "pages": pages,
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    #[serde(default)]
    pub deactivated: bool,
}

/// The sign-in page. Shows a notice after a forced sign-out.
#[axum::debug_handler]
pub async fn sign_in_page(Query(query): Query<SignInQuery>) -> Result<Response> {
    let notice = query
        .deactivated
        .then_some("Your account has been deactivated. Contact an administrator.");

    json_response(
        StatusCode::OK,
        sonic_rs::json!({
            "page": "sign-in",
            "notice": notice,
        }),
    )
}

fn decision_event(decision: GateDecision, paths: &RedirectPaths) -> Event {
    let data = match decision {
        GateDecision::Pending => r#"{"decision":"pending"}"#.to_string(),
        GateDecision::Render => r#"{"decision":"render"}"#.to_string(),
        GateDecision::Redirect(to) => {
            let body = sonic_rs::json!({ "decision": "redirect", "to": to.path(paths) });
            sonic_rs::to_string(&body).unwrap_or_else(|_| r#"{"decision":"redirect"}"#.to_string())
        }
    };
    Event::default().event("gate").data(data)
}

/// Streams a page's gate decision as Server-Sent Events.
///
/// An open page learns about a role change or forced sign-out without
/// reloading.
pub async fn page_events(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Extension(current): Extension<CurrentAuth>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let page = find_page(&slug).ok_or(AppError::NotFound)?;
    let handle = current.handle().ok_or(AppError::Unauthorized)?;

    let paths = state.paths.clone();
    let events = page
        .gate()
        .decisions(handle.subscribe())
        .map(move |decision| Ok(decision_event(decision, &paths)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
