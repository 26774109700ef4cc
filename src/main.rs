use axum::{
    Extension, Router,
    routing::{get, patch, post},
    middleware::from_fn_with_state,
    extract::DefaultBodyLimit,
};

use http::{HeaderValue, Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure},
    cors::CorsLayer,
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dealerhub::{
    config::Config,
    handlers,
    middleware_layer::{self, gate::GateState},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://[::1]:3000"),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(100)
            .burst_size(500)
            .use_headers()
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let sign_in_routes = Router::new()
        .route("/api/auth/sign-in", post(handlers::auth::sign_in))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_sign_in,
        ))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/api/auth/sign-out", post(handlers::auth::sign_out))
        .route("/api/auth/state", get(handlers::auth::auth_state))
        .route("/api/auth/events", get(handlers::auth::auth_events))
        .route("/api/profile", get(handlers::profiles::get_own_profile))
        .route(
            "/api/profiles/{user_id}",
            patch(handlers::profiles::update_profile),
        )
        .route(
            "/api/pages/{slug}/events",
            get(handlers::pages::page_events),
        )
        .layer(tower_governor::GovernorLayer::new(governor_conf.clone()))
        .with_state(state.clone());

    let mut page_routes = Router::new()
        .route("/", get(handlers::pages::landing))
        .route(&config.sign_in_path, get(handlers::pages::sign_in_page));

    for page in handlers::pages::PAGES.iter() {
        let gated = Router::new()
            .route(&page.path(), get(handlers::pages::render_page))
            .route_layer(from_fn_with_state(
                GateState::new(state.clone(), page.gate()),
                middleware_layer::gate::require_roles,
            ))
            .layer(Extension(page));
        page_routes = page_routes.merge(gated);
    }
    let page_routes = page_routes.layer(Extension(state.paths.clone()));

    let app = Router::new()
        .merge(sign_in_routes)
        .merge(api_routes)
        .merge(page_routes.with_state(state.clone()))
        .layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::load_auth,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors);

    let sweep_state = state.clone();
    let sweep_every = config.auth_sweep_interval;
    let idle = config.auth_idle;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = sweep_state.registry.sweep(idle);
            let pruned = sweep_state.sessions.bus().prune();
            if removed > 0 || pruned > 0 {
                tracing::info!(
                    "🧹 Swept {} auth machine(s) and {} idle channel(s); {} live",
                    removed,
                    pruned,
                    sweep_state.registry.len()
                );
            }
        }
    });

    let addr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ Auth sweep started (every {:?})", sweep_every);
    tracing::info!("✅ All systems operational");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
