use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod context;
mod db;
mod enrich;
mod error;
mod record;
mod routes;
mod security;
mod store;
mod tracker;

use auth::Authenticator;
use tracker::TrackerService;

#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub tracker: Arc<TrackerService>,
    pub auth: Arc<dyn Authenticator>,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub(crate) fn build_router(state: AppState) -> Router {
    let bearer = middleware::from_fn_with_state(state.clone(), auth::bearer_auth_middleware);

    // Explicit-IP lookups always require a bearer identity.
    let protected = Router::new()
        .route("/track/{ip}", get(routes::track::track_path))
        .route_layer(bearer.clone());

    // Tracking and history are public unless the deployment opts in to auth.
    let mut open = Router::new()
        .route("/track", post(routes::track::track))
        .route("/logs", get(routes::logs::list_logs));
    if state.config.require_auth {
        open = open.route_layer(bearer);
    }

    Router::new()
        .route("/health", get(health))
        .route("/login", post(routes::auth::login))
        .route("/register", post(routes::auth::register))
        .merge(protected)
        .merge(open)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let config = config::AppConfig::from_env().expect("Failed to load config");
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create DB pool");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let enricher = Arc::new(
        enrich::IpapiClient::new(
            config.enrichment_api_url.clone(),
            Duration::from_secs(config.enrichment_timeout_secs),
        )
        .expect("Failed to create enrichment client"),
    );
    let history = Arc::new(store::PgHistoryStore::new(pool.clone()));
    let tracker = Arc::new(TrackerService::new(enricher, history));

    let authenticator: Arc<dyn Authenticator> =
        Arc::new(auth::PgAuthenticator::new(pool, config.session_ttl_hours));

    let state = AppState {
        config: config.clone(),
        tracker,
        auth: authenticator,
    };

    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install signal handler");
    tracing::info!("Shutting down...");
}
