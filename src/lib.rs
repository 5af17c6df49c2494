//! Storefront API Library
//!
//! Catalog browsing, session-bound carts, checkout, user accounts and
//! payment-provider callbacks behind an axum router.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod session;
pub mod tracing;
pub mod views;

use axum::{http::HeaderValue, routing::get, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tower_sessions::{
    cookie::time::Duration, Expiry, MemoryStore, SessionManagerLayer, SessionStore,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<config::AppConfig>,
        event_sender: events::EventSender,
    ) -> Self {
        let services =
            handlers::AppServices::new(db.clone(), Arc::new(event_sender), config.clone());
        Self {
            db,
            config,
            services,
        }
    }
}

/// All storefront routes, still expecting [`AppState`].
pub fn app_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::catalog::list_products))
        .route("/health", get(handlers::health::health_check))
        .nest("/catalog", handlers::catalog::catalog_routes())
        .nest("/cart", handlers::cart::cart_routes())
        .nest("/orders", handlers::orders::order_routes())
        .nest("/users", handlers::users::user_routes())
        .nest("/payment", handlers::payment::payment_routes())
}

/// CORS from config: explicit origins, permissive in development, same-origin otherwise.
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!("no CORS origins configured; allowing any origin");
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("no CORS origins configured; cross-origin requests will be rejected");
        CorsLayer::new()
    }
}

/// Session cookie settings over the given store.
pub fn session_layer<S>(store: S, cfg: &config::AppConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_secure(cfg.session_cookie_secure)
        .with_expiry(Expiry::OnInactivity(Duration::days(cfg.session_expiry_days)))
}

/// Full application router with sessions, tracing, request ids, CORS and compression.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let routes = app_routes().merge(openapi::swagger_ui());
    let routes = match state.config.session_backend {
        config::SessionBackend::Database => routes.layer(session_layer(
            session::DatabaseSessionStore::new(state.db.clone()),
            &state.config,
        )),
        config::SessionBackend::Memory => {
            routes.layer(session_layer(MemoryStore::default(), &state.config))
        }
    };

    routes
        // HTTP tracing layer for consistent request/response telemetry
        .layer(tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
