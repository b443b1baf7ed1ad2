pub mod authz;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use services::{cache::ListCache, notify::Notifier, storage::StorageService};

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub cache: ListCache,
    pub notifier: Notifier,
    pub storage: StorageService,
}

/// Builds the full HTTP application. Everything except `/health` and
/// `/api/auth/{register,login}` requires a bearer token.
pub fn app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .nest("/projects", routes::projects::router())
        .nest("/tasks", routes::tasks::router())
        .nest("/comments", routes::comments::router())
        .nest("/attachments", routes::attachments::router())
        .nest("/tags", routes::tags::router())
        .merge(routes::auth::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let api_router = Router::new()
        .nest("/auth", routes::auth::router())
        .merge(protected_routes);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health_check() -> &'static str {
    "OK"
}
