use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, AuthService};

use super::handlers::{describe, health_check, locate, ranges_status, AppState};
use super::middleware::record_hits;
use super::stats::query_stats;

pub fn create_api_router(state: Arc<AppState>, auth_service: Arc<AuthService>) -> Router {
    let protected_routes = Router::new()
        .route("/api/describe", get(describe))
        .route("/api/ranges/status", get(ranges_status))
        .route("/api/stats/query", post(query_stats))
        .route_layer(middleware::from_fn(move |headers, req, next| {
            let auth = Arc::clone(&auth_service);
            auth_middleware(auth, headers, req, next)
        }))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/locate", get(locate))
        .with_state(Arc::clone(&state))
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(state, record_hits))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
