//! API routes

pub mod cron;
pub mod health;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Scheduled-job triggers. The debug route runs the exact same job through
    // the exact same authorization check as the production cron route; a
    // money-moving job gets no unauthenticated entry points.
    let cron_routes = Router::new()
        .route("/api/cron/billing", get(cron::run_billing))
        .route("/api/cron/daily-billing-summary", get(cron::run_daily_summary))
        .route("/api/debug/billing-test", get(cron::run_billing));

    Router::new()
        .merge(health_routes)
        .merge(cron_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
