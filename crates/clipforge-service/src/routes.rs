//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, credits, health, renders, templates, uploads, webhooks};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent render submissions and status polls.
/// Each one may wait on the render provider.
const RENDER_MAX_CONCURRENT_REQUESTS: usize = 32;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Accounts (JWT auth)
/// - `POST /v1/accounts` - Open account with welcome credits
/// - `GET /v1/accounts/me` - Get current user's account
/// - `DELETE /v1/accounts/me` - Delete current user's account
///
/// ## Credits
/// - `GET /v1/credits/balance` - Get current balance (JWT)
/// - `GET /v1/credits/transactions` - List transaction history (JWT)
/// - `POST /v1/credits/add` - Grant bonus/purchase credits (admin key)
///
/// ## Uploads (JWT auth)
/// - `POST /v1/uploads` - Upload a customization image or video
///
/// ## Renders (JWT auth, rate-limited)
/// - `POST /v1/renders` - Create a render job
/// - `GET /v1/renders` - List render jobs
/// - `GET /v1/renders/:id` - Get (and reconcile) a render job
///
/// ## Template administration (admin key)
/// - `GET /v1/admin/templates` - List registrations
/// - `GET /v1/admin/templates/:id` - Get a registration
/// - `DELETE /v1/admin/templates/:id` - Delete a registration
/// - `POST /v1/admin/templates/:id/upload` - Upload one template
/// - `POST /v1/admin/templates/upload-all` - Upload every template
///
/// ## Webhooks (Signature verification)
/// - `POST /webhooks/render` - Render provider callbacks
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let render_routes = Router::new()
        .route("/", post(renders::create_render).get(renders::list_renders))
        .route("/:id", get(renders::get_render))
        .layer(ConcurrencyLimitLayer::new(RENDER_MAX_CONCURRENT_REQUESTS));

    let admin_routes = Router::new()
        .route("/templates", get(templates::list_templates))
        .route("/templates/upload-all", post(templates::upload_all_templates))
        .route(
            "/templates/:id",
            get(templates::get_template).delete(templates::delete_template),
        )
        .route("/templates/:id/upload", post(templates::upload_template));

    // Create concurrency-limited API routes
    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route(
            "/accounts/me",
            get(accounts::get_account).delete(accounts::delete_account),
        )
        // Credits
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/transactions", get(credits::list_transactions))
        .route("/credits/add", post(credits::admin_add_credits))
        // Uploads (multipart, may be short videos)
        .route(
            "/uploads",
            post(uploads::upload_asset).layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        // Renders (with their own concurrency limit)
        .nest("/renders", render_routes)
        .nest("/admin", admin_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by external services)
        .route("/webhooks/render", post(webhooks::render_webhook))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
