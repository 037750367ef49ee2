//! Router assembly.

use axum::{
    Router,
    http::{HeaderValue, Method, Uri, header},
    middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth;
use crate::error::ApiError;
use crate::rate_limit::{self, RateLimitConfig, RateLimiter};
use crate::realtime;
use crate::routes::{course, notification, order, payment, video};
use crate::state::AppState;

async fn healthz() -> &'static str {
    "ok"
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Route {} not found", uri.path()))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Session
        .route("/me", get(auth::me))
        .route("/refresh", get(auth::refresh))
        .route("/logout", get(auth::logout))
        // Catalog
        .route("/courses", get(course::list_courses))
        .route("/courses/{id}", get(course::get_course))
        .route("/courses/{id}/content", get(course::get_content))
        .route("/courses/{id}/questions", put(course::add_question))
        .route("/courses/{id}/answers", put(course::add_answer))
        .route("/courses/{id}/reviews", put(course::add_review))
        .route(
            "/courses/{id}/reviews/{review_id}/replies",
            put(course::add_review_reply),
        )
        // Purchase
        .route("/orders", post(order::create_order))
        .route("/payment/publishable-key", get(payment::publishable_key))
        .route("/payment", post(payment::create_payment))
        .route("/video-url", post(video::video_url))
        // Admin
        .route(
            "/admin/courses",
            get(course::admin_list_courses).post(course::create_course),
        )
        .route(
            "/admin/courses/{id}",
            put(course::edit_course).delete(course::delete_course),
        )
        .route("/admin/orders", get(order::list_orders))
        .route(
            "/admin/notifications",
            get(notification::list_notifications),
        )
        .route("/admin/notifications/{id}", put(notification::mark_read))
}

/// Builds the application router.
///
/// Every route except `/healthz` counts against the per-client rate limit.
pub fn build_router(
    state: Arc<AppState>,
    cors_origins: &[String],
    limits: RateLimitConfig,
) -> Router {
    let limiter = RateLimiter::new(limits);
    Router::new()
        .route("/ws", get(realtime::ws_handler))
        .nest("/api/v1", api_routes())
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::limit_requests,
        ))
        .route("/healthz", get(healthz))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
