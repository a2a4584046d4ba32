pub mod admin;
pub mod health;
pub mod intake;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

// Base64 inflates by 4/3; the rest covers the JSON fields around the image.
const JSON_ENVELOPE_BYTES: usize = 64 * 1024;

pub fn json_body_limit(max_image_bytes: usize) -> usize {
    max_image_bytes.div_ceil(3) * 4 + JSON_ENVELOPE_BYTES
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_image_bytes;
    let json_limit = DefaultBodyLimit::max(json_body_limit(body_limit));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/intake", post(intake::create_draft))
        .route(
            "/api/intake/:id",
            get(intake::get_draft).delete(intake::discard_draft),
        )
        .route("/api/intake/:id/fields", put(intake::update_fields))
        .route("/api/intake/:id/image", post(intake::attach_image))
        .route("/api/intake/:id/estimate", post(intake::request_estimate))
        .route("/api/intake/:id/submit", post(intake::submit_draft))
        .route(
            "/api/inquiries",
            post(intake::submit_inquiry).layer(json_limit.clone()),
        )
        .route("/api/estimate", post(intake::estimate).layer(json_limit))
        .route("/admin", get(admin::admin_page))
        .route("/api/admin/inquiries", get(admin::list_inquiries))
        .route(
            "/api/admin/inquiries/:id/status",
            post(admin::set_status),
        )
        .route("/api/admin/events", get(admin::events_stream))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
