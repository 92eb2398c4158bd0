//! API router.
//!
//! Returns a composable `Router` with every route under `/api/`.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Room for multipart framing and the intake fields around the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the API router.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(core: Arc<CoreState>) -> Router {
    let body_limit = core.config().max_upload_bytes + MULTIPART_OVERHEAD;
    let ctx = ApiContext::new(core);

    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/ecg/submit", post(endpoints::ecg::submit))
        .route("/ecg/history/:patient_id", get(endpoints::ecg::history))
        .route("/doctors/approved", get(endpoints::doctors::approved))
        .route("/doctors/:doctor_id/cases", get(endpoints::doctors::cases))
        .route("/appointments/book", post(endpoints::appointments::book))
        .route(
            "/appointments/case/:appointment_id/:doctor_id",
            get(endpoints::appointments::case_details),
        )
        .route(
            "/appointments/review/:appointment_id/:doctor_id",
            post(endpoints::appointments::review),
        )
        .route(
            "/appointments/approved/:doctor_id",
            get(endpoints::appointments::approved),
        )
        .route(
            "/notifications/patient/:patient_id",
            get(endpoints::notifications::patient_feed),
        )
        .route(
            "/notifications/patient/:patient_id/read",
            put(endpoints::notifications::patient_read),
        )
        .route(
            "/notifications/doctor/:doctor_id",
            get(endpoints::notifications::doctor_feed),
        )
        .route(
            "/notifications/doctor/:doctor_id/read",
            put(endpoints::notifications::doctor_read),
        )
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .nest("/api", routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
