//! Notification feed endpoints, one pair per recipient scope.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::{parse_id, ApiError};
use crate::api::types::{success, ApiContext, Success};
use crate::models::{NotificationFeed, Recipient};
use crate::notifications::NotificationDispatcher;

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

/// `GET /api/notifications/patient/:patient_id`
pub async fn patient_feed(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<Success<NotificationFeed>>, ApiError> {
    let id = parse_id(&patient_id, "patientId")?;
    feed(ctx, Recipient::Patient(id)).await
}

/// `GET /api/notifications/doctor/:doctor_id`
pub async fn doctor_feed(
    State(ctx): State<ApiContext>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Success<NotificationFeed>>, ApiError> {
    let id = parse_id(&doctor_id, "doctorId")?;
    feed(ctx, Recipient::Doctor(id)).await
}

/// `PUT /api/notifications/patient/:patient_id/read`
pub async fn patient_read(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<Success<MarkReadResponse>>, ApiError> {
    let id = parse_id(&patient_id, "patientId")?;
    mark_read(ctx, Recipient::Patient(id)).await
}

/// `PUT /api/notifications/doctor/:doctor_id/read`
pub async fn doctor_read(
    State(ctx): State<ApiContext>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Success<MarkReadResponse>>, ApiError> {
    let id = parse_id(&doctor_id, "doctorId")?;
    mark_read(ctx, Recipient::Doctor(id)).await
}

async fn feed(ctx: ApiContext, recipient: Recipient) -> Result<Json<Success<NotificationFeed>>, ApiError> {
    let feed = ctx
        .with_db(move |_, conn| Ok(NotificationDispatcher::new(conn).list(&recipient)?))
        .await?;
    Ok(success(feed))
}

async fn mark_read(ctx: ApiContext, recipient: Recipient) -> Result<Json<Success<MarkReadResponse>>, ApiError> {
    let updated = ctx
        .with_db(move |_, conn| Ok(NotificationDispatcher::new(conn).mark_all_read(&recipient)?))
        .await?;
    tracing::info!(recipient_id = %recipient.id(), updated, "Notifications marked read");
    Ok(success(MarkReadResponse { updated }))
}
