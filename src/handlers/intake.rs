use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{Estimate, FieldsUpdate, ImageAttachment, Inquiry, InquiryFields};
use crate::services::ai::estimate::DEFAULT_DESCRIPTION;
use crate::services::intake::{self, DraftView, EstimateOutcome, IntakeDraft, SubmissionAck};
use crate::state::AppState;

#[derive(Serialize)]
pub struct SubmitResponse {
    pub inquiry: Inquiry,
    pub acknowledgment: SubmissionAck,
}

fn submitted(state: &AppState, inquiry: Inquiry) -> (StatusCode, Json<SubmitResponse>) {
    let acknowledgment = SubmissionAck::new(inquiry.id.clone(), state.config.ack_dismiss_secs);
    (
        StatusCode::CREATED,
        Json(SubmitResponse {
            inquiry,
            acknowledgment,
        }),
    )
}

// POST /api/intake
pub async fn create_draft(State(state): State<Arc<AppState>>) -> (StatusCode, Json<DraftView>) {
    let id = state.intake.create();
    (StatusCode::CREATED, Json(IntakeDraft::new().view(&id)))
}

// GET /api/intake/:id
pub async fn get_draft(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DraftView>, AppError> {
    let view = state.intake.with_draft(&id, |d| d.view(&id))?;
    Ok(Json(view))
}

// DELETE /api/intake/:id
pub async fn discard_draft(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.intake.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("draft not found: {id}")))
    }
}

// PUT /api/intake/:id/fields
pub async fn update_fields(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<FieldsUpdate>,
) -> Result<Json<DraftView>, AppError> {
    let view = state.intake.with_draft(&id, |d| {
        d.update_fields(update);
        d.view(&id)
    })?;
    Ok(Json(view))
}

// POST /api/intake/:id/image — raw image bytes, mime type in Content-Type
pub async fn attach_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DraftView>, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("image body is empty".to_string()));
    }

    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let image = ImageAttachment::from_bytes(&body, mime_type);

    let view = state.intake.with_draft(&id, |d| {
        d.attach_image(image);
        d.view(&id)
    })?;

    tracing::info!(draft_id = %id, bytes = body.len(), "image attached");
    Ok(Json(view))
}

// POST /api/intake/:id/estimate
pub async fn request_estimate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EstimateOutcome>, AppError> {
    let outcome = state
        .intake
        .request_estimate(&id, &state.estimator)
        .await?;
    Ok(Json(outcome))
}

// POST /api/intake/:id/submit
pub async fn submit_draft(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let inquiry = state.intake.submit(&id, &state.repository).map_err(|e| {
        tracing::warn!(draft_id = %id, error = %e, "draft submission rejected");
        AppError::from(e)
    })?;

    Ok(submitted(&state, inquiry))
}

// POST /api/inquiries — one-shot submission without a server-side draft
#[derive(Deserialize)]
pub struct SubmitInquiryRequest {
    #[serde(flatten)]
    pub fields: InquiryFields,
    pub image_base64: Option<String>,
    pub mime_type: Option<String>,
    pub estimate: Option<Estimate>,
}

pub async fn submit_inquiry(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitInquiryRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let image = decode_image(body.image_base64.as_deref(), body.mime_type.as_deref())?;

    let inquiry = intake::submit_inquiry(
        &state.repository,
        body.fields,
        image,
        body.estimate.as_ref(),
    )?;

    Ok(submitted(&state, inquiry))
}

// POST /api/estimate — one-shot estimate, always answers with an estimate or the fallback
#[derive(Deserialize)]
pub struct EstimateRequest {
    pub image_base64: String,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EstimateRequest>,
) -> Result<Json<Estimate>, AppError> {
    let image = decode_image(Some(body.image_base64.as_str()), body.mime_type.as_deref())?
        .ok_or_else(|| AppError::BadRequest("image_base64 is empty".to_string()))?;

    let description = body.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION);
    Ok(Json(state.estimator.estimate(&image, description).await))
}

fn decode_image(
    data: Option<&str>,
    mime_type: Option<&str>,
) -> Result<Option<ImageAttachment>, AppError> {
    match data.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(None),
        Some(data) => ImageAttachment::from_base64(data, mime_type)
            .map(Some)
            .map_err(|e| AppError::BadRequest(format!("invalid image data: {e}"))),
    }
}
