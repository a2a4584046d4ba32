use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::Html;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

use crate::errors::AppError;
use crate::models::{Inquiry, InquiryStatus};
use crate::services::repository::RepositoryEvent;
use crate::services::triage::ConsoleView;
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

// GET /admin?token=
pub async fn admin_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Html<String>, AppError> {
    // Browsers navigate here directly, so the token rides in the query string
    let token = query.token.as_deref().unwrap_or("");
    if token != state.config.admin_token {
        return Err(AppError::Unauthorized);
    }

    let view = state.console.view(&state.repository);
    Ok(Html(state.console.render_html(&view, token)))
}

// GET /api/admin/inquiries
pub async fn list_inquiries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ConsoleView>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(state.console.view(&state.repository)))
}

// POST /api/admin/inquiries/:id/status
#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: InquiryStatus,
}

pub async fn set_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Inquiry>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let updated = state
        .console
        .set_status(&state.repository, &id, body.status)
        .map_err(|e| {
            tracing::error!(inquiry_id = %id, error = %e, "failed to update inquiry status");
            AppError::from(e)
        })?;

    Ok(Json(updated))
}

// GET /api/admin/events — SSE stream of console projections
#[derive(Serialize)]
struct ConsoleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    change: Option<RepositoryEvent>,
    view: ConsoleView,
}

fn console_event(state: &AppState, change: Option<RepositoryEvent>) -> Event {
    let update = ConsoleUpdate {
        change,
        view: state.console.view(&state.repository),
    };
    let data = serde_json::to_string(&update).unwrap_or_default();
    Event::default().data(data).event("console")
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Auth via query param (EventSource can't set headers)
    let token = query.token.as_deref().unwrap_or("");
    if token != state.config.admin_token {
        return Err(AppError::Unauthorized);
    }

    let rx = state.repository.subscribe();
    let initial = tokio_stream::once(Ok::<_, Infallible>(console_event(&state, None)));

    let live_state = Arc::clone(&state);
    let live_stream = BroadcastStream::new(rx).map(move |result| match result {
        Ok(change) => Ok::<_, Infallible>(console_event(&live_state, Some(change))),
        // Missed notifications are covered by re-deriving the full view
        Err(BroadcastStreamRecvError::Lagged(_)) => Ok(console_event(&live_state, None)),
    });

    let keepalive_stream = tokio_stream::StreamExt::map(
        IntervalStream::new(tokio::time::interval(Duration::from_secs(30))),
        |_| Ok(Event::default().comment("keepalive")),
    );

    let combined = initial.chain(live_stream);
    let merged = StreamExt::merge(combined, keepalive_stream);

    Ok(Sse::new(merged))
}
