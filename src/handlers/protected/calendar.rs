use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::header,
    response::IntoResponse,
    Extension,
};
use chrono::Utc;
use uuid::Uuid;

use crate::database::models::CalendarEvent;
use crate::error::ApiError;
use crate::integrations::google_calendar::oauth_state;
use crate::middleware::{ApiResponse, ApiResult, CompanyContext, ValidJson};
use crate::services::billing_service::RedirectUrl;
use crate::services::calendar_service::{CreateEventRequest, EventFilter, SyncReport, UpdateEventRequest};
use crate::services::CalendarService;
use crate::state::AppState;

/// GET /api/calendar/events - Optional `from`, `to` and `tender_id` filters
pub async fn event_list(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    filter: Result<Query<EventFilter>, QueryRejection>,
) -> ApiResult<Vec<CalendarEvent>> {
    let Query(filter) = filter?;
    let events = CalendarService::new(state.pool.clone()).list(ctx.company_id, &filter).await?;
    Ok(ApiResponse::success(events))
}

pub async fn event_create(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    ValidJson(request): ValidJson<CreateEventRequest>,
) -> ApiResult<CalendarEvent> {
    let event = CalendarService::new(state.pool.clone())
        .create(ctx.company_id, ctx.user_id, request)
        .await?;
    Ok(ApiResponse::created(event))
}

pub async fn event_patch(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<UpdateEventRequest>,
) -> ApiResult<CalendarEvent> {
    let event = CalendarService::new(state.pool.clone())
        .update(ctx.company_id, id, request)
        .await?;
    Ok(ApiResponse::success(event))
}

pub async fn event_delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    CalendarService::new(state.pool.clone()).delete(ctx.company_id, id).await?;
    Ok(ApiResponse::<()>::no_content())
}

/// GET /api/calendar/export.ics - Raw iCalendar, not wrapped in the JSON envelope
pub async fn export_ics(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
) -> Result<impl IntoResponse, ApiError> {
    let body = CalendarService::new(state.pool.clone()).export_ics(ctx.company_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"tenderdesk.ics\""),
        ],
        body,
    ))
}

/// GET /api/calendar/google/connect - Consent URL bound to the caller by a signed state
pub async fn google_connect(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
) -> ApiResult<RedirectUrl> {
    let oauth = oauth_state(ctx.user_id, &state.config.security.jwt_secret, Utc::now())
        .ok_or_else(|| ApiError::internal("Failed to sign OAuth state"))?;
    let url = state.integrations.google.authorization_url(&oauth)?;
    Ok(ApiResponse::success(RedirectUrl { url }))
}

/// POST /api/calendar/google/sync - Push unsynced events to Google Calendar
pub async fn google_sync(
    State(state): State<AppState>,
    Extension(ctx): Extension<CompanyContext>,
) -> ApiResult<SyncReport> {
    let report = CalendarService::new(state.pool.clone())
        .sync_google(&state.integrations.google, ctx.company_id, ctx.user_id)
        .await?;
    Ok(ApiResponse::success(report))
}
