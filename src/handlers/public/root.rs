use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::DatabaseManager;
use crate::state::AppState;

/// GET / - Service description
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "TenderDesk API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Public tender response management for small and mid-sized companies",
            "endpoints": {
                "auth": "/auth/register, /auth/login, /auth/logout (public)",
                "account": "/api/auth/whoami, /api/profile, /api/companies (session)",
                "tenders": "/api/tenders[/:id[/documents|/status]]",
                "team": "/api/team/members, /api/team/invitations",
                "approvals": "/api/approvals/workflows, /api/approvals/requests",
                "calendar": "/api/calendar/events, /api/calendar/export.ics",
                "integrations": "/api/webhooks, /api/api-keys, /api/billing/*, /api/ai/*",
                "analytics": "/api/analytics/dashboard",
            }
        }
    }))
}

/// GET /health - Database probe
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "ok" }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": { "status": "degraded", "timestamp": now }
                })),
            )
        }
    }
}
