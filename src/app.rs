use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::SecurityConfig;
use crate::handlers::{protected, public};
use crate::middleware::{
    auth::API_KEY_HEADER, auth_middleware, company_context_middleware, rate_limit_middleware, session_auth_middleware,
};
use crate::state::AppState;

/// Full HTTP surface: public, session-only and company-scoped routes
pub fn build_router(state: AppState) -> Router {
    let max_body = state.config.api.max_request_size_bytes;
    let cors = cors_layer(&state.config.security);

    Router::new()
        .merge(public_routes(&state))
        .merge(session_routes(&state))
        .merge(company_routes(&state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(max_body)),
        )
        .with_state(state)
}

fn public_routes(state: &AppState) -> Router<AppState> {
    use public::{auth, root, stripe};

    Router::new()
        .route("/", get(root::root))
        .route("/health", get(root::health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/webhooks/stripe", post(stripe::stripe_webhook))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware))
}

/// Authenticated by session; no company membership needed yet
fn session_routes(state: &AppState) -> Router<AppState> {
    use protected::account;

    Router::new()
        .route("/api/auth/whoami", get(account::whoami))
        .route("/api/profile", get(account::profile_get).patch(account::profile_patch))
        .route("/api/companies", post(account::company_create))
        .route("/api/team/invitations/accept", post(account::invitation_accept))
        .route("/api/calendar/google/callback", get(account::google_callback))
        // Layers run bottom-up: authenticate, then rate limit per user
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .route_layer(from_fn_with_state(state.clone(), session_auth_middleware))
}

fn company_routes(state: &AppState) -> Router<AppState> {
    use protected::{ai, analytics, api_keys, approvals, billing, calendar, company, documents, team, tenders, webhooks};

    Router::new()
        .route("/api/company", get(company::company_get).patch(company::company_patch))
        // Tenders and their documents
        .route("/api/tenders", get(tenders::tender_list).post(tenders::tender_create))
        .route(
            "/api/tenders/:id",
            get(tenders::tender_get)
                .patch(tenders::tender_patch)
                .delete(tenders::tender_delete),
        )
        .route("/api/tenders/:id/status", patch(tenders::tender_status))
        .route(
            "/api/tenders/:id/documents",
            get(documents::document_list).post(documents::document_create),
        )
        .route(
            "/api/documents/:id",
            patch(documents::document_patch).delete(documents::document_delete),
        )
        // Team
        .route("/api/team/members", get(team::member_list))
        .route(
            "/api/team/members/:user_id",
            patch(team::member_patch).delete(team::member_delete),
        )
        .route(
            "/api/team/invitations",
            get(team::invitation_list).post(team::invitation_create),
        )
        .route("/api/team/invitations/:id", delete(team::invitation_delete))
        // Approvals
        .route(
            "/api/approvals/workflows",
            get(approvals::workflow_list).post(approvals::workflow_create),
        )
        .route(
            "/api/approvals/workflows/:id",
            get(approvals::workflow_get).delete(approvals::workflow_delete),
        )
        .route(
            "/api/approvals/requests",
            get(approvals::request_list).post(approvals::request_create),
        )
        .route("/api/approvals/requests/:id", get(approvals::request_get))
        .route("/api/approvals/requests/:id/decision", post(approvals::request_decide))
        .route("/api/approvals/requests/:id/cancel", post(approvals::request_cancel))
        // Outbound integrations
        .route("/api/webhooks", get(webhooks::webhook_list).post(webhooks::webhook_create))
        .route(
            "/api/webhooks/:id",
            patch(webhooks::webhook_patch).delete(webhooks::webhook_delete),
        )
        .route("/api/webhooks/:id/test", post(webhooks::webhook_test))
        .route("/api/webhooks/:id/deliveries", get(webhooks::webhook_deliveries))
        .route("/api/api-keys", get(api_keys::api_key_list).post(api_keys::api_key_create))
        .route("/api/api-keys/:id", delete(api_keys::api_key_delete))
        // Calendar
        .route("/api/calendar/events", get(calendar::event_list).post(calendar::event_create))
        .route(
            "/api/calendar/events/:id",
            patch(calendar::event_patch).delete(calendar::event_delete),
        )
        .route("/api/calendar/export.ics", get(calendar::export_ics))
        .route("/api/calendar/google/connect", get(calendar::google_connect))
        .route("/api/calendar/google/sync", post(calendar::google_sync))
        // Billing, AI, analytics
        .route("/api/billing/checkout", post(billing::checkout))
        .route("/api/billing/portal", post(billing::portal))
        .route("/api/billing/invoices", get(billing::invoices))
        .route("/api/ai/generate", post(ai::generate_section))
        .route("/api/ai/image", post(ai::generate_image))
        .route("/api/analytics/dashboard", get(analytics::dashboard))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .route_layer(from_fn_with_state(state.clone(), company_context_middleware))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
}

/// Any-origin when no origins are configured; otherwise an explicit list with credentials
fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
        .allow_credentials(true)
}
