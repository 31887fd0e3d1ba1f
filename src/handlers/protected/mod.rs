// Authenticated routes. Session-only handlers take `Extension<AuthUser>`;
// company-scoped handlers take `Extension<CompanyContext>` and check roles themselves.
pub mod account;
pub mod ai;
pub mod analytics;
pub mod api_keys;
pub mod approvals;
pub mod billing;
pub mod calendar;
pub mod company;
pub mod documents;
pub mod team;
pub mod tenders;
pub mod webhooks;
