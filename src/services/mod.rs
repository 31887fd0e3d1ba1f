pub mod account_service;
pub mod ai_service;
pub mod analytics_service;
pub mod api_key_service;
pub mod approval_service;
pub mod billing_service;
pub mod calendar_service;
pub mod company_service;
pub mod document_service;
pub mod team_service;
pub mod tender_service;
pub mod webhook_service;

pub use account_service::AccountService;
pub use ai_service::AiService;
pub use analytics_service::AnalyticsService;
pub use api_key_service::ApiKeyService;
pub use approval_service::ApprovalService;
pub use billing_service::BillingService;
pub use calendar_service::CalendarService;
pub use company_service::CompanyService;
pub use document_service::DocumentService;
pub use team_service::TeamService;
pub use tender_service::TenderService;
pub use webhook_service::WebhookService;
