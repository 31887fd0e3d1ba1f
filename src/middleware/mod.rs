pub mod auth;
pub mod membership;
pub mod rate_limit;
pub mod response;
pub mod validate;

pub use auth::{auth_middleware, session_auth_middleware, ApiKeyPrincipal, AuthUser};
pub use membership::{company_context_middleware, CompanyContext};
pub use rate_limit::rate_limit_middleware;
pub use response::{ApiResponse, ApiResult};
pub use validate::ValidJson;
