pub mod rate_limiter;
pub mod secrets;

pub use rate_limiter::{RateLimitStatus, RateLimiter};
