// Two tiers of handlers:
// public (no credentials) and protected (session or API key, usually company-scoped).
pub mod protected;
pub mod public;
