// Routes reachable without credentials: service info, session issuance, and provider callbacks
pub mod auth;
pub mod root;
pub mod stripe;
