pub mod app;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod format;
pub mod handlers;
pub mod integrations;
pub mod middleware;
pub mod security;
pub mod services;
pub mod state;
pub mod validation;

pub use app::build_router;
pub use state::AppState;
