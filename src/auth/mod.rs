use crate::state::AppState;
use axum::Router;

mod dto;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod repo;
pub mod repo_types;
pub mod services;

/// Routes reachable without credentials.
pub fn public_router() -> Router<AppState> {
    handlers::register_routes()
}

/// Routes that sit behind the auth gate.
pub fn router() -> Router<AppState> {
    handlers::token_routes()
}
