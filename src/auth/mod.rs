use crate::state::AppState;
use axum::Router;

mod claims;
mod dto;
pub mod google;
pub mod handlers;
pub mod jwt;
#[cfg(test)]
pub mod memory_repo;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod tokens;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::google_routes())
        .merge(handlers::password_reset_routes())
}
