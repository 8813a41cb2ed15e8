mod dto;
pub mod handlers;
pub mod repo;

use crate::state::AppState;
use axum::Router;

/// Routes open to anonymous visitors.
pub fn router() -> Router<AppState> {
    handlers::public_routes()
}

/// Routes that sit behind the login check.
pub fn protected_router() -> Router<AppState> {
    handlers::protected_routes()
}
