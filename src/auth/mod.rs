use crate::state::AppState;
use axum::Router;

mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod repo_types;
mod repo;
mod services;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::routes())
}
