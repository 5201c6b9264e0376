pub mod routes;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use crate::adapters::http::state::HttpState;

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/set-folder", post(routes::set_folder))
        .route("/live_update", get(routes::live_update))
        .with_state(state)
}
