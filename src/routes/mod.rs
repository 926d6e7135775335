use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    AppState,
    middleware::{client_identity, log_errors},
};

pub mod canvas;

/// 组装全部路由和中间件
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(canvas::index))
        .route("/canvas", get(canvas::get_canvas))
        .route("/pixel", post(canvas::place_pixel))
        .layer(from_fn_with_state(state.clone(), client_identity))
        .layer(from_fn(log_errors))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
