use std::sync::Arc;

use config::Config;
use service::CanvasService;

pub mod cache;
pub mod canvas;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod service;
pub mod snapshot;

#[derive(Clone)]
pub struct AppState {
    pub service: CanvasService,
    pub config: Arc<Config>,
}
