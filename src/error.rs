use axum::Json;
use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::service::PixelError;

#[derive(Debug, Clone, Copy)]
pub enum AppError {
    RateLimited { retry_after_secs: u64 },
    InvalidInput,
    InternalServerError,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl From<PixelError> for AppError {
    fn from(err: PixelError) -> Self {
        match err {
            PixelError::RateLimited { retry_after } => AppError::RateLimited {
                // 向上取整，至少 1 秒
                retry_after_secs: retry_after.as_millis().div_ceil(1000).max(1) as u64,
            },
            PixelError::InvalidInput(_) => AppError::InvalidInput,
            PixelError::Internal(_) => AppError::InternalServerError,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "Too many requests"),
            AppError::InvalidInput => (StatusCode::BAD_REQUEST, "Invalid input"),
            AppError::InternalServerError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let mut response = (status, Json(ErrorResponse { error })).into_response();
        if let AppError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, retry_after_secs.into());
        }
        response
    }
}
