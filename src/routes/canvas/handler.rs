use axum::{
    body::Bytes,
    extract::{Extension, Json, State},
    response::Html,
};

use crate::{
    AppState, error::AppError, middleware::ClientId, models::Grid, service::PixelRequest,
};

use super::model::PixelResponse;

const VIEWER_TEMPLATE: &str = include_str!("index.html");

/// 简单的网页查看器，尺寸取自配置
#[axum::debug_handler]
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let (width, height) = state.service.canvas().dimensions();
    Html(
        VIEWER_TEMPLATE
            .replace("{{WIDTH}}", &width.to_string())
            .replace("{{HEIGHT}}", &height.to_string()),
    )
}

#[axum::debug_handler]
pub async fn get_canvas(State(state): State<AppState>) -> Json<Grid> {
    Json(state.service.read_canvas())
}

/// 请求体原样读取：先限流，再解析和校验
#[axum::debug_handler]
pub async fn place_pixel(
    State(state): State<AppState>,
    Extension(ClientId(client)): Extension<ClientId>,
    body: Bytes,
) -> Result<Json<PixelResponse>, AppError> {
    let request = PixelRequest::from_body(&body);
    let pixel = state.service.place_pixel(&client, &request)?;
    tracing::debug!(
        client = %client,
        x = pixel.x,
        y = pixel.y,
        color = %pixel.color,
        "pixel placed"
    );
    Ok(Json(PixelResponse::ok()))
}
