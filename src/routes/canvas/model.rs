use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PixelResponse {
    pub success: bool,
}

impl PixelResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
