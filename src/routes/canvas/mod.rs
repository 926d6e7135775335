mod handler;
mod model;

pub use handler::{get_canvas, index, place_pixel};
pub use model::PixelResponse;
