mod color;
mod grid;

pub use color::{Color, ColorError};
pub use grid::{Grid, GridError};
