mod client_ip;
mod error_handler;

pub use client_ip::{ClientId, client_identity, resolve_client_id};
pub use error_handler::log_errors;
