pub mod api;
pub mod error;
pub mod ws;

pub use api::{ApiState, api_routes};
pub use error::ApiError;
pub use ws::ws_handler;
