pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod stats;

pub use handlers::{AppState, ErrorResponse, SuccessResponse};
pub use routes::create_api_router;
