//! HTTP API module.
//!
//! Provides the WebSocket upgrade route, the publish endpoints the REST
//! layer calls when a domain event occurs, and a health probe.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{HealthResponse, PublishResponse};
pub use routes::create_router;
pub use state::AppState;
