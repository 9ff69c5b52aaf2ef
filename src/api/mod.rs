//! HTTP API surface.
//!
//! A composable axum router plus the server lifecycle that runs it.
//! Handlers hold no business logic beyond request/response mapping;
//! the pipeline modules do the real work.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::{start_server, ServerHandle};
pub use types::ApiContext;
