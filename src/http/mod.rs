//! JSON-over-HTTP Calculate service
//!
//! - **types**: error mapping and response bodies
//! - **routes**: router setup
//! - **handlers**: request handlers
//! - **server**: shared state, server configuration and lifecycle

pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use routes::create_router;
pub use server::{run_server, CalcServer, ServerConfig, ServerResult, DEFAULT_BIND_ADDR};
pub use types::{ErrorBody, HealthResponse, HttpError, RETRY_AFTER_SECONDS};
