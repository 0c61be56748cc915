//! REST API module
//!
//! JSON over HTTP under `/api/v1/*`. Every response uses the
//! `{status, message, data}` envelope; errors carry a stable `code`.

pub mod handlers;
mod server;
mod types;

pub use server::{build_router, serve};
pub use types::{ApiResponse, Empty, HealthStatus};
