//! HTTP API.
//!
//! One route per workflow operation, nested under `/api/`. Handlers parse
//! ids, run the operation on the blocking pool with a fresh connection, and
//! wrap the result in the `{"success": ...}` envelope.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer};
pub use types::ApiContext;
