//! HTTP adapter
//!
//! Maps the core onto HTTP: `201 Created` with a `Location` for new
//! versions, `409 Conflict` naming the actual latest for stale writes,
//! `422` for actions the state machine forbids, and a server-sent event
//! stream per version for supersession notices.

mod errors;
mod routes;
mod server;

pub use errors::ApiError;
pub use routes::{chain_routes, AppState, HistoryEntry, HistoryResponse, IDEMPOTENCY_KEY};
pub use server::HttpServer;
