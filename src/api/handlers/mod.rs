use axum::http::StatusCode;

use crate::error::IndexerError;

pub mod markets;
pub mod stats;
pub mod system;
pub mod trades;
pub mod users;

pub use markets::*;
pub use stats::*;
pub use system::*;
pub use trades::*;
pub use users::*;

pub type ApiResult<T> = std::result::Result<T, (StatusCode, String)>;

fn internal(err: IndexerError) -> (StatusCode, String) {
    tracing::error!(error = %err, "read query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn not_found(what: String) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{what} not found"))
}
