// Error taxonomy for the attribution pipeline

use thiserror::Error;

/// Errors surfaced by the store and hop handlers.
///
/// Every fatal variant collapses to the same uniform drop response at the
/// HTTP edge, so a visiting client cannot distinguish why a hop failed.
#[derive(Debug, Error)]
pub enum Error {
    /// A `did`/`cid`/`eid`/`sid` lookup missed.
    #[error("record not found: {0}")]
    NotFound(String),

    /// An `edid` was never minted, or its token points at a tracking
    /// record that no longer resolves.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Required body fields missing on the collection endpoint.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Request not carrying a valid operator credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Backend key-value store failure.
    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
