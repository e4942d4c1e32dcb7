//! Client-facing error taxonomy.
//!
//! ERROR HANDLING
//! ==============
//! Backend errors arrive as `{ detail, code? }`. When `code` is present it
//! names the class directly; otherwise the HTTP status decides, which keeps
//! plain `{ detail }` backends working. Transport failures stay a separate
//! variant so callers can tell "the server said no" from "the network went
//! away". Nothing in the library retries on error; the user re-triggers.

use serde::{Deserialize, Serialize};

use crate::session::SessionError;

/// Error returned by every API-facing operation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed input, usually caught before the request is sent.
    #[error("{0}")]
    Validation(String),
    /// The request collides with existing state (duplicate active ride,
    /// second review).
    #[error("{0}")]
    Conflict(String),
    /// The action does not apply to the ride's current status, including
    /// races lost to another party.
    #[error("{0}")]
    InvalidState(String),
    /// Missing, expired, or invalid token.
    #[error("{0}")]
    Auth(String),
    /// Authenticated, but the role or ownership check said no.
    #[error("{0}")]
    Forbidden(String),
    /// The resource does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Transport-level failure before any server answer arrived.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The token could not be persisted or cleared locally.
    #[error("session storage failed: {0}")]
    Session(#[from] SessionError),
    /// A response outside the documented contract.
    #[error("unexpected response (HTTP {status}): {message}")]
    Unexpected { status: u16, message: String },
}

/// Machine-readable error class on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Auth,
    Forbidden,
    NotFound,
    Conflict,
    InvalidState,
}

/// Error body shape: FastAPI-style `detail` plus the optional class tag.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub code: Option<ErrorCode>,
}

/// Classify a non-success response into the taxonomy.
#[must_use]
pub fn classify_response(status: u16, body: Option<ErrorBody>, fallback: &str) -> ApiError {
    let ErrorBody { detail, code } = body.unwrap_or_default();
    let message = detail.unwrap_or_else(|| fallback.to_owned());

    match code {
        Some(ErrorCode::Validation) => return ApiError::Validation(message),
        Some(ErrorCode::Auth) => return ApiError::Auth(message),
        Some(ErrorCode::Forbidden) => return ApiError::Forbidden(message),
        Some(ErrorCode::NotFound) => return ApiError::NotFound(message),
        Some(ErrorCode::Conflict) => return ApiError::Conflict(message),
        Some(ErrorCode::InvalidState) => return ApiError::InvalidState(message),
        None => {}
    }

    match status {
        400 | 422 => classify_bad_request(message),
        401 => ApiError::Auth(message),
        403 => ApiError::Forbidden(message),
        404 => ApiError::NotFound(message),
        409 => ApiError::Conflict(message),
        _ => ApiError::Unexpected { status, message },
    }
}

/// Plain `{ detail }` backends answer 400 for state collisions as well as
/// malformed input. Recover the class from the known phrasings so those
/// deployments keep the conflict and stale-state distinctions.
fn classify_bad_request(message: String) -> ApiError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("already have an active ride request")
        || lower.contains("already registered")
        || lower.contains("already been reviewed")
    {
        ApiError::Conflict(message)
    } else if lower.contains("no longer pending") {
        ApiError::InvalidState(message)
    } else {
        ApiError::Validation(message)
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
