//! Request-scoped failures.
//!
//! Every variant maps to one status code. A failure only ever affects the
//! request that raised it; the drive cache is left as it was.

use std::time::Duration;

use thiserror::Error;

use crate::http::response::{Response, StatusCode};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// Reading a management key that was never created
    #[error("{0}")]
    PreconditionFailed(String),

    #[error("drive did not open within {0:?}")]
    Timeout(Duration),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FetchResult<T> = Result<T, FetchError>;

impl FetchError {
    pub fn not_found() -> Self {
        FetchError::NotFound("Not Found".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            FetchError::NotFound(_) => StatusCode::NotFound,
            FetchError::BadRequest(_) | FetchError::PreconditionFailed(_) => StatusCode::BadRequest,
            FetchError::Timeout(_) => StatusCode::GatewayTimeout,
            FetchError::Storage(_) | FetchError::Io(_) => StatusCode::InternalServerError,
        }
    }

    pub fn into_response(self) -> Response {
        Response::text(self.status(), self.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Storage(e.into())
    }
}
