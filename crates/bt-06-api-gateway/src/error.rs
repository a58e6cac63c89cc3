//! Wire error record and HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bt_02_order_store::StoreError;
use bt_03_negotiation::NegotiationError;
use serde::{Deserialize, Serialize};
use shared_types::ErrorKind;
use thiserror::Error;

/// The error record every failed call returns.
#[derive(Clone, Debug, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ApiError {
    /// One of the eight error kinds.
    pub kind: ErrorKind,
    /// Human-readable diagnostic.
    pub message: String,
}

impl ApiError {
    /// Build an error record.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Missing or expired session.
    #[must_use]
    pub fn auth() -> Self {
        Self::new(ErrorKind::Auth, "missing or expired session token")
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Precondition => StatusCode::CONFLICT,
            ErrorKind::Crypto => StatusCode::BAD_REQUEST,
            ErrorKind::Transport | ErrorKind::Chain => StatusCode::BAD_GATEWAY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<NegotiationError> for ApiError {
    fn from(e: NegotiationError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}
