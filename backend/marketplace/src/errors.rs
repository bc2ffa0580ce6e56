//! Application-wide error types.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use equinex_ledger::{ErrorKind, LedgerError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown transaction {0}")]
    UnknownTransaction(String),

    #[error("A fetch of {0} is already in progress")]
    FetchInProgress(String),

    #[error("Evidence store error: {0}")]
    Evidence(String),

    #[error("Invalid amount: {0}")]
    Amount(String),

    #[error("Invalid metadata: {0}")]
    Metadata(String),

    #[error("Missing actor identity")]
    MissingActor,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ledger(e) => e.kind(),
            Self::Timeout { .. }
            | Self::Unavailable(_)
            | Self::Evidence(_)
            | Self::Database(_)
            | Self::Migrate(_)
            | Self::Http(_) => ErrorKind::ExternalUnavailable,
            Self::UnknownTransaction(_) => ErrorKind::NotFound,
            Self::FetchInProgress(_) => ErrorKind::StateConflict,
            Self::Amount(_)
            | Self::Metadata(_)
            | Self::BadRequest(_)
            | Self::Json(_)
            | Self::Config(_) => ErrorKind::Validation,
            Self::MissingActor => ErrorKind::Unauthorized,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn status(&self) -> StatusCode {
        if self.is_timeout() {
            return StatusCode::GATEWAY_TIMEOUT;
        }
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::ExternalUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind().as_str(),
        }));
        (self.status(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
