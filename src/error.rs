use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Errors returned by the snippet and user stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no matching record found")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Errors that escape a handler. Everything except the client variants is
/// logged with full detail and answered with an opaque status page.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("session store failed: {0}")]
    Session(#[from] tower_sessions::session::Error),
    #[error("template rendering failed: {0}")]
    Template(#[from] tera::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, "server error");
        }
        status_page(status)
    }
}

/// Plain-text response carrying only the canonical reason phrase.
pub fn status_page(status: StatusCode) -> Response {
    let body = status.canonical_reason().unwrap_or("Error");
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
