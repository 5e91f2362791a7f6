use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::render::redirect;

const NOT_FOUND_PAGE: &str = include_str!("../templates/404.html");

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("not found")]
    NotFound,
    /// The viewer may not see this page; the flash has already been set.
    #[error("unauthorized")]
    Unauthorized,
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        match self {
            ViewError::NotFound => (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response(),
            ViewError::Unauthorized => redirect("/"),
            other => {
                error!("{}", other);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Turns a missing row into a 404.
pub trait OrNotFound<T> {
    fn or_not_found(self) -> Result<T, ViewError>;
}

impl<T> OrNotFound<T> for anyhow::Result<Option<T>> {
    fn or_not_found(self) -> Result<T, ViewError> {
        self?.ok_or(ViewError::NotFound)
    }
}
