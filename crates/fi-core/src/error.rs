//! # AppError
//!
//! Centralized error handling for the FoundIt ecosystem.
//! Maps domain-specific failures to actionable error types.

use serde::Serialize;
use thiserror::Error;

/// The primary error type surfaced by the request layer.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Post, User)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., missing field, too many images)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Caller is not logged in or gave a bad credential
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is logged in but may not touch the resource
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Infrastructure failure (e.g., DB down, disk full)
    #[error("internal service error: {0}")]
    Internal(String),

    /// Transient storage failure; the caller may retry
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Resource already exists or is already in the requested state
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Why a delete request was turned down. None of these change any state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteRejection {
    #[error("post not found")]
    NotFound,

    #[error("not allowed")]
    NotOwner,

    #[error("password incorrect")]
    InvalidCredential,

    #[error("deletion already in progress")]
    AlreadyPending,
}

/// Failure of `request_delete`.
#[derive(Error, Debug)]
pub enum DeleteError {
    #[error(transparent)]
    Rejected(#[from] DeleteRejection),

    /// Storage failed during the transition. Nothing was changed.
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// A backing image file could not be removed. Purges log and carry on.
#[derive(Error, Debug)]
#[error("failed to delete image file '{filename}': {source}")]
pub struct FileDeleteFailure {
    pub filename: String,
    #[source]
    pub source: std::io::Error,
}

impl From<DeleteError> for AppError {
    fn from(err: DeleteError) -> Self {
        match err {
            DeleteError::Rejected(DeleteRejection::NotFound) => {
                AppError::NotFound("Post".into(), "requested".into())
            }
            DeleteError::Rejected(DeleteRejection::NotOwner) => {
                AppError::Forbidden("Not allowed.".into())
            }
            DeleteError::Rejected(DeleteRejection::InvalidCredential) => {
                AppError::Unauthorized("Password incorrect.".into())
            }
            DeleteError::Rejected(DeleteRejection::AlreadyPending) => {
                AppError::Conflict("Deletion already in progress.".into())
            }
            DeleteError::Storage(e) => AppError::Unavailable(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
