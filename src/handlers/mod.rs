pub mod activities;
pub mod auth;
pub mod content;
pub mod forum;
pub mod health;
pub mod mood;
pub mod surveys;

use crate::error::AppError;

/// A body passed validation but could not be converted into a record.
pub(crate) fn incomplete_body() -> AppError {
    AppError::validation("body", "Request body is incomplete")
}
