//! Model-level error types.

use thiserror::Error;

use crate::status::SessionStatus;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Invalid slideshow options: {0}")]
    InvalidOptions(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),
}

impl ModelError {
    pub fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(msg.into())
    }

    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource(msg.into())
    }
}
