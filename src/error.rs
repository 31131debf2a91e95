//! Unified error model for the admin surface.
//! Every failure here is recoverable from the page's point of view: the viewer stays
//! unauthenticated and sees a dismissible message. Kinds map onto that taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::identity::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Auth { code: String, message: String },
    Link { code: String, message: String },
    Conflict { code: String, message: String },
    Storage { code: String, message: String },
    Config { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Link { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Storage { code, .. }
            | AppError::Config { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Link { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Storage { message, .. }
            | AppError::Config { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn auth<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn link<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Link { code: code.into(), message: msg.into() } }
    pub fn conflict<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn storage<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Storage { code: code.into(), message: msg.into() } }
    pub fn config<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Config { code: code.into(), message: msg.into() } }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Whether the failure can be retried from the same modal without reloading.
    /// Configuration errors are the only kind that needs operator action.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::Config { .. } | AppError::Internal { .. })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        let code = err.code().to_string();
        match err {
            ProviderError::InvalidLink | ProviderError::ExpiredLink | ProviderError::EmailMismatch => {
                AppError::Link { code, message: err.to_string() }
            }
            ProviderError::InvalidEmail(_) => AppError::UserInput { code, message: err.to_string() },
            _ => AppError::Auth { code, message: err.to_string() },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
