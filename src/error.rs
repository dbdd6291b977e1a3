//! Unified application error model and mapping helpers.
//! This module provides the common error enum used by the identity components
//! and the HTTP handlers, along with the mapping to response statuses.
//!
//! The taxonomy deliberately collapses all invalid-token causes into one
//! externally visible `Auth` failure, and surfaces ownership denial as
//! `NotFound` so unauthorized callers cannot confirm a resource exists.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Payload validation failures (400).
    UserInput { code: String, message: String },
    /// First-contact login failure: unknown user or wrong password (400).
    Credentials { code: String, message: String },
    /// Missing, expired, malformed or forged session token (403).
    Auth { code: String, message: String },
    /// Resource absent, or present but not owned by the caller (404).
    NotFound { code: String, message: String },
    /// Duplicate unique key on create (409).
    Conflict { code: String, message: String },
    /// Store or serialization failure (500).
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Credentials { code, .. }
            | AppError::Auth { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Credentials { message, .. }
            | AppError::Auth { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Canonical login failure. The message never says whether the user exists.
    pub fn invalid_credentials() -> Self {
        AppError::Credentials { code: "invalid_credentials".into(), message: "user not exist or invalid credentials".into() }
    }

    /// Canonical protected-call failure. The cause (absent, expired, forged,
    /// malformed) is intentionally not part of the message.
    pub fn unauthenticated() -> Self {
        AppError::Auth { code: "unauthenticated".into(), message: "authentication required".into() }
    }

    /// Canonical absent-or-not-owned resource failure.
    pub fn object_not_found() -> Self {
        AppError::not_found("not_found", "Object not found")
    }

    /// Render as the standard `{status, code, message, data}` response envelope.
    pub fn to_envelope(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "Error",
            "code": self.http_status(),
            "message": self.message(),
            "data": serde_json::Value::Null,
        })
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Credentials { .. } => 400,
            AppError::Auth { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Internal { .. } => 500,
        }
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
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::invalid_credentials().http_status(), 400);
        assert_eq!(AppError::unauthenticated().http_status(), 403);
        assert_eq!(AppError::object_not_found().http_status(), 404);
        assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn credential_and_session_failures_are_distinct_classes() {
        // login failures are 400-class, stale-session failures 403-class
        assert_ne!(AppError::invalid_credentials().http_status(), AppError::unauthenticated().http_status());
    }
}
