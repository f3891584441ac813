//! Request-level error taxonomy and its HTTP mapping.

use std::sync::OnceLock;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::token::TokenError;

static EXPOSE_DETAIL: OnceLock<bool> = OnceLock::new();

/// Allow the error chain of 5xx responses into the body. Only the first call
/// takes effect; later calls are ignored.
pub fn expose_error_detail(enabled: bool) {
    let _ = EXPOSE_DETAIL.set(enabled);
}

fn detail_exposed() -> bool {
    EXPOSE_DETAIL.get().copied().unwrap_or(false)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authorization header is required")]
    Unauthenticated,

    #[error("Invalid token format")]
    MalformedCredential,

    #[error("Invalid prefix")]
    UnsupportedPrefix,

    #[error("Invalid token")]
    InvalidToken(#[from] TokenError),

    #[error("User not found")]
    PrincipalNotFound,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Email already exists")]
    DuplicateEmail,

    #[error("This account uses a different sign-in provider")]
    ProviderMismatch,

    #[error("Invalid password")]
    InvalidCredentials,

    #[error("Email is not verified by the identity provider")]
    EmailNotVerified,

    #[error("User not found or already confirmed")]
    AlreadyConfirmedOrMissing,

    #[error("Email does not exist or not verified")]
    NotFoundOrUnverified,

    #[error("Validation failed")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Resource already exists")]
    Conflict,

    #[error("Upstream service failed")]
    DependencyFailure(anyhow::Error),

    #[error("Internal Server Error")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Classify a store failure. Unique-key violations become `Conflict`,
    /// anything else is the store failing us.
    pub fn store(err: anyhow::Error) -> Self {
        if saraha_db::is_unique_violation(&err) {
            Self::Conflict
        } else {
            Self::DependencyFailure(err)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::InvalidToken(_) | Self::TokenRevoked => {
                StatusCode::UNAUTHORIZED
            }
            Self::MalformedCredential
            | Self::UnsupportedPrefix
            | Self::DuplicateEmail
            | Self::ProviderMismatch
            | Self::InvalidCredentials
            | Self::EmailNotVerified
            | Self::Validation(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PrincipalNotFound
            | Self::AlreadyConfirmedOrMissing
            | Self::NotFoundOrUnverified
            | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict => StatusCode::CONFLICT,
            Self::DependencyFailure(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| FieldError {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field)),
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let detail = match &self {
            Self::Internal(err) | Self::DependencyFailure(err) => {
                error!("{}: {:#}", self, err);
                detail_exposed().then(|| format!("{:#}", err))
            }
            _ => None,
        };

        let errors = match &self {
            Self::Validation(errs) => field_errors(errs),
            _ => Vec::new(),
        };

        let body = ErrorBody {
            message: self.to_string(),
            success: false,
            errors,
            detail,
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
