// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP mapping of engine errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use docforge_core::error::{ErrorKind, ForgeError};
use docforge_core::human_errors::humanize_error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Forge(#[from] ForgeError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forge(err) => match err.kind() {
                ErrorKind::DocumentNotFound | ErrorKind::JobNotFound => StatusCode::NOT_FOUND,
                ErrorKind::DocumentBusy => StatusCode::CONFLICT,
                ErrorKind::InvalidPattern
                | ErrorKind::InvalidSettings
                | ErrorKind::PageIndexOutOfRange => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::CorruptDocument
                | ErrorKind::Unrepairable
                | ErrorKind::IncompleteRedaction => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::OcrUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::Cancelled => StatusCode::CONFLICT,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::InvalidRequest(msg) => json!({
                "error": msg,
                "kind": "invalidRequest",
                "status": status.as_u16(),
            }),
            ApiError::Forge(err) if err.kind() == ErrorKind::Internal => {
                tracing::error!(error = %err, "internal error");
                json!({
                    "error": "internal error",
                    "kind": ErrorKind::Internal,
                    "status": status.as_u16(),
                })
            }
            ApiError::Forge(err) => {
                let human = humanize_error(err);
                json!({
                    "error": err.to_string(),
                    "kind": err.kind(),
                    "message": human.message,
                    "suggestion": human.suggestion,
                    "retriable": human.retriable,
                    "status": status.as_u16(),
                })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docforge_core::types::DocumentId;

    #[test]
    fn busy_documents_conflict() {
        let err = ApiError::from(ForgeError::DocumentBusy(DocumentId::new()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_settings_are_unprocessable() {
        let err = ApiError::from(ForgeError::InvalidSettings("bad".into()));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn storage_failures_are_internal() {
        let err = ApiError::from(ForgeError::Database("disk full".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
