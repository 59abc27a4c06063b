use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use super::access::AccessError;
use super::engine::ClearanceError;
use super::registry::RegistryError;
use super::repository::RepositoryError;
use super::signature::{SignatureError, UploadError};
use super::stats::ExportError;

/// Uniform `{success, message, data?}` body returned by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data,
        }
    }

    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    Envelope::ok(message, data).into_response_with(StatusCode::OK)
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    Envelope::ok(message, data).into_response_with(StatusCode::CREATED)
}

/// Failure response: an HTTP status plus the envelope message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn not_configured(feature: &str) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("{feature} is not configured"),
        )
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "success": false, "message": self.message }));
        (self.status, body).into_response()
    }
}

fn repository_status(error: &RepositoryError) -> StatusCode {
    match error {
        RepositoryError::Conflict | RepositoryError::VersionMismatch { .. } => StatusCode::CONFLICT,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        Self::new(repository_status(&error), error.to_string())
    }
}

impl From<ClearanceError> for ApiError {
    fn from(error: ClearanceError) -> Self {
        let status = match &error {
            ClearanceError::Validation(_) => StatusCode::BAD_REQUEST,
            ClearanceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ClearanceError::InvalidState { .. }
            | ClearanceError::AlreadySubmitted(_)
            | ClearanceError::Conflict(_) => StatusCode::CONFLICT,
            ClearanceError::SignatureMissing(_)
            | ClearanceError::NotReady(_)
            | ClearanceError::SignatureSuperseded(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ClearanceError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
            ClearanceError::Registry(RegistryError::Duplicate(_)) => StatusCode::CONFLICT,
            ClearanceError::Registry(
                RegistryError::MissingField { .. } | RegistryError::InvalidId(_),
            ) => {
                StatusCode::BAD_REQUEST
            }
            ClearanceError::Repository(inner) => repository_status(inner),
        };
        Self::new(status, error.to_string())
    }
}

impl From<SignatureError> for ApiError {
    fn from(error: SignatureError) -> Self {
        let status = match &error {
            SignatureError::Validation(_) => StatusCode::BAD_REQUEST,
            SignatureError::Upload(UploadError::UnsupportedType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            SignatureError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            SignatureError::Upload(_) => StatusCode::BAD_REQUEST,
            SignatureError::NotFound(_) | SignatureError::UnknownDepartment(_) => {
                StatusCode::NOT_FOUND
            }
            SignatureError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            SignatureError::Provider(_) => StatusCode::BAD_GATEWAY,
            SignatureError::Repository(inner) => repository_status(inner),
        };
        Self::new(status, error.to_string())
    }
}

impl From<AccessError> for ApiError {
    fn from(error: AccessError) -> Self {
        let status = match &error {
            AccessError::NotFound => StatusCode::NOT_FOUND,
            AccessError::Expired(_) => StatusCode::GONE,
            AccessError::Repository(inner) => repository_status(inner),
        };
        Self::new(status, error.to_string())
    }
}

impl From<ExportError> for ApiError {
    fn from(error: ExportError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::clearance::domain::{ClearanceItemId, ClearanceStatus, DepartmentId};

    #[test]
    fn clearance_errors_map_to_statuses() {
        let cases = [
            (
                ClearanceError::Validation("studentIds".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ClearanceError::InvalidState {
                    item_id: ClearanceItemId("clr-1-library".to_string()),
                    status: ClearanceStatus::Approved,
                },
                StatusCode::CONFLICT,
            ),
            (
                ClearanceError::SignatureMissing(DepartmentId("library".to_string())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ClearanceError::Repository(RepositoryError::Unavailable("down".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status, expected);
        }
    }

    #[test]
    fn upload_errors_map_to_media_statuses() {
        let unsupported = SignatureError::Upload(UploadError::UnsupportedType("text/plain".into()));
        assert_eq!(
            ApiError::from(unsupported).status,
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        let too_large = SignatureError::Upload(UploadError::TooLarge { size: 10, limit: 5 });
        assert_eq!(ApiError::from(too_large).status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn expired_links_are_gone() {
        let error = AccessError::Expired(chrono::Utc::now());
        assert_eq!(ApiError::from(error).status, StatusCode::GONE);
    }
}
