use actix_web::error::{JsonPayloadError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};

use crate::api::ErrorDetail;
use crate::catalog_repository::CatalogRepositoryError;
use crate::serialization::ValidationErrors;

pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";
pub const NOT_AUTHENTICATED: &str = "Authentication credentials were not provided.";
pub const INVALID_IDENTITY: &str = "Invalid identity.";
pub const NOT_FOUND: &str = "Not found.";
pub const SERVER_ERROR: &str = "A server error occurred.";
pub const UNSUPPORTED_MEDIA_TYPE: &str = "Unsupported media type in request.";

/// Errors surfaced to API callers
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Validation failed, {0}")]
    Validation(ValidationErrors),

    #[error("Malformed request {0}")]
    MalformedRequest(String),

    #[error("Unsupported media type")]
    UnsupportedMediaType,

    #[error("Request body too large {0}")]
    PayloadTooLarge(String),

    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Unknown identity")]
    InvalidIdentity,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Resource not found")]
    NotFound,

    #[error("Internal failure {0}")]
    Internal(CatalogRepositoryError),
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

/// Missing records become 404, the rest of repository failures stay internal
impl From<CatalogRepositoryError> for ApiError {
    fn from(err: CatalogRepositoryError) -> Self {
        match err {
            CatalogRepositoryError::BookNotFound(_) | CatalogRepositoryError::UserNotFound(_) => {
                ApiError::NotFound
            }
            CatalogRepositoryError::DuplicateUsername(_) => {
                let mut errors = ValidationErrors::default();
                errors.add("username", "A user with that username already exists.");
                ApiError::Validation(errors)
            }
            other => ApiError::Internal(other),
        }
    }
}

impl From<JsonPayloadError> for ApiError {
    fn from(err: JsonPayloadError) -> Self {
        match err {
            JsonPayloadError::Deserialize(err) if err.is_data() => ApiError::Validation(
                ValidationErrors::from_deserialize_message(&err.to_string()),
            ),
            JsonPayloadError::Deserialize(err) => {
                ApiError::MalformedRequest(format!("JSON parse error - {}", err))
            }
            JsonPayloadError::ContentType => ApiError::UnsupportedMediaType,
            err @ (JsonPayloadError::Overflow { .. }
            | JsonPayloadError::OverflowKnownLength { .. }) => {
                ApiError::PayloadTooLarge(err.to_string())
            }
            other => ApiError::MalformedRequest(other.to_string()),
        }
    }
}

impl From<QueryPayloadError> for ApiError {
    fn from(err: QueryPayloadError) -> Self {
        match err {
            QueryPayloadError::Deserialize(err) => {
                ApiError::Validation(ValidationErrors::from_deserialize_message(&err.to_string()))
            }
            other => ApiError::MalformedRequest(other.to_string()),
        }
    }
}

/// Registered as the `JsonConfig` error handler so body errors are JSON too
pub fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::debug!("Rejected body of {} {}", req.method(), req.path());
    ApiError::from(err).into()
}

/// Registered as the `QueryConfig` error handler so query errors are JSON too
pub fn query_error_handler(err: QueryPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::debug!("Rejected query of {} {}", req.method(), req.path());
    ApiError::from(err).into()
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotAuthenticated | ApiError::InvalidIdentity => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let detail = match self {
            ApiError::Validation(errors) => {
                return HttpResponse::build(self.status_code()).json(errors)
            }
            ApiError::MalformedRequest(message) | ApiError::PayloadTooLarge(message) => {
                message.as_str()
            }
            ApiError::UnsupportedMediaType => UNSUPPORTED_MEDIA_TYPE,
            ApiError::NotAuthenticated => NOT_AUTHENTICATED,
            ApiError::InvalidIdentity => INVALID_IDENTITY,
            ApiError::PermissionDenied => PERMISSION_DENIED,
            ApiError::NotFound => NOT_FOUND,
            ApiError::Internal(err) => {
                tracing::error!("Request failed {}", err);
                SERVER_ERROR
            }
        };
        HttpResponse::build(self.status_code()).json(ErrorDetail {
            detail: detail.to_string(),
        })
    }
}
