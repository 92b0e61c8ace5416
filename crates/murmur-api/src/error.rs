use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use murmur_db::StoreError;
use murmur_types::api::{ErrorBody, FieldError, parse_id};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    InvalidArgument {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        let errors = match self {
            ApiError::InvalidArgument { errors, .. } if !errors.is_empty() => Some(errors),
            _ => None,
        };
        (status, Json(ErrorBody { message, errors })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidArgument { field, message } => ApiError::InvalidArgument {
                message: message.clone(),
                errors: vec![FieldError { field, message }],
            },
            StoreError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            StoreError::Forbidden(reason) => ApiError::Forbidden(reason.to_string()),
            other => {
                error!("store failure: {}", other);
                ApiError::Internal
            }
        }
    }
}

impl From<Vec<FieldError>> for ApiError {
    fn from(errors: Vec<FieldError>) -> Self {
        ApiError::InvalidArgument {
            message: "Validation error".to_string(),
            errors,
        }
    }
}

impl From<FieldError> for ApiError {
    fn from(e: FieldError) -> Self {
        ApiError::InvalidArgument {
            message: e.message.clone(),
            errors: vec![e],
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::InvalidArgument {
            message: e.body_text(),
            errors: vec![],
        }
    }
}

/// Parse an identifier taken from the URL path.
pub fn path_id(field: &str, raw: &str) -> ApiResult<Uuid> {
    Ok(parse_id(field, Some(raw))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_http_statuses() {
        let cases = [
            (StoreError::invalid("text", "text is required"), StatusCode::BAD_REQUEST),
            (StoreError::NotFound("message"), StatusCode::NOT_FOUND),
            (StoreError::Forbidden("nope"), StatusCode::FORBIDDEN),
            (StoreError::LockPoisoned, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (store, status) in cases {
            assert_eq!(ApiError::from(store).status_code(), status);
        }
    }

    #[test]
    fn invalid_argument_carries_field_detail() {
        match ApiError::from(StoreError::invalid("to", "recipient is wrong")) {
            ApiError::InvalidArgument { message, errors } => {
                assert_eq!(message, "recipient is wrong");
                assert_eq!(errors, vec![FieldError::new("to", "recipient is wrong")]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn path_ids_must_be_uuids() {
        assert!(path_id("conversationId", "abc").is_err());
        let id = Uuid::new_v4();
        assert_eq!(path_id("conversationId", &id.to_string()).unwrap(), id);
    }
}
