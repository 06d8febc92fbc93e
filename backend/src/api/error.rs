//! HTTP Error Mapping
//!
//! Converts core errors into status codes and a `{"detail", "kind"}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tracing::error;

use crate::core::CoreError;

/// Error body returned by every failing route
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub kind: &'static str,
}

/// Route-level error wrapper
#[derive(Debug)]
pub struct ApiError(pub CoreError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

/// Status code for a core error
pub fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::ProjectNotFound(_)
        | CoreError::SceneNotFound(_)
        | CoreError::AssetNotFound(_)
        | CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::PreconditionFailed(_)
        | CoreError::ValidationError(_)
        | CoreError::UnknownProvider(_) => StatusCode::BAD_REQUEST,
        CoreError::PathOutsideRoot(_) => StatusCode::FORBIDDEN,
        CoreError::ProviderUnavailable(_) | CoreError::NotSupported(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CoreError::ContentRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::QuotaExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
        CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CoreError::TransientNetwork(_)
        | CoreError::ProviderFailed(_)
        | CoreError::MaterializationFailed(_) => StatusCode::BAD_GATEWAY,
        CoreError::Storage(_)
        | CoreError::IoError(_)
        | CoreError::JsonError(_)
        | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() && !self.0.is_provider_error() {
            error!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            detail: self.0.to_string(),
            kind: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CoreError::ProjectNotFound("p".into()), 404),
            (CoreError::PreconditionFailed("no scenes".into()), 400),
            (CoreError::UnknownProvider("midjourney".into()), 400),
            (CoreError::ProviderUnavailable("no key".into()), 503),
            (CoreError::NotSupported("too long".into()), 503),
            (CoreError::ContentRejected("nsfw".into()), 422),
            (CoreError::QuotaExhausted("credits".into()), 429),
            (CoreError::Timeout("poll".into()), 504),
            (CoreError::ProviderFailed("boom".into()), 502),
            (CoreError::PathOutsideRoot("../x".into()), 403),
            (CoreError::Internal("oops".into()), 500),
        ];
        for (err, code) in cases {
            assert_eq!(status_for(&err).as_u16(), code, "{:?}", err);
        }
    }

    #[test]
    fn test_response_carries_kind() {
        let response = ApiError(CoreError::QuotaExhausted("credits".into())).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
