use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use metget_core::MetGetError;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

/// `metget-api` is the only component that converts [`MetGetError`] into an
/// HTTP response (spec §7); workers and downloaders fold it into a
/// `Request.message` blob or a log line instead.
impl IntoResponse for MetGetError {
    fn into_response(self) -> Response {
        let status = match &self {
            MetGetError::Validation(_) => StatusCode::BAD_REQUEST,
            MetGetError::Auth(_) => StatusCode::UNAUTHORIZED,
            MetGetError::Forbidden(_) => StatusCode::FORBIDDEN,
            MetGetError::CreditDenied => StatusCode::PAYMENT_REQUIRED,
            MetGetError::NotFound(_) => StatusCode::NOT_FOUND,
            MetGetError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            MetGetError::CoverageGap(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MetGetError::IntegrityConflict(_) => StatusCode::CONFLICT,
            MetGetError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MetGetError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error serving request");
        }

        (status, axum::Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Spec §6: `/build` documents 401 for auth and 403 for permission,
    /// distinct status codes for distinct failure kinds.
    #[test]
    fn auth_and_forbidden_map_to_distinct_status_codes() {
        let auth_status = MetGetError::Auth("unknown api key".into()).into_response().status();
        let forbidden_status = MetGetError::Forbidden("service not permitted".into())
            .into_response()
            .status();
        assert_eq!(auth_status, StatusCode::UNAUTHORIZED);
        assert_eq!(forbidden_status, StatusCode::FORBIDDEN);
    }
}
