use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::{auth::AuthError, rooms::RelayError, store::StoreError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<RelayError>() {
            return match err {
                RelayError::InvalidMessage => StatusCode::BAD_REQUEST,
                RelayError::Forbidden(_) => StatusCode::FORBIDDEN,
                RelayError::InvalidState { .. } | RelayError::SessionClosed(_) => StatusCode::CONFLICT,
                RelayError::RoomNotFound(_) | RelayError::RecordNotFound(_) => StatusCode::NOT_FOUND,
                RelayError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            };
        }
        if let Some(err) = self.0.downcast_ref::<StoreError>() {
            return match err {
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            };
        }
        if self.0.downcast_ref::<AuthError>().is_some() {
            return StatusCode::UNAUTHORIZED;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self.0, %status, "request failed");
        }
        (status, Json(json!({ "message": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use crate::rooms::Lifecycle;

    use super::*;

    #[test]
    fn relay_errors_map_to_statuses() {
        let cases = [
            (RelayError::InvalidMessage, StatusCode::BAD_REQUEST),
            (RelayError::Forbidden("agents only"), StatusCode::FORBIDDEN),
            (RelayError::SessionClosed(Lifecycle::Closed), StatusCode::CONFLICT),
            (RelayError::RecordNotFound("u1".into()), StatusCode::NOT_FOUND),
            (
                RelayError::StoreUnavailable(StoreError::Database(sqlx::Error::PoolClosed)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn store_and_auth_errors_map_to_statuses() {
        assert_eq!(AppError::from(StoreError::NotFound("555".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(AuthError::Unauthorized).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::from(anyhow::anyhow!("boom")).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn response_carries_status() {
        let response = AppError::from(RelayError::InvalidMessage).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
