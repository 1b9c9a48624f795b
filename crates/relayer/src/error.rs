use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use ghostpool_protocol::ProtocolError;

pub type Result<T> = std::result::Result<T, RelayerError>;

#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("state store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for RelayerError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayerError::Protocol(e) => match e {
                ProtocolError::InvalidInput(_)
                | ProtocolError::CapacityExceeded(_)
                | ProtocolError::InsufficientBalance { .. }
                | ProtocolError::AmountInvariantViolated { .. } => StatusCode::BAD_REQUEST,
                ProtocolError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                ProtocolError::AlreadySpent
                | ProtocolError::DuplicateSubmission
                | ProtocolError::StaleOrMismatchedState { .. }
                | ProtocolError::UnknownRoot => StatusCode::CONFLICT,
                ProtocolError::ProofRejected => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            RelayerError::Store(_) | RelayerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_map_to_status_codes() {
        let conflict: RelayerError = ProtocolError::AlreadySpent.into();
        assert_eq!(
            conflict.into_response().status(),
            StatusCode::CONFLICT
        );

        let rejected: RelayerError = ProtocolError::ProofRejected.into();
        assert_eq!(
            rejected.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let unauthorized: RelayerError = ProtocolError::Unauthorized("nope").into();
        assert_eq!(
            unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );

        let bad = RelayerError::InvalidRequest("missing field".into());
        assert_eq!(bad.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
