use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use shielded_pool::PoolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("internal error")]
    Internal,
}

impl From<PoolError> for ApiError {
    fn from(e: PoolError) -> Self {
        let msg = e.to_string();
        match e {
            PoolError::MalformedPublicInputs(_)
            | PoolError::InvalidAmount(_)
            | PoolError::UnsupportedToken(_)
            | PoolError::Config(_) => ApiError::BadRequest(msg),
            PoolError::Unauthorized(_) => ApiError::Forbidden(msg),
            PoolError::UnknownWithdrawal(_) => ApiError::NotFound(msg),
            PoolError::NullifierAlreadySpent(_)
            | PoolError::CommitmentAlreadyCollected(_)
            | PoolError::RootMismatch { .. }
            | PoolError::CapacityExceeded { .. }
            | PoolError::WithdrawalExpired { .. }
            | PoolError::WithdrawalNotExpired { .. } => ApiError::Conflict(msg),
            PoolError::InvalidProof(_) | PoolError::TokenTransferFailed(_) | PoolError::Message(_) => {
                ApiError::Unprocessable(msg)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };

        (status, Json(ErrorBody { error: msg })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;
    use shielded_pool::verifier::VerifierFamily;
    use shielded_pool::Address;

    fn status(e: PoolError) -> StatusCode {
        ApiError::from(e).into_response().status()
    }

    #[test]
    fn pool_errors_map_to_statuses() {
        assert_eq!(status(PoolError::InvalidProof(VerifierFamily::Hash2)), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(PoolError::NullifierAlreadySpent(Fr::from(1u64))), StatusCode::CONFLICT);
        assert_eq!(status(PoolError::CommitmentAlreadyCollected(Fr::from(1u64))), StatusCode::CONFLICT);
        assert_eq!(status(PoolError::UnknownWithdrawal(Fr::from(1u64))), StatusCode::NOT_FOUND);
        assert_eq!(status(PoolError::Unauthorized(Address::ZERO)), StatusCode::FORBIDDEN);
        assert_eq!(status(PoolError::InvalidAmount("zero".into())), StatusCode::BAD_REQUEST);
    }
}
