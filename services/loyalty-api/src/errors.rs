use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoyaltyApiError>;

#[derive(Error, Debug)]
pub enum LoyaltyApiError {
    #[error(transparent)]
    Ledger(#[from] loyalty_core::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for LoyaltyApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        LoyaltyApiError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for LoyaltyApiError {
    fn from(err: serde_json::Error) -> Self {
        LoyaltyApiError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl ResponseError for LoyaltyApiError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        use loyalty_core::Error as Ledger;

        match self {
            LoyaltyApiError::Ledger(e) => match e {
                Ledger::Validation(_) | Ledger::InvalidAmount(_) => StatusCode::BAD_REQUEST,
                Ledger::UserNotFound(_) => StatusCode::NOT_FOUND,
                Ledger::Conflict(_) => StatusCode::CONFLICT,
                Ledger::ProofTargetNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Ledger::VotingPowerUnavailable(_) => StatusCode::BAD_GATEWAY,
                Ledger::External(_)
                | Ledger::Concurrency(_)
                | Ledger::Config(_)
                | Ledger::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            LoyaltyApiError::Validation(_) => StatusCode::BAD_REQUEST,
            LoyaltyApiError::Redis(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LoyaltyApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl LoyaltyApiError {
    fn error_type(&self) -> &str {
        match self {
            LoyaltyApiError::Ledger(e) => e.kind(),
            LoyaltyApiError::Validation(_) => "validation_error",
            LoyaltyApiError::Redis(_) => "cache_error",
            LoyaltyApiError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_core::Error as Ledger;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Ledger::Validation("x".into()), 400),
            (Ledger::InvalidAmount("x".into()), 400),
            (Ledger::UserNotFound("x".into()), 404),
            (Ledger::Conflict("x".into()), 409),
            (Ledger::ProofTargetNotFound("x".into()), 422),
            (Ledger::VotingPowerUnavailable("x".into()), 502),
            (Ledger::Concurrency("x".into()), 500),
        ];

        for (err, status) in cases {
            assert_eq!(LoyaltyApiError::from(err).status_code().as_u16(), status);
        }
    }

    #[test]
    fn test_error_type_uses_ledger_kind() {
        let err = LoyaltyApiError::from(Ledger::Conflict("dup".into()));
        assert_eq!(err.error_type(), "conflict");
        assert_eq!(
            LoyaltyApiError::Validation("bad".into()).error_type(),
            "validation_error"
        );
    }
}
