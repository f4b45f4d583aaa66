use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use ledger::LedgerError;
use serde_json::json;
use tracing::error;
use validator::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Admin access required")]
    Forbidden,
    #[error("{0}")]
    Internal(String),
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        ApiError::Validation(messages.join(", "))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Ledger(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Ledger(e) => match e {
                LedgerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                LedgerError::DepositRequired => StatusCode::FORBIDDEN,
                LedgerError::UserNotFound
                | LedgerError::DepositNotFound
                | LedgerError::WithdrawalNotFound => StatusCode::NOT_FOUND,
                LedgerError::EmailInUse | LedgerError::InvalidTransition { .. } => {
                    StatusCode::CONFLICT
                }
                LedgerError::Database(_) | LedgerError::PasswordHash(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::BAD_REQUEST,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Ledger(LedgerError::Database(e)) => {
                error!("Storage failure: {:?}", e);
                "Internal server error".to_string()
            }
            ApiError::Ledger(LedgerError::PasswordHash(detail)) | ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": message,
        }))
    }
}
