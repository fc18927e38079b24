use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Errors raised while talking to the acquirer.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Acquirer returned HTTP {status}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Malformed acquirer response: {message}")]
    MalformedResponse { message: String },
}

impl PaymentError {
    /// Transient failures are "try the next candidate" outcomes during a
    /// reconciliation search.
    pub fn is_transient(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::Timeout { .. } => true,
            PaymentError::UpstreamStatus { .. } => true,
            PaymentError::MalformedResponse { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::NetworkError { .. } => 503,
            PaymentError::Timeout { .. } => 504,
            PaymentError::UpstreamStatus { .. } => 502,
            PaymentError::MalformedResponse { .. } => 400,
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        let kind = match &err {
            PaymentError::ValidationError { message, field } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.clone().unwrap_or_else(|| "request".to_string()),
                    reason: message.clone(),
                })
            }
            PaymentError::MalformedResponse { message } => {
                AppErrorKind::External(ExternalError::MalformedUpstream {
                    message: message.clone(),
                })
            }
            _ => AppErrorKind::External(ExternalError::Transient {
                message: err.to_string(),
            }),
        };
        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_http_status_mapping_is_correct() {
        assert_eq!(
            PaymentError::MalformedResponse {
                message: "missing _embedded".to_string(),
            }
            .http_status_code(),
            400
        );
        assert_eq!(PaymentError::Timeout { timeout_secs: 10 }.http_status_code(), 504);
    }

    #[test]
    fn transient_flags_are_set() {
        assert!(PaymentError::Timeout { timeout_secs: 10 }.is_transient());
        assert!(PaymentError::UpstreamStatus {
            status: 404,
            body: String::new()
        }
        .is_transient());
        assert!(!PaymentError::MalformedResponse {
            message: "bad".to_string()
        }
        .is_transient());
    }
}
