//! Unified error handling for the settlement backend
//!
//! Every failure that reaches an HTTP caller is expressed as an [`AppError`],
//! which carries a status code, a machine-readable [`ErrorCode`], a
//! user-facing message and a retryable flag.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "AUTH_REJECTED")]
    AuthRejected,
    #[serde(rename = "ORIGIN_REJECTED")]
    OriginRejected,
    #[serde(rename = "CALLER_REJECTED")]
    CallerRejected,
    #[serde(rename = "KEY_LOCKED_OUT")]
    KeyLockedOut,
    #[serde(rename = "VERIFICATION_FAILED")]
    VerificationFailed,
    #[serde(rename = "CURRENCY_MISMATCH")]
    CurrencyMismatch,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors
    #[serde(rename = "MALFORMED_UPSTREAM_RESPONSE")]
    MalformedUpstream,
    #[serde(rename = "UPSTREAM_UNAVAILABLE")]
    UpstreamUnavailable,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business errors raised while settling a transaction
#[derive(Debug, Clone)]
pub enum DomainError {
    /// No local transaction in an eligible state
    TransactionNotFound { reference: String },
    /// The acquirer holds no matching payment for any candidate reference
    PaymentNotFound { reference: String },
    /// Transaction key missing or wrong
    AuthRejected,
    /// Webhook sent from an address outside the allowlist
    OriginRejected { origin: String },
    /// Result caller without the configured bearer token
    CallerRejected,
    /// Transaction key rejected after too many failed attempts
    Lockout,
    /// Acquirer payment failed verification
    VerificationFailed { reason: String },
    /// Acquirer settled in a currency other than the configured one
    CurrencyMismatch { expected: String, actual: String },
}

/// Infrastructure-level errors
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

/// Acquirer-side failures
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Response parsed but lacked the expected structure
    MalformedUpstream { message: String },
    /// Network, timeout or non-success status
    Transient { message: String },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    MissingField { field: String },
    InvalidField { field: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn domain(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::PaymentNotFound { .. } => 404,
                DomainError::AuthRejected => 403,
                DomainError::OriginRejected { .. } => 403,
                DomainError::CallerRejected => 403,
                DomainError::Lockout => 403,
                DomainError::VerificationFailed { .. } => 400,
                DomainError::CurrencyMismatch { .. } => 400,
            },
            AppErrorKind::Infrastructure(_) => 500,
            // The result caller sees every acquirer failure as a bad request;
            // only an empty search is reported as not found.
            AppErrorKind::External(_) => 400,
            AppErrorKind::Validation(_) => 400,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
                DomainError::AuthRejected => ErrorCode::AuthRejected,
                DomainError::OriginRejected { .. } => ErrorCode::OriginRejected,
                DomainError::CallerRejected => ErrorCode::CallerRejected,
                DomainError::Lockout => ErrorCode::KeyLockedOut,
                DomainError::VerificationFailed { .. } => ErrorCode::VerificationFailed,
                DomainError::CurrencyMismatch { .. } => ErrorCode::CurrencyMismatch,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::MalformedUpstream { .. } => ErrorCode::MalformedUpstream,
                ExternalError::Transient { .. } => ErrorCode::UpstreamUnavailable,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Message safe to return to the caller
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { reference } => {
                    format!("Transaction {} not found.", reference)
                }
                DomainError::PaymentNotFound { reference } => {
                    format!("No payment found for {}.", reference)
                }
                DomainError::AuthRejected => "Invalid transaction key.".to_string(),
                DomainError::OriginRejected { .. } => {
                    "Requests from this address are not accepted.".to_string()
                }
                DomainError::CallerRejected => "Missing or invalid API token.".to_string(),
                DomainError::Lockout => {
                    "Transaction key locked after too many failed attempts.".to_string()
                }
                DomainError::VerificationFailed { reason } => {
                    format!("Payment verification failed: {}", reason)
                }
                DomainError::CurrencyMismatch { expected, actual } => format!(
                    "Payment currency {} does not match expected {}.",
                    actual, expected
                ),
            },
            AppErrorKind::Infrastructure(_) => {
                "A temporary system error occurred. Please try again later.".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::MalformedUpstream { .. } => {
                    "Unexpected response from the payment acquirer.".to_string()
                }
                ExternalError::Transient { .. } => {
                    "The payment acquirer is temporarily unavailable.".to_string()
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid {}: {}", field, reason)
                }
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => matches!(err, ExternalError::Transient { .. }),
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> lives in database/error.rs

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
