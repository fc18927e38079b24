//! Finds the acquirer payment behind a local reference.
//!
//! The acquirer may hold the payment under the prefixed reference or under
//! any earlier retry suffix. Candidates are queried newest first; the first
//! verified payment wins. A malformed response or a payment that fails
//! verification ends the search, an empty list or a failed call moves on.

use sqlx::types::BigDecimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::payments::error::PaymentError;
use crate::payments::provider::PaymentLookup;
use crate::payments::reference::ReferenceFormat;
use crate::payments::types::{major_to_minor, AcquirerPayment, SettledAmount};
use crate::services::ledger::Ledger;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReconcileError {
    #[error("malformed acquirer response for {reference}: {message}")]
    MalformedResponse { reference: String, message: String },

    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("payment verification failed: {0}")]
    VerificationFailed(String),
}

/// A verified acquirer payment.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledPayment {
    pub remote_reference: String,
    pub settled: SettledAmount,
}

pub struct ReconciliationSearch {
    lookup: Arc<dyn PaymentLookup>,
    ledger: Ledger,
    format: ReferenceFormat,
    settlement_currency: String,
    pause: Duration,
}

impl ReconciliationSearch {
    pub fn new(
        lookup: Arc<dyn PaymentLookup>,
        ledger: Ledger,
        format: ReferenceFormat,
        settlement_currency: impl Into<String>,
        pause: Duration,
    ) -> Self {
        Self {
            lookup,
            ledger,
            format,
            settlement_currency: settlement_currency.into(),
            pause,
        }
    }

    /// `Ok(None)` means nothing matched, which is not an error.
    pub async fn search(
        &self,
        reference: &str,
        expected_amount: &BigDecimal,
    ) -> Result<Option<ReconciledPayment>, ReconcileError> {
        let mut queried = false;

        for candidate in self.format.candidates(reference) {
            match self.ledger.is_applied(&candidate).await {
                Ok(true) => {
                    debug!(remote_reference = %candidate, "candidate already in ledger, skipping");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(remote_reference = %candidate, error = %e, "ledger check failed, querying anyway");
                }
            }

            if queried && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            queried = true;

            let response = match self.lookup.lookup_payments(&candidate).await {
                Ok(response) => response,
                Err(e) if e.is_transient() => {
                    warn!(remote_reference = %candidate, error = %e, "acquirer lookup failed, trying next candidate");
                    continue;
                }
                Err(PaymentError::MalformedResponse { message }) => {
                    return Err(ReconcileError::MalformedResponse {
                        reference: candidate,
                        message,
                    })
                }
                Err(e) => return Err(ReconcileError::VerificationFailed(e.to_string())),
            };

            let Some(embedded) = response.embedded else {
                return Err(ReconcileError::MalformedResponse {
                    reference: candidate,
                    message: "missing _embedded payment list".to_string(),
                });
            };

            let Some(payment) = embedded.payments.first() else {
                debug!(remote_reference = %candidate, "no payments for candidate");
                continue;
            };

            let settled = self.verify(payment, expected_amount)?;
            info!(
                reference = %reference,
                remote_reference = %candidate,
                amount = settled.minor_units,
                currency = %settled.currency,
                "acquirer payment matched"
            );
            return Ok(Some(ReconciledPayment {
                remote_reference: candidate,
                settled,
            }));
        }

        info!(reference = %reference, "no acquirer payment found for any candidate");
        Ok(None)
    }

    /// Currency must match. The amount is compared for the log only, since
    /// partial captures settle below the expected amount.
    fn verify(
        &self,
        payment: &AcquirerPayment,
        expected_amount: &BigDecimal,
    ) -> Result<SettledAmount, ReconcileError> {
        let value = payment
            .value
            .as_ref()
            .ok_or_else(|| ReconcileError::VerificationFailed("payment has no value".to_string()))?;

        let currency = value.currency.clone().ok_or_else(|| {
            ReconcileError::VerificationFailed("payment has no currency".to_string())
        })?;
        if currency != self.settlement_currency {
            return Err(ReconcileError::CurrencyMismatch {
                expected: self.settlement_currency.clone(),
                actual: currency,
            });
        }

        let amount = value.amount.ok_or_else(|| {
            ReconcileError::VerificationFailed("payment has no amount".to_string())
        })?;

        let expected_minor = major_to_minor(expected_amount);
        if expected_minor != Some(amount) {
            warn!(
                expected = ?expected_minor,
                actual = amount,
                "acquirer amount differs from expected amount"
            );
        }

        Ok(SettledAmount {
            minor_units: amount,
            currency,
        })
    }
}
