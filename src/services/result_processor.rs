use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::database::error::DatabaseError;
use crate::database::repository::{NewLedgerEntry, TransactionStore};
use crate::error::{
    AppError, AppErrorKind, DomainError, ExternalError, InfrastructureError, ValidationError,
};
use crate::payments::reference::ReferenceFormat;
use crate::payments::types::TransactionState;
use crate::services::key_vault::{KeyCheck, KeyVault, KeyVaultError};
use crate::services::ledger::{Ledger, LedgerError};
use crate::services::reconciliation::{ReconcileError, ReconciliationSearch};
use crate::services::settlement::{SettlementError, SettlementOutcome, SettlementStateMachine};

pub const PAYMENT_RECEIVED: &str = "Payment received";
pub const PAYMENT_ALREADY_RECEIVED: &str = "Payment already received";

#[derive(Debug, Error)]
pub enum ResultError {
    #[error("reference is required")]
    EmptyReference,
    #[error("transaction_key is required")]
    MissingKey,
    #[error("transaction {0} not found")]
    TransactionNotFound(String),
    #[error("transaction key rejected")]
    KeyRejected,
    #[error("transaction key locked out")]
    KeyLockedOut,
    #[error("no acquirer payment found for {0}")]
    PaymentNotFound(String),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    KeyVault(#[from] KeyVaultError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<ResultError> for AppError {
    fn from(err: ResultError) -> Self {
        let context = err.to_string();
        let kind = match err {
            ResultError::EmptyReference => AppErrorKind::Validation(ValidationError::MissingField {
                field: "reference".to_string(),
            }),
            ResultError::MissingKey => AppErrorKind::Validation(ValidationError::MissingField {
                field: "transaction_key".to_string(),
            }),
            ResultError::TransactionNotFound(reference) => {
                AppErrorKind::Domain(DomainError::TransactionNotFound { reference })
            }
            ResultError::KeyRejected => AppErrorKind::Domain(DomainError::AuthRejected),
            ResultError::KeyLockedOut => AppErrorKind::Domain(DomainError::Lockout),
            ResultError::PaymentNotFound(reference) => {
                AppErrorKind::Domain(DomainError::PaymentNotFound { reference })
            }
            ResultError::Reconcile(ReconcileError::MalformedResponse { message, .. }) => {
                AppErrorKind::External(ExternalError::MalformedUpstream { message })
            }
            ResultError::Reconcile(ReconcileError::CurrencyMismatch { expected, actual }) => {
                AppErrorKind::Domain(DomainError::CurrencyMismatch { expected, actual })
            }
            ResultError::Reconcile(ReconcileError::VerificationFailed(reason)) => {
                AppErrorKind::Domain(DomainError::VerificationFailed { reason })
            }
            ResultError::KeyVault(KeyVaultError::Database(e))
            | ResultError::Settlement(SettlementError::Database(e))
            | ResultError::Database(e) => return AppError::from(e).with_context(context),
            ResultError::KeyVault(_) | ResultError::Settlement(_) => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message: context.clone(),
                    is_retryable: true,
                })
            }
        };
        AppError::new(kind).with_context(context)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOutcome {
    Received,
    AlreadyReceived,
}

impl ResultOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            ResultOutcome::Received => PAYMENT_RECEIVED,
            ResultOutcome::AlreadyReceived => PAYMENT_ALREADY_RECEIVED,
        }
    }
}

/// Client-originated confirmation: authorize with the transaction key, find
/// the acquirer payment, then settle.
pub struct ResultProcessor {
    transactions: Arc<dyn TransactionStore>,
    key_vault: KeyVault,
    search: ReconciliationSearch,
    ledger: Ledger,
    settlement: Arc<SettlementStateMachine>,
    format: ReferenceFormat,
    provider_id: i64,
}

impl ResultProcessor {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        key_vault: KeyVault,
        search: ReconciliationSearch,
        ledger: Ledger,
        settlement: Arc<SettlementStateMachine>,
        format: ReferenceFormat,
        provider_id: i64,
    ) -> Self {
        Self {
            transactions,
            key_vault,
            search,
            ledger,
            settlement,
            format,
            provider_id,
        }
    }

    pub async fn confirm(
        &self,
        reference: &str,
        candidate_key: &str,
    ) -> Result<ResultOutcome, ResultError> {
        let local_reference = self.format.strip(reference.trim());
        if local_reference.is_empty() {
            return Err(ResultError::EmptyReference);
        }
        if candidate_key.trim().is_empty() {
            return Err(ResultError::MissingKey);
        }

        let tx = self
            .transactions
            .find_by_reference(
                local_reference,
                self.provider_id,
                TransactionState::result_visible(),
            )
            .await?
            .ok_or_else(|| ResultError::TransactionNotFound(local_reference.to_string()))?;

        match self.key_vault.validate(&tx, candidate_key).await? {
            KeyCheck::Accepted => {}
            KeyCheck::Rejected => return Err(ResultError::KeyRejected),
            KeyCheck::LockedOut => return Err(ResultError::KeyLockedOut),
        }

        if tx.state == TransactionState::Done {
            info!(reference = %tx.reference, "result received for settled transaction");
            return Ok(ResultOutcome::AlreadyReceived);
        }

        let payment = self
            .search
            .search(&tx.reference, &tx.amount)
            .await?
            .ok_or_else(|| ResultError::PaymentNotFound(tx.reference.clone()))?;

        let entry = NewLedgerEntry {
            remote_reference: payment.remote_reference.clone(),
            local_reference: tx.reference.clone(),
            amount: payment.settled.major_units(),
            currency: payment.settled.currency.clone(),
            provider_id: self.provider_id,
            transaction_id: tx.id,
        };
        match self.ledger.record(entry).await {
            Ok(_) => {}
            Err(LedgerError::DuplicateReference(remote)) => {
                info!(remote_reference = %remote, "remote payment already recorded by a concurrent call");
            }
            Err(e) => {
                error!(
                    reference = %tx.reference,
                    remote_reference = %payment.remote_reference,
                    error = %e,
                    "ledger write failed, continuing with settlement"
                );
            }
        }

        let outcome = self
            .settlement
            .apply_done(tx.id, Some(&payment.settled))
            .await?;
        match outcome {
            SettlementOutcome::Applied(_) | SettlementOutcome::Unchanged(_) => {}
            other => warn!(
                reference = %tx.reference,
                outcome = ?other,
                "verified payment did not settle transaction"
            ),
        }

        Ok(ResultOutcome::Received)
    }
}
