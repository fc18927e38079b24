use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::database::error::DatabaseError;
use crate::database::repository::{PaymentTransaction, TransactionStore};
use crate::payments::reference::ReferenceFormat;
use crate::payments::types::{
    AcquirerEventKind, EventAmount, EventDetails, SettledAmount, TransactionState, WebhookEnvelope,
};
use crate::services::settlement::{SettlementError, SettlementOutcome, SettlementStateMachine};

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("origin {0} is not allowed")]
    Forbidden(IpAddr),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Processing error: {0}")]
    Settlement(#[from] SettlementError),
}

/// How an accepted event was handled. Every variant is acknowledged to the
/// acquirer with a 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed(SettlementOutcome),
    Informational,
    TokenizationNotice,
    UnknownReference,
}

pub struct WebhookProcessor {
    transactions: Arc<dyn TransactionStore>,
    settlement: Arc<SettlementStateMachine>,
    format: ReferenceFormat,
    provider_id: i64,
    settlement_currency: String,
    allowed_ips: Vec<IpAddr>,
}

impl WebhookProcessor {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        settlement: Arc<SettlementStateMachine>,
        format: ReferenceFormat,
        provider_id: i64,
        settlement_currency: impl Into<String>,
        allowed_ips: Vec<IpAddr>,
    ) -> Self {
        Self {
            transactions,
            settlement,
            format,
            provider_id,
            settlement_currency: settlement_currency.into(),
            allowed_ips,
        }
    }

    /// Exact match against the allowlist. An empty list admits nobody.
    pub fn check_origin(&self, origin: IpAddr) -> Result<(), WebhookProcessorError> {
        if self.allowed_ips.contains(&origin) {
            Ok(())
        } else {
            warn!(origin = %origin, "webhook from disallowed origin");
            Err(WebhookProcessorError::Forbidden(origin))
        }
    }

    /// Parse and apply one event. The origin must already be checked.
    pub async fn process(&self, body: &[u8]) -> Result<WebhookOutcome, WebhookProcessorError> {
        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| WebhookProcessorError::MalformedPayload(e.to_string()))?;

        let details = envelope.event_details.ok_or_else(|| {
            WebhookProcessorError::MalformedPayload("missing eventDetails".to_string())
        })?;

        let Some(event_type) = details.event_type.as_deref() else {
            if details.token_payment_instrument.is_some() {
                info!(
                    reference = ?details.transaction_reference,
                    "tokenization notice acknowledged without action"
                );
                return Ok(WebhookOutcome::TokenizationNotice);
            }
            return Err(WebhookProcessorError::MalformedPayload(
                "missing eventDetails.type".to_string(),
            ));
        };

        let event = AcquirerEventKind::parse(event_type);
        if event.is_informational() {
            info!(
                reference = ?details.transaction_reference,
                event = %event.as_str(),
                "informational event acknowledged"
            );
            return Ok(WebhookOutcome::Informational);
        }

        let reference = details
            .transaction_reference
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| {
                WebhookProcessorError::MalformedPayload(
                    "missing eventDetails.transactionReference".to_string(),
                )
            })?;

        let Some(tx) = self.find_transaction(reference).await? else {
            warn!(reference = %reference, event = %event.as_str(), "no transaction for webhook reference");
            return Ok(WebhookOutcome::UnknownReference);
        };

        info!(
            reference = %tx.reference,
            transaction_id = %tx.id,
            state = %tx.state,
            event = %event.as_str(),
            "applying acquirer event"
        );

        let settled = self.settled_amount(&details);
        let outcome = self
            .settlement
            .apply_event(&tx, &event, settled.as_ref())
            .await?;

        Ok(WebhookOutcome::Processed(outcome))
    }

    async fn find_transaction(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, WebhookProcessorError> {
        let visible = TransactionState::webhook_visible();
        let stripped = self.format.strip(reference);

        if let Some(tx) = self
            .transactions
            .find_by_reference(stripped, self.provider_id, visible)
            .await?
        {
            return Ok(Some(tx));
        }
        if stripped == reference {
            return Ok(None);
        }
        Ok(self
            .transactions
            .find_by_reference(reference, self.provider_id, visible)
            .await?)
    }

    fn settled_amount(&self, details: &EventDetails) -> Option<SettledAmount> {
        let raw = details.amount.as_ref()?;
        let amount: EventAmount = match serde_json::from_value(raw.clone()) {
            Ok(amount) => amount,
            Err(e) => {
                warn!(error = %e, "unreadable event amount, keeping expected amount");
                return None;
            }
        };
        if amount.currency_code != self.settlement_currency {
            warn!(
                currency = %amount.currency_code,
                expected = %self.settlement_currency,
                "event amount in unexpected currency, keeping expected amount"
            );
            return None;
        }
        Some(SettledAmount {
            minor_units: amount.value,
            currency: amount.currency_code,
        })
    }
}
