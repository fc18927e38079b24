use crate::payments::error::PaymentError;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Local lifecycle of a payment transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Draft,
    Pending,
    Done,
    Cancelled,
    Error,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Draft => "draft",
            TransactionState::Pending => "pending",
            TransactionState::Done => "done",
            TransactionState::Cancelled => "cancelled",
            TransactionState::Error => "error",
        }
    }

    /// Terminal for state-transition purposes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Done | TransactionState::Cancelled | TransactionState::Error
        )
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> &'static [TransactionState] {
        match self {
            TransactionState::Draft => &[
                TransactionState::Pending,
                TransactionState::Done,
                TransactionState::Cancelled,
                TransactionState::Error,
            ],
            TransactionState::Pending => &[
                TransactionState::Done,
                TransactionState::Cancelled,
                TransactionState::Error,
            ],
            TransactionState::Done | TransactionState::Cancelled | TransactionState::Error => &[],
        }
    }

    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// States a webhook may still act on. `done` stays visible so a late
    /// failure can be escalated.
    pub fn webhook_visible() -> &'static [TransactionState] {
        &[
            TransactionState::Draft,
            TransactionState::Pending,
            TransactionState::Done,
        ]
    }

    /// States the result endpoint resolves a transaction from.
    pub fn result_visible() -> &'static [TransactionState] {
        &[TransactionState::Draft, TransactionState::Done]
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionState {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "draft" => Ok(TransactionState::Draft),
            "pending" => Ok(TransactionState::Pending),
            "done" => Ok(TransactionState::Done),
            "cancelled" | "cancel" => Ok(TransactionState::Cancelled),
            "error" => Ok(TransactionState::Error),
            _ => Err(PaymentError::ValidationError {
                message: format!("unknown transaction state: {}", value),
                field: Some("state".to_string()),
            }),
        }
    }
}

impl TryFrom<String> for TransactionState {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, PaymentError> {
        value.parse()
    }
}

/// Acquirer event `type`, closed over the values the settlement flow cares
/// about. Anything unrecognised is kept verbatim and treated as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquirerEventKind {
    SentForAuthorization,
    SentForSettlement,
    Authorized,
    Cancelled,
    Other(String),
}

impl AcquirerEventKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "sentForAuthorization" => AcquirerEventKind::SentForAuthorization,
            "sentForSettlement" => AcquirerEventKind::SentForSettlement,
            "authorized" => AcquirerEventKind::Authorized,
            "cancelled" => AcquirerEventKind::Cancelled,
            other => AcquirerEventKind::Other(other.to_string()),
        }
    }

    /// Informational events never drive a transition.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            AcquirerEventKind::SentForAuthorization | AcquirerEventKind::SentForSettlement
        )
    }

    /// Local state the event maps to, or `None` for informational events.
    pub fn target_state(&self) -> Option<TransactionState> {
        match self {
            AcquirerEventKind::SentForSettlement => None,
            AcquirerEventKind::SentForAuthorization => Some(TransactionState::Pending),
            AcquirerEventKind::Authorized => Some(TransactionState::Done),
            AcquirerEventKind::Cancelled => Some(TransactionState::Cancelled),
            AcquirerEventKind::Other(_) => Some(TransactionState::Error),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AcquirerEventKind::SentForAuthorization => "sentForAuthorization",
            AcquirerEventKind::SentForSettlement => "sentForSettlement",
            AcquirerEventKind::Authorized => "authorized",
            AcquirerEventKind::Cancelled => "cancelled",
            AcquirerEventKind::Other(raw) => raw.as_str(),
        }
    }
}

/// Webhook body: `{"eventDetails": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "eventDetails")]
    pub event_details: Option<EventDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    pub transaction_reference: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub token_payment_instrument: Option<JsonValue>,
    /// Kept raw so an unexpected shape never rejects the whole event.
    pub amount: Option<JsonValue>,
}

/// Settled value carried by an event, in minor units.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventAmount {
    pub value: i64,
    pub currency_code: String,
}

/// Response of the acquirer's payment-queries lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentQueryResponse {
    #[serde(rename = "_embedded")]
    pub embedded: Option<EmbeddedPayments>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmbeddedPayments {
    #[serde(default)]
    pub payments: Vec<AcquirerPayment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcquirerPayment {
    pub transaction_reference: Option<String>,
    pub value: Option<PaymentValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentValue {
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

/// A verified payment with its value fields resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SettledAmount {
    pub minor_units: i64,
    pub currency: String,
}

impl SettledAmount {
    pub fn major_units(&self) -> BigDecimal {
        minor_to_major(self.minor_units)
    }
}

/// 1000 -> 10.00
pub fn minor_to_major(minor_units: i64) -> BigDecimal {
    (BigDecimal::from(minor_units) / BigDecimal::from(100)).with_scale(2)
}

/// 10.005 -> 1000 (truncates toward zero)
pub fn major_to_minor(amount: &BigDecimal) -> Option<i64> {
    (amount.clone() * BigDecimal::from(100))
        .with_scale(0)
        .to_i64()
}
