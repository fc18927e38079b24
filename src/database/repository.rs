//! Store traits the settlement services are written against.
//!
//! Each trait has a Postgres implementation in this module's siblings and an
//! in-memory one in [`crate::database::memory`].

use crate::database::error::DatabaseError;
use crate::payments::types::TransactionState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::FromRow;
use uuid::Uuid;

/// Local payment transaction being reconciled.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub reference: String,
    pub provider_id: i64,
    #[sqlx(try_from = "String")]
    pub state: TransactionState,
    pub amount: BigDecimal,
    pub currency: String,
    pub key_hash: Option<String>,
    pub key_attempts: i32,
    pub provider_reference: Option<String>,
    pub state_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A compare-and-swap state write. Applied only if the row is still in
/// `from`; optional fields are left untouched when `None`.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub from: TransactionState,
    pub to: TransactionState,
    pub amount: Option<BigDecimal>,
    pub provider_reference: Option<String>,
    pub message: Option<String>,
}

impl StateChange {
    pub fn new(from: TransactionState, to: TransactionState) -> Self {
        Self {
            from,
            to,
            amount: None,
            provider_reference: None,
            message: None,
        }
    }

    pub fn with_amount(mut self, amount: BigDecimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_provider_reference(mut self, provider_reference: impl Into<String>) -> Self {
        self.provider_reference = Some(provider_reference.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

pub const LEDGER_STATE_PROCESSED: &str = "processed";

/// Proof that a remote payment has been applied.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub remote_reference: String,
    pub local_reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub provider_id: i64,
    pub transaction_id: Uuid,
    pub state: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub remote_reference: String,
    pub local_reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub provider_id: i64,
    pub transaction_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessRecordKind {
    SaleOrder,
    Invoice,
}

/// Order or invoice that owns a transaction, for escalation routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessRecord {
    pub kind: BusinessRecordKind,
    pub id: i64,
    pub name: String,
    pub owner_user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityTarget {
    SaleOrder(i64),
    Invoice(i64),
    Transaction(Uuid),
}

impl From<&BusinessRecord> for ActivityTarget {
    fn from(record: &BusinessRecord) -> Self {
        match record.kind {
            BusinessRecordKind::SaleOrder => ActivityTarget::SaleOrder(record.id),
            BusinessRecordKind::Invoice => ActivityTarget::Invoice(record.id),
        }
    }
}

/// Human follow-up task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpActivity {
    pub target: ActivityTarget,
    pub assignee_user_id: Option<i64>,
    pub summary: String,
    pub note: String,
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn find_by_reference(
        &self,
        reference: &str,
        provider_id: i64,
        states: &[TransactionState],
    ) -> Result<Option<PaymentTransaction>, DatabaseError>;

    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>, DatabaseError>;

    /// Store a new key hash. The failed-attempt counter is left as is.
    async fn set_key_hash(&self, id: Uuid, key_hash: &str) -> Result<(), DatabaseError>;

    /// Atomically bump the failed-attempt counter, never past `max_attempts`.
    /// Returns the counter after the update.
    async fn register_failed_key_attempt(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<i32, DatabaseError>;

    /// Returns `false` when the row was no longer in `change.from`.
    async fn transition(&self, id: Uuid, change: &StateChange) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn exists(&self, remote_reference: &str) -> Result<bool, DatabaseError>;

    /// Fails with a unique violation when the remote reference is present.
    async fn insert(&self, entry: &NewLedgerEntry) -> Result<LedgerEntry, DatabaseError>;

    async fn find(&self, remote_reference: &str) -> Result<Option<LedgerEntry>, DatabaseError>;
}

#[async_trait]
pub trait BusinessRecordDirectory: Send + Sync {
    async fn find_order(&self, name: &str) -> Result<Option<BusinessRecord>, DatabaseError>;

    async fn find_invoice(&self, name: &str) -> Result<Option<BusinessRecord>, DatabaseError>;
}

#[async_trait]
pub trait ActivityScheduler: Send + Sync {
    async fn schedule(&self, activity: &FollowUpActivity) -> Result<(), DatabaseError>;
}
