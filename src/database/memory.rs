//! In-memory store implementations.
//!
//! Same observable semantics as the Postgres repositories (compare-and-swap
//! transitions, capped attempt counter, unique ledger references). Used by
//! tests and by `SKIP_EXTERNALS` mode.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{
    ActivityScheduler, BusinessRecord, BusinessRecordDirectory, BusinessRecordKind,
    FollowUpActivity, LedgerEntry, LedgerStore, NewLedgerEntry, PaymentTransaction, StateChange,
    TransactionStore, LEDGER_STATE_PROCESSED,
};
use crate::payments::types::TransactionState;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::BigDecimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

fn not_found() -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::NotFound)
}

#[derive(Clone, Default)]
pub struct MemoryTransactionStore {
    rows: Arc<RwLock<HashMap<Uuid, PaymentTransaction>>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction the way the initiation flow would create it.
    pub async fn seed(
        &self,
        reference: &str,
        provider_id: i64,
        state: TransactionState,
        amount: BigDecimal,
        currency: &str,
    ) -> PaymentTransaction {
        let now = Utc::now();
        let tx = PaymentTransaction {
            id: Uuid::new_v4(),
            reference: reference.to_string(),
            provider_id,
            state,
            amount,
            currency: currency.to_string(),
            key_hash: None,
            key_attempts: 0,
            provider_reference: None,
            state_message: None,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.insert(tx.id, tx.clone());
        tx
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn find_by_reference(
        &self,
        reference: &str,
        provider_id: i64,
        states: &[TransactionState],
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|tx| {
                tx.reference == reference
                    && tx.provider_id == provider_id
                    && states.contains(&tx.state)
            })
            .max_by_key(|tx| tx.created_at)
            .cloned())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>, DatabaseError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn set_key_hash(&self, id: Uuid, key_hash: &str) -> Result<(), DatabaseError> {
        let mut rows = self.rows.write().await;
        let tx = rows.get_mut(&id).ok_or_else(not_found)?;
        tx.key_hash = Some(key_hash.to_string());
        tx.updated_at = Utc::now();
        Ok(())
    }

    async fn register_failed_key_attempt(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<i32, DatabaseError> {
        let mut rows = self.rows.write().await;
        let tx = rows.get_mut(&id).ok_or_else(not_found)?;
        tx.key_attempts = (tx.key_attempts + 1).min(max_attempts);
        tx.updated_at = Utc::now();
        Ok(tx.key_attempts)
    }

    async fn transition(&self, id: Uuid, change: &StateChange) -> Result<bool, DatabaseError> {
        let mut rows = self.rows.write().await;
        let tx = rows.get_mut(&id).ok_or_else(not_found)?;
        if tx.state != change.from {
            return Ok(false);
        }
        tx.state = change.to;
        if let Some(amount) = &change.amount {
            tx.amount = amount.clone();
        }
        if let Some(provider_reference) = &change.provider_reference {
            tx.provider_reference = Some(provider_reference.clone());
        }
        if let Some(message) = &change.message {
            tx.state_message = Some(message.clone());
        }
        tx.updated_at = Utc::now();
        Ok(true)
    }
}

#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    rows: Arc<RwLock<HashMap<String, LedgerEntry>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn exists(&self, remote_reference: &str) -> Result<bool, DatabaseError> {
        Ok(self.rows.read().await.contains_key(remote_reference))
    }

    async fn insert(&self, entry: &NewLedgerEntry) -> Result<LedgerEntry, DatabaseError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&entry.remote_reference) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "acquirer_ledger_remote_reference_key".to_string(),
            }));
        }

        let record = LedgerEntry {
            id: Uuid::new_v4(),
            remote_reference: entry.remote_reference.clone(),
            local_reference: entry.local_reference.clone(),
            amount: entry.amount.clone(),
            currency: entry.currency.clone(),
            provider_id: entry.provider_id,
            transaction_id: entry.transaction_id,
            state: LEDGER_STATE_PROCESSED.to_string(),
            recorded_at: Utc::now(),
        };
        rows.insert(record.remote_reference.clone(), record.clone());
        Ok(record)
    }

    async fn find(&self, remote_reference: &str) -> Result<Option<LedgerEntry>, DatabaseError> {
        Ok(self.rows.read().await.get(remote_reference).cloned())
    }
}

#[derive(Clone, Default)]
pub struct MemoryBusinessRecords {
    orders: Arc<RwLock<HashMap<String, BusinessRecord>>>,
    invoices: Arc<RwLock<HashMap<String, BusinessRecord>>>,
}

impl MemoryBusinessRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_order(&self, id: i64, name: &str, owner_user_id: Option<i64>) {
        self.orders.write().await.insert(
            name.to_string(),
            BusinessRecord {
                kind: BusinessRecordKind::SaleOrder,
                id,
                name: name.to_string(),
                owner_user_id,
            },
        );
    }

    pub async fn add_invoice(&self, id: i64, name: &str, owner_user_id: Option<i64>) {
        self.invoices.write().await.insert(
            name.to_string(),
            BusinessRecord {
                kind: BusinessRecordKind::Invoice,
                id,
                name: name.to_string(),
                owner_user_id,
            },
        );
    }
}

#[async_trait]
impl BusinessRecordDirectory for MemoryBusinessRecords {
    async fn find_order(&self, name: &str) -> Result<Option<BusinessRecord>, DatabaseError> {
        Ok(self.orders.read().await.get(name).cloned())
    }

    async fn find_invoice(&self, name: &str) -> Result<Option<BusinessRecord>, DatabaseError> {
        Ok(self.invoices.read().await.get(name).cloned())
    }
}

#[derive(Clone, Default)]
pub struct MemoryActivityScheduler {
    scheduled: Arc<RwLock<Vec<FollowUpActivity>>>,
}

impl MemoryActivityScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn scheduled(&self) -> Vec<FollowUpActivity> {
        self.scheduled.read().await.clone()
    }
}

#[async_trait]
impl ActivityScheduler for MemoryActivityScheduler {
    async fn schedule(&self, activity: &FollowUpActivity) -> Result<(), DatabaseError> {
        self.scheduled.write().await.push(activity.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transition_is_compare_and_swap() {
        let store = MemoryTransactionStore::new();
        let tx = store
            .seed("S0001", 1, TransactionState::Draft, BigDecimal::from(10), "GBP")
            .await;

        let change = StateChange::new(TransactionState::Draft, TransactionState::Pending);
        assert!(store.transition(tx.id, &change).await.unwrap());
        // second writer loses
        assert!(!store.transition(tx.id, &change).await.unwrap());

        let current = store.get(tx.id).await.unwrap().unwrap();
        assert_eq!(current.state, TransactionState::Pending);
    }

    #[tokio::test]
    async fn failed_attempts_are_capped() {
        let store = MemoryTransactionStore::new();
        let tx = store
            .seed("S0001", 1, TransactionState::Draft, BigDecimal::from(10), "GBP")
            .await;

        for _ in 0..5 {
            store.register_failed_key_attempt(tx.id, 3).await.unwrap();
        }
        assert_eq!(store.get(tx.id).await.unwrap().unwrap().key_attempts, 3);
    }

    #[tokio::test]
    async fn lookup_filters_by_state_and_provider() {
        let store = MemoryTransactionStore::new();
        store
            .seed("S0001", 1, TransactionState::Cancelled, BigDecimal::from(10), "GBP")
            .await;

        let found = store
            .find_by_reference("S0001", 1, TransactionState::webhook_visible())
            .await
            .unwrap();
        assert!(found.is_none());

        let found = store
            .find_by_reference("S0001", 2, &[TransactionState::Cancelled])
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn ledger_rejects_duplicate_remote_reference() {
        let ledger = MemoryLedgerStore::new();
        let entry = NewLedgerEntry {
            remote_reference: "SNSVT-S0001".to_string(),
            local_reference: "S0001".to_string(),
            amount: BigDecimal::from(10),
            currency: "GBP".to_string(),
            provider_id: 1,
            transaction_id: Uuid::new_v4(),
        };

        ledger.insert(&entry).await.unwrap();
        let err = ledger.insert(&entry).await.unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(ledger.len().await, 1);
    }
}
