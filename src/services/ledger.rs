use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::database::error::DatabaseError;
use crate::database::repository::{LedgerEntry, LedgerStore, NewLedgerEntry};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("remote reference {0} already recorded")]
    DuplicateReference(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Dedup record of remote payments already applied. Uniqueness comes from
/// the store's constraint, never from a read-then-write check.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn is_applied(&self, remote_reference: &str) -> Result<bool, LedgerError> {
        Ok(self.store.exists(remote_reference).await?)
    }

    pub async fn record(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, LedgerError> {
        match self.store.insert(&entry).await {
            Ok(record) => {
                info!(
                    remote_reference = %record.remote_reference,
                    local_reference = %record.local_reference,
                    transaction_id = %record.transaction_id,
                    "ledger entry recorded"
                );
                Ok(record)
            }
            Err(e) if e.is_unique_violation() => {
                warn!(remote_reference = %entry.remote_reference, "remote reference already in ledger");
                Err(LedgerError::DuplicateReference(entry.remote_reference))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, remote_reference: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.store.find(remote_reference).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryLedgerStore;
    use sqlx::types::BigDecimal;
    use uuid::Uuid;

    fn entry(remote: &str) -> NewLedgerEntry {
        NewLedgerEntry {
            remote_reference: remote.to_string(),
            local_reference: "S0001".to_string(),
            amount: BigDecimal::from(10),
            currency: "GBP".to_string(),
            provider_id: 1,
            transaction_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn second_record_is_duplicate() {
        let ledger = Ledger::new(Arc::new(MemoryLedgerStore::new()));

        assert!(!ledger.is_applied("SNSVT-S0001").await.unwrap());
        let first = ledger.record(entry("SNSVT-S0001")).await.unwrap();
        assert_eq!(first.state, "processed");
        assert!(ledger.is_applied("SNSVT-S0001").await.unwrap());

        let err = ledger.record(entry("SNSVT-S0001")).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateReference(ref r) if r == "SNSVT-S0001"));
    }

    #[tokio::test]
    async fn concurrent_records_admit_exactly_one() {
        let ledger = Ledger::new(Arc::new(MemoryLedgerStore::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.record(entry("SNSVT-S0002")).await })
            })
            .collect();

        let mut recorded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                recorded += 1;
            }
        }
        assert_eq!(recorded, 1);
        assert!(ledger.get("SNSVT-S0002").await.unwrap().is_some());
    }
}
