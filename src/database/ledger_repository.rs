use crate::database::error::DatabaseError;
use crate::database::repository::{
    LedgerEntry, LedgerStore, NewLedgerEntry, LEDGER_STATE_PROCESSED,
};
use async_trait::async_trait;
use sqlx::PgPool;

/// Repository for `acquirer_ledger`. Uniqueness of `remote_reference` is
/// enforced by the table constraint.
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    async fn exists(&self, remote_reference: &str) -> Result<bool, DatabaseError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM acquirer_ledger WHERE remote_reference = $1)",
        )
        .bind(remote_reference)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn insert(&self, entry: &NewLedgerEntry) -> Result<LedgerEntry, DatabaseError> {
        sqlx::query_as::<_, LedgerEntry>(
            "INSERT INTO acquirer_ledger
             (remote_reference, local_reference, amount, currency, provider_id, transaction_id, state)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, remote_reference, local_reference, amount, currency, provider_id,
                       transaction_id, state, recorded_at",
        )
        .bind(&entry.remote_reference)
        .bind(&entry.local_reference)
        .bind(&entry.amount)
        .bind(&entry.currency)
        .bind(entry.provider_id)
        .bind(entry.transaction_id)
        .bind(LEDGER_STATE_PROCESSED)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find(&self, remote_reference: &str) -> Result<Option<LedgerEntry>, DatabaseError> {
        sqlx::query_as::<_, LedgerEntry>(
            "SELECT id, remote_reference, local_reference, amount, currency, provider_id,
                    transaction_id, state, recorded_at
             FROM acquirer_ledger
             WHERE remote_reference = $1",
        )
        .bind(remote_reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
