use crate::database::error::DatabaseError;
use crate::database::repository::{PaymentTransaction, StateChange, TransactionStore};
use crate::payments::types::TransactionState;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

const TRANSACTION_COLUMNS: &str = "id, reference, provider_id, state, amount, currency, \
     key_hash, key_attempts, provider_reference, state_message, created_at, updated_at";

/// Repository for `payment_transactions`
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for TransactionRepository {
    async fn find_by_reference(
        &self,
        reference: &str,
        provider_id: i64,
        states: &[TransactionState],
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let states: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();

        // at most one non-terminal row per reference; prefer the newest
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {} FROM payment_transactions
             WHERE reference = $1 AND provider_id = $2 AND state = ANY($3)
             ORDER BY created_at DESC
             LIMIT 1",
            TRANSACTION_COLUMNS
        ))
        .bind(reference)
        .bind(provider_id)
        .bind(states)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>, DatabaseError> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {} FROM payment_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn set_key_hash(&self, id: Uuid, key_hash: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE payment_transactions
             SET key_hash = $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(key_hash)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::from_sqlx(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    async fn register_failed_key_attempt(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<i32, DatabaseError> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE payment_transactions
             SET key_attempts = LEAST(key_attempts + 1, $2), updated_at = NOW()
             WHERE id = $1
             RETURNING key_attempts",
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn transition(&self, id: Uuid, change: &StateChange) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE payment_transactions
             SET state = $3,
                 amount = COALESCE($4, amount),
                 provider_reference = COALESCE($5, provider_reference),
                 state_message = COALESCE($6, state_message),
                 updated_at = NOW()
             WHERE id = $1 AND state = $2",
        )
        .bind(id)
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(change.amount.as_ref())
        .bind(change.provider_reference.as_deref())
        .bind(change.message.as_deref())
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() == 1)
    }
}
