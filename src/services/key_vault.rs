//! One-time transaction keys authorizing result callbacks.
//!
//! Only an argon2 hash of the key is stored. Failed validations bump a
//! counter capped at [`MAX_KEY_ATTEMPTS`]; once reached the key is rejected
//! without comparison, even if correct. A successful validation leaves the
//! counter untouched, so the same key can authorize repeated callbacks.
//! Reissuing a key never lowers the counter: a locked transaction stays
//! locked.
//!
//! Validations for the same transaction run one at a time, so concurrent
//! guesses cannot all read the counter before any of them bumps it. Across
//! processes sharing a database a few extra comparisons remain possible; the
//! key carries 122 random bits and the counter stays capped.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::{PaymentTransaction, TransactionStore};

pub const MAX_KEY_ATTEMPTS: i32 = 3;

#[derive(Debug, Error)]
pub enum KeyVaultError {
    #[error("key hashing failed: {0}")]
    Hashing(String),
    #[error("transaction {0} not found")]
    TransactionNotFound(Uuid),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Outcome of a key check. Only `Accepted` authorizes the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCheck {
    Accepted,
    Rejected,
    LockedOut,
}

impl KeyCheck {
    pub fn is_accepted(&self) -> bool {
        matches!(self, KeyCheck::Accepted)
    }
}

type KeyLocks = Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

#[derive(Clone)]
pub struct KeyVault {
    transactions: Arc<dyn TransactionStore>,
    locks: KeyLocks,
}

impl KeyVault {
    pub fn new(transactions: Arc<dyn TransactionStore>) -> Self {
        Self {
            transactions,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Generate a fresh key, store its hash and return the plaintext once.
    /// Replaces any previous key; the attempt counter is kept.
    pub async fn issue(&self, transaction: &PaymentTransaction) -> Result<String, KeyVaultError> {
        let secret = Uuid::new_v4().simple().to_string();

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| KeyVaultError::Hashing(e.to_string()))?
            .to_string();

        self.transactions.set_key_hash(transaction.id, &hash).await?;
        info!(reference = %transaction.reference, "transaction key issued");

        Ok(secret)
    }

    pub async fn validate(
        &self,
        transaction: &PaymentTransaction,
        candidate: &str,
    ) -> Result<KeyCheck, KeyVaultError> {
        let lock = self.lock_for(transaction.id).await;
        let _guard = lock.lock().await;

        // the caller's snapshot may be stale; the counter must not be
        let current = self
            .transactions
            .get(transaction.id)
            .await?
            .ok_or(KeyVaultError::TransactionNotFound(transaction.id))?;

        if current.key_attempts >= MAX_KEY_ATTEMPTS {
            warn!(
                reference = %current.reference,
                attempts = current.key_attempts,
                "transaction key locked after maximum failed attempts"
            );
            return Ok(KeyCheck::LockedOut);
        }

        let Some(stored) = current.key_hash.as_deref() else {
            warn!(reference = %current.reference, "no transaction key issued");
            return Ok(KeyCheck::Rejected);
        };

        let parsed = match PasswordHash::new(stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(reference = %current.reference, error = %e, "stored key hash is unreadable");
                return Ok(KeyCheck::Rejected);
            }
        };

        if Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
        {
            info!(reference = %current.reference, "transaction key accepted");
            return Ok(KeyCheck::Accepted);
        }

        let attempts = self
            .transactions
            .register_failed_key_attempt(current.id, MAX_KEY_ATTEMPTS)
            .await?;
        warn!(
            reference = %current.reference,
            attempts,
            "transaction key rejected"
        );

        Ok(KeyCheck::Rejected)
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // drop entries nobody is holding or waiting on
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(id).or_default().clone()
    }
}
