//! Settlement state machine
//!
//! The only writer of transaction state. Every write is a compare-and-swap
//! against the state last read, so concurrent webhook and result calls
//! converge: the first writer wins and the others observe a terminal state
//! and become no-ops.
//!
//! ```text
//! draft ──► pending ──► done
//!   │          │
//!   └──────────┴──► cancelled | error
//! done + cancelled/error event ──► escalation (state stays done)
//! ```

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::{PaymentTransaction, StateChange, TransactionStore};
use crate::payments::types::{AcquirerEventKind, SettledAmount, TransactionState};
use crate::services::notification::EscalationNotifier;

/// State message stored on transactions the acquirer declined.
pub const DECLINED_MESSAGE: &str = "Payment declined.";

const PROVIDER_REFERENCE_PREFIX: &str = "worldpay-";
const MAX_CAS_RETRIES: usize = 3;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("transaction {0} not found")]
    TransactionNotFound(Uuid),
    #[error("transaction {0} kept changing while applying a transition")]
    Contention(Uuid),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// What applying an event did to the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Applied(TransactionState),
    /// Already in the target state.
    Unchanged(TransactionState),
    /// Informational event, or a transition out of a terminal state.
    Ignored,
    /// Late failure on a settled transaction; a follow-up task was raised.
    Escalated,
    /// The bounded wait ended without the transaction becoming eligible.
    NotApplied(TransactionState),
}

#[derive(Debug, Clone)]
pub struct SettlementPolicy {
    pub wait_attempts: u32,
    pub wait_interval: Duration,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            wait_attempts: 30,
            wait_interval: Duration::from_secs(1),
        }
    }
}

enum WaitResult {
    Ready,
    AlreadyDone,
    Stopped(TransactionState),
}

pub struct SettlementStateMachine {
    transactions: Arc<dyn TransactionStore>,
    escalation: EscalationNotifier,
    policy: SettlementPolicy,
}

impl SettlementStateMachine {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        escalation: EscalationNotifier,
        policy: SettlementPolicy,
    ) -> Self {
        Self {
            transactions,
            escalation,
            policy,
        }
    }

    /// `draft -> pending`, written by the initiation flow once the acquirer
    /// has the payment. This is the write the authorized-event wait observes.
    pub async fn mark_pending(&self, id: Uuid) -> Result<SettlementOutcome, SettlementError> {
        self.finalize(id, TransactionState::Pending, None, &AcquirerEventKind::SentForAuthorization)
            .await
    }

    /// Apply an acquirer event. Informational events are dropped before
    /// mapping; `authorized` goes through the bounded wait.
    pub async fn apply_event(
        &self,
        tx: &PaymentTransaction,
        event: &AcquirerEventKind,
        settled: Option<&SettledAmount>,
    ) -> Result<SettlementOutcome, SettlementError> {
        if event.is_informational() {
            debug!(reference = %tx.reference, event = %event.as_str(), "informational event ignored");
            return Ok(SettlementOutcome::Ignored);
        }

        match event.target_state() {
            Some(TransactionState::Done) => self.apply_authorized(tx, settled).await,
            Some(target) => self.finalize(tx.id, target, None, event).await,
            None => Ok(SettlementOutcome::Ignored),
        }
    }

    /// Finalize a confirmed settlement without waiting. The acquirer amount,
    /// when given, replaces the expected amount.
    pub async fn apply_done(
        &self,
        id: Uuid,
        settled: Option<&SettledAmount>,
    ) -> Result<SettlementOutcome, SettlementError> {
        self.finalize(id, TransactionState::Done, settled, &AcquirerEventKind::Authorized)
            .await
    }

    async fn apply_authorized(
        &self,
        tx: &PaymentTransaction,
        settled: Option<&SettledAmount>,
    ) -> Result<SettlementOutcome, SettlementError> {
        if tx.state == TransactionState::Done {
            return Ok(SettlementOutcome::Unchanged(TransactionState::Done));
        }

        match self.wait_for_pending(tx.id).await? {
            WaitResult::Ready => self.apply_done(tx.id, settled).await,
            WaitResult::AlreadyDone => {
                info!(reference = %tx.reference, "transaction settled by a concurrent path");
                Ok(SettlementOutcome::Unchanged(TransactionState::Done))
            }
            WaitResult::Stopped(state) => {
                warn!(
                    reference = %tx.reference,
                    state = %state,
                    "authorized event not applied"
                );
                Ok(SettlementOutcome::NotApplied(state))
            }
        }
    }

    /// Re-read the row until it reaches `pending` or `done`. No lock is held
    /// across the pauses.
    async fn wait_for_pending(&self, id: Uuid) -> Result<WaitResult, SettlementError> {
        let mut last = TransactionState::Draft;

        for attempt in 1..=self.policy.wait_attempts {
            let current = self.load(id).await?;
            last = current.state;

            match current.state {
                TransactionState::Pending => return Ok(WaitResult::Ready),
                TransactionState::Done => return Ok(WaitResult::AlreadyDone),
                TransactionState::Cancelled | TransactionState::Error => {
                    return Ok(WaitResult::Stopped(current.state))
                }
                TransactionState::Draft => {
                    debug!(
                        reference = %current.reference,
                        attempt,
                        "waiting for transaction to reach pending"
                    );
                    if attempt < self.policy.wait_attempts {
                        tokio::time::sleep(self.policy.wait_interval).await;
                    }
                }
            }
        }

        Ok(WaitResult::Stopped(last))
    }

    async fn finalize(
        &self,
        id: Uuid,
        target: TransactionState,
        settled: Option<&SettledAmount>,
        event: &AcquirerEventKind,
    ) -> Result<SettlementOutcome, SettlementError> {
        for _ in 0..MAX_CAS_RETRIES {
            let current = self.load(id).await?;

            if current.state == target {
                debug!(reference = %current.reference, state = %target, "transition already applied");
                return Ok(SettlementOutcome::Unchanged(target));
            }

            if current.state == TransactionState::Done
                && matches!(target, TransactionState::Cancelled | TransactionState::Error)
            {
                warn!(
                    reference = %current.reference,
                    event = %event.as_str(),
                    "failure reported for settled transaction"
                );
                self.escalation.escalate_late_failure(&current, event).await;
                return Ok(SettlementOutcome::Escalated);
            }

            if !current.state.can_transition_to(target) {
                warn!(
                    reference = %current.reference,
                    from = %current.state,
                    to = %target,
                    "transition not allowed, ignoring"
                );
                return Ok(SettlementOutcome::Ignored);
            }

            let change = build_change(&current, target, settled);
            if self.transactions.transition(id, &change).await? {
                info!(
                    reference = %current.reference,
                    transaction_id = %id,
                    from = %current.state,
                    to = %target,
                    amount = %change.amount.as_ref().unwrap_or(&current.amount),
                    "transaction state updated"
                );
                return Ok(SettlementOutcome::Applied(target));
            }

            debug!(reference = %current.reference, "state changed concurrently, re-reading");
        }

        Err(SettlementError::Contention(id))
    }

    async fn load(&self, id: Uuid) -> Result<PaymentTransaction, SettlementError> {
        self.transactions
            .get(id)
            .await?
            .ok_or(SettlementError::TransactionNotFound(id))
    }
}

fn build_change(
    current: &PaymentTransaction,
    target: TransactionState,
    settled: Option<&SettledAmount>,
) -> StateChange {
    let change = StateChange::new(current.state, target);
    match target {
        TransactionState::Done => {
            let change = change.with_provider_reference(format!(
                "{}{}",
                PROVIDER_REFERENCE_PREFIX, current.reference
            ));
            match settled.map(SettledAmount::major_units) {
                Some(amount) if amount != current.amount => change.with_amount(amount),
                _ => change,
            }
        }
        TransactionState::Error => change.with_message(DECLINED_MESSAGE),
        _ => change,
    }
}
