use std::sync::Arc;
use tracing::{error, info, warn};

use crate::database::repository::{
    ActivityScheduler, ActivityTarget, BusinessRecord, BusinessRecordDirectory,
    FollowUpActivity, PaymentTransaction,
};
use crate::payments::reference::{owner_keys, ReferenceFormat};
use crate::payments::types::AcquirerEventKind;

/// Raises a human follow-up when the acquirer reports failure for a
/// transaction that is already settled.
pub struct EscalationNotifier {
    directory: Arc<dyn BusinessRecordDirectory>,
    scheduler: Arc<dyn ActivityScheduler>,
    format: ReferenceFormat,
    fallback_user_id: Option<i64>,
}

impl EscalationNotifier {
    pub fn new(
        directory: Arc<dyn BusinessRecordDirectory>,
        scheduler: Arc<dyn ActivityScheduler>,
        format: ReferenceFormat,
        fallback_user_id: Option<i64>,
    ) -> Self {
        Self {
            directory,
            scheduler,
            format,
            fallback_user_id,
        }
    }

    /// Never fails: the task is attached to the transaction when no owning
    /// record is found, and left unassigned when nobody owns it.
    pub async fn escalate_late_failure(&self, tx: &PaymentTransaction, event: &AcquirerEventKind) {
        let record = self.resolve_owner(tx).await;

        let (target, assignee) = match &record {
            Some(record) => (
                ActivityTarget::from(record),
                record.owner_user_id.or(self.fallback_user_id),
            ),
            None => (ActivityTarget::Transaction(tx.id), self.fallback_user_id),
        };

        let activity = FollowUpActivity {
            target,
            assignee_user_id: assignee,
            summary: format!("Payment {} reported {} after settlement", tx.reference, event.as_str()),
            note: format!(
                "Transaction {} was already settled for {} {} when the acquirer sent a '{}' event. \
                 Check the payment with the acquirer before taking action.",
                tx.reference,
                tx.amount,
                tx.currency,
                event.as_str()
            ),
        };

        match self.scheduler.schedule(&activity).await {
            Ok(()) => info!(
                reference = %tx.reference,
                event = %event.as_str(),
                target = ?activity.target,
                assignee = ?activity.assignee_user_id,
                "late failure escalated"
            ),
            Err(e) => error!(
                reference = %tx.reference,
                event = %event.as_str(),
                error = %e,
                "failed to schedule escalation activity"
            ),
        }
    }

    async fn resolve_owner(&self, tx: &PaymentTransaction) -> Option<BusinessRecord> {
        for key in owner_keys(&self.format, &tx.reference) {
            match self.directory.find_order(key).await {
                Ok(Some(order)) => return Some(order),
                Ok(None) => {}
                Err(e) => warn!(reference = %tx.reference, key = %key, error = %e, "order lookup failed"),
            }

            match self.directory.find_invoice(key).await {
                Ok(Some(invoice)) => return Some(invoice),
                Ok(None) => {}
                Err(e) => warn!(reference = %tx.reference, key = %key, error = %e, "invoice lookup failed"),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{
        MemoryActivityScheduler, MemoryBusinessRecords, MemoryTransactionStore,
    };
    use crate::payments::types::TransactionState;
    use sqlx::types::BigDecimal;

    async fn done_tx(reference: &str) -> PaymentTransaction {
        MemoryTransactionStore::new()
            .seed(reference, 1, TransactionState::Done, BigDecimal::from(10), "GBP")
            .await
    }

    fn notifier(
        records: &MemoryBusinessRecords,
        scheduler: &MemoryActivityScheduler,
        fallback: Option<i64>,
    ) -> EscalationNotifier {
        EscalationNotifier::new(
            Arc::new(records.clone()),
            Arc::new(scheduler.clone()),
            ReferenceFormat::new("SNSVT-", 20),
            fallback,
        )
    }

    #[tokio::test]
    async fn order_owner_receives_task() {
        let records = MemoryBusinessRecords::new();
        records.add_order(7, "S00042", Some(12)).await;
        let scheduler = MemoryActivityScheduler::new();

        notifier(&records, &scheduler, Some(99))
            .escalate_late_failure(&done_tx("S00042-2").await, &AcquirerEventKind::Cancelled)
            .await;

        let tasks = scheduler.scheduled().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].target, ActivityTarget::SaleOrder(7));
        assert_eq!(tasks[0].assignee_user_id, Some(12));
    }

    #[tokio::test]
    async fn invoice_fallback_and_fallback_user() {
        let records = MemoryBusinessRecords::new();
        records.add_invoice(3, "INV-0001", None).await;
        let scheduler = MemoryActivityScheduler::new();

        notifier(&records, &scheduler, Some(99))
            .escalate_late_failure(&done_tx("INV-0001").await, &AcquirerEventKind::parse("refused"))
            .await;

        let tasks = scheduler.scheduled().await;
        assert_eq!(tasks[0].target, ActivityTarget::Invoice(3));
        assert_eq!(tasks[0].assignee_user_id, Some(99));
        assert!(tasks[0].summary.contains("refused"));
    }

    #[tokio::test]
    async fn retried_reference_falls_back_to_base_record() {
        let records = MemoryBusinessRecords::new();
        records.add_order(8, "S00042", None).await;
        records.add_invoice(9, "S00042-2", None).await;
        records.add_order(10, "S00077", None).await;
        let scheduler = MemoryActivityScheduler::new();
        let notifier = notifier(&records, &scheduler, None);

        // exact name wins over the base
        notifier
            .escalate_late_failure(&done_tx("S00042-2").await, &AcquirerEventKind::Cancelled)
            .await;
        notifier
            .escalate_late_failure(&done_tx("S00077-3").await, &AcquirerEventKind::Cancelled)
            .await;

        let tasks = scheduler.scheduled().await;
        assert_eq!(tasks[0].target, ActivityTarget::Invoice(9));
        assert_eq!(tasks[1].target, ActivityTarget::SaleOrder(10));
    }

    #[tokio::test]
    async fn unowned_task_is_still_scheduled() {
        let records = MemoryBusinessRecords::new();
        let scheduler = MemoryActivityScheduler::new();
        let tx = done_tx("S00099").await;

        notifier(&records, &scheduler, None)
            .escalate_late_failure(&tx, &AcquirerEventKind::Cancelled)
            .await;

        let tasks = scheduler.scheduled().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].target, ActivityTarget::Transaction(tx.id));
        assert_eq!(tasks[0].assignee_user_id, None);
    }
}
