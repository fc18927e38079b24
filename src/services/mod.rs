//! Services module for settlement business logic

pub mod key_vault;
pub mod ledger;
pub mod notification;
pub mod reconciliation;
pub mod result_processor;
pub mod settlement;
pub mod webhook_processor;

pub use key_vault::{KeyCheck, KeyVault};
pub use ledger::Ledger;
pub use reconciliation::ReconciliationSearch;
pub use result_processor::{ResultOutcome, ResultProcessor};
pub use settlement::{SettlementOutcome, SettlementPolicy, SettlementStateMachine};
pub use webhook_processor::{WebhookOutcome, WebhookProcessor};
