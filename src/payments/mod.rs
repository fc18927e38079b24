//! Acquirer-facing types and the payment lookup client.

pub mod error;
pub mod provider;
pub mod providers;
pub mod reference;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use provider::PaymentLookup;
pub use reference::ReferenceFormat;
pub use types::{AcquirerEventKind, TransactionState};
