pub mod worldpay;

pub use worldpay::{WorldpayConfig, WorldpayLookupClient};
