use crate::payments::error::PaymentResult;
use crate::payments::types::PaymentQueryResponse;
use async_trait::async_trait;

/// Read-only lookup of payments the acquirer holds for a reference.
#[async_trait]
pub trait PaymentLookup: Send + Sync {
    async fn lookup_payments(&self, reference: &str) -> PaymentResult<PaymentQueryResponse>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{AcquirerPayment, EmbeddedPayments, PaymentValue};

    struct MockLookup;

    #[async_trait]
    impl PaymentLookup for MockLookup {
        async fn lookup_payments(&self, reference: &str) -> PaymentResult<PaymentQueryResponse> {
            Ok(PaymentQueryResponse {
                embedded: Some(EmbeddedPayments {
                    payments: vec![AcquirerPayment {
                        transaction_reference: Some(reference.to_string()),
                        value: Some(PaymentValue {
                            amount: Some(1000),
                            currency: Some("GBP".to_string()),
                        }),
                    }],
                }),
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn trait_object_is_usable() {
        let lookup: Box<dyn PaymentLookup> = Box::new(MockLookup);
        let response = lookup.lookup_payments("SNSVT-S0001").await.unwrap();
        let payments = response.embedded.unwrap().payments;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].transaction_reference.as_deref(), Some("SNSVT-S0001"));
        assert_eq!(lookup.name(), "mock");
    }
}
