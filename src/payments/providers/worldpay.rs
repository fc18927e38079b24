use crate::config::AcquirerConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentLookup;
use crate::payments::types::PaymentQueryResponse;
use crate::payments::utils::{AcquirerHttpClient, BasicCredentials};
use async_trait::async_trait;
use reqwest::Url;
use tracing::info;

const PAYMENT_QUERIES_PATH: &str = "/paymentQueries/payments";
const PAYMENT_QUERIES_ACCEPT: &str = "application/vnd.worldpay.payment-queries-v1.hal+json";
const USER_AGENT: &str = "settlement-backend";

#[derive(Debug, Clone)]
pub struct WorldpayConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: std::time::Duration,
}

impl From<&AcquirerConfig> for WorldpayConfig {
    fn from(config: &AcquirerConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: config.request_timeout,
        }
    }
}

pub struct WorldpayLookupClient {
    config: WorldpayConfig,
    http: AcquirerHttpClient,
}

impl WorldpayLookupClient {
    pub fn new(config: WorldpayConfig) -> PaymentResult<Self> {
        let http = AcquirerHttpClient::new(config.timeout, USER_AGENT)?;
        Ok(Self { config, http })
    }

    fn lookup_url(&self, reference: &str) -> PaymentResult<Url> {
        let endpoint = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            PAYMENT_QUERIES_PATH
        );
        Url::parse_with_params(&endpoint, &[("transactionReference", reference)]).map_err(|e| {
            PaymentError::ValidationError {
                message: format!("invalid acquirer base URL: {}", e),
                field: Some("base_url".to_string()),
            }
        })
    }
}

#[async_trait]
impl PaymentLookup for WorldpayLookupClient {
    async fn lookup_payments(&self, reference: &str) -> PaymentResult<PaymentQueryResponse> {
        if reference.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "transaction reference is required".to_string(),
                field: Some("transactionReference".to_string()),
            });
        }

        let url = self.lookup_url(reference)?;
        info!(reference = %reference, "querying acquirer for payments");

        self.http
            .get_json::<PaymentQueryResponse>(
                url,
                Some(BasicCredentials {
                    username: &self.config.username,
                    password: &self.config.password,
                }),
                &[("Accept", PAYMENT_QUERIES_ACCEPT)],
            )
            .await
    }

    fn name(&self) -> &'static str {
        "worldpay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(base_url: String) -> WorldpayLookupClient {
        WorldpayLookupClient::new(WorldpayConfig {
            base_url,
            username: "user".to_string(),
            password: "secret".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[test]
    fn lookup_url_encodes_reference() {
        let client = client_for("https://try.access.worldpay.com/".to_string());
        let url = client.lookup_url("SNSVT-S 1&2").unwrap();
        assert_eq!(url.path(), "/paymentQueries/payments");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![("transactionReference".to_string(), "SNSVT-S 1&2".to_string())]
        );
    }

    #[tokio::test]
    async fn sends_basic_auth_and_accept_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paymentQueries/payments"))
            .and(query_param("transactionReference", "SNSVT-S0001"))
            .and(header("Accept", PAYMENT_QUERIES_ACCEPT))
            // base64("user:secret")
            .and(header("Authorization", "Basic dXNlcjpzZWNyZXQ="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "_embedded": {
                    "payments": [
                        {"transactionReference": "SNSVT-S0001", "value": {"amount": 1000, "currency": "GBP"}}
                    ]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(server.uri())
            .lookup_payments("SNSVT-S0001")
            .await
            .unwrap();
        let payments = response.embedded.unwrap().payments;
        assert_eq!(payments[0].value.as_ref().unwrap().amount, Some(1000));
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(server.uri())
            .lookup_payments("SNSVT-S0001")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::UpstreamStatus { status: 500, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn non_json_success_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let err = client_for(server.uri())
            .lookup_payments("SNSVT-S0001")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::MalformedResponse { .. }));
    }
}
