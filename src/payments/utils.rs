use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Thin HTTP client for acquirer calls. Every request carries the same fixed
/// timeout and is attempted exactly once; callers decide what a failure means.
#[derive(Clone)]
pub struct AcquirerHttpClient {
    client: Client,
    timeout: Duration,
}

pub struct BasicCredentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl AcquirerHttpClient {
    pub fn new(timeout: Duration, user_agent: &str) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| PaymentError::NetworkError {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        credentials: Option<BasicCredentials<'_>>,
        additional_headers: &[(&str, &str)],
    ) -> PaymentResult<T> {
        let mut request = self.client.get(url.clone()).timeout(self.timeout);

        if let Some(creds) = credentials {
            request = request.basic_auth(creds.username, Some(creds.password));
        }
        for (k, v) in additional_headers {
            request = request.header(*k, *v);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PaymentError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                PaymentError::NetworkError {
                    message: format!("acquirer request failed: {}", e),
                }
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| PaymentError::NetworkError {
            message: format!("failed to read acquirer response: {}", e),
        })?;

        if !status.is_success() {
            warn!(status = %status, path = %url.path(), "acquirer returned non-success status");
            return Err(PaymentError::UpstreamStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(path = %url.path(), bytes = text.len(), "acquirer response received");
        serde_json::from_str::<T>(&text).map_err(|e| PaymentError::MalformedResponse {
            message: format!("invalid acquirer JSON response: {}", e),
        })
    }
}

/// Constant-time byte comparison.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
