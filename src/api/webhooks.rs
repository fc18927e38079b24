use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::middleware::error::get_request_id_from_headers;
use crate::services::webhook_processor::{WebhookOutcome, WebhookProcessor, WebhookProcessorError};

pub struct WebhookState {
    pub processor: Arc<WebhookProcessor>,
    pub trust_forwarded_for: bool,
}

/// POST /webhooks/worldpay
pub async fn handle_webhook(
    State(state): State<Arc<WebhookState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = get_request_id_from_headers(&headers);
    let origin = resolve_origin(&headers, peer, state.trust_forwarded_for);

    if let Err(e) = state.processor.check_origin(origin) {
        return AppError::domain(DomainError::OriginRejected {
            origin: origin.to_string(),
        })
        .with_context(e.to_string())
        .with_request_id(request_id)
        .into_response();
    }

    match state.processor.process(&body).await {
        Ok(outcome) => {
            match &outcome {
                WebhookOutcome::Processed(result) => {
                    info!(origin = %origin, outcome = ?result, "Webhook processed successfully")
                }
                WebhookOutcome::UnknownReference => {
                    info!(origin = %origin, "Webhook for unknown reference acknowledged")
                }
                WebhookOutcome::Informational | WebhookOutcome::TokenizationNotice => {}
            }
            acknowledge()
        }
        Err(WebhookProcessorError::MalformedPayload(reason)) => {
            warn!(origin = %origin, reason = %reason, "Malformed webhook payload");
            AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
                field: "eventDetails".to_string(),
                reason,
            }))
            .with_request_id(request_id)
            .into_response()
        }
        Err(e) => {
            // acknowledged anyway: redelivery would hit the same failure
            error!(origin = %origin, error = %e, "Webhook processing failed");
            acknowledge()
        }
    }
}

fn acknowledge() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"message": "OK"}))).into_response()
}

/// The socket peer, or the first `X-Forwarded-For` hop when the deployment
/// sits behind a trusted proxy.
pub fn resolve_origin(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    peer.ip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "10.1.1.1:4000".parse().unwrap()
    }

    #[test]
    fn forwarded_for_is_ignored_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("34.246.73.11, 10.0.0.2"));

        assert_eq!(resolve_origin(&headers, peer(), false), peer().ip());
        assert_eq!(
            resolve_origin(&headers, peer(), true),
            "34.246.73.11".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn garbage_forwarded_for_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("unknown"));
        assert_eq!(resolve_origin(&headers, peer(), true), peer().ip());
    }
}
