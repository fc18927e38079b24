use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::middleware::error::{get_request_id_from_headers, success_response};
use crate::payments::utils::secure_eq;
use crate::services::result_processor::ResultProcessor;

pub struct ResultState {
    pub processor: Arc<ResultProcessor>,
    pub api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResultRequest {
    pub transaction_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResultAcknowledgement {
    pub message: &'static str,
}

/// POST /payments/result/{*reference}
pub async fn handle_result(
    State(state): State<Arc<ResultState>>,
    Path(reference): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ResultRequest>, JsonRejection>,
) -> Response {
    let request_id = get_request_id_from_headers(&headers);

    if let Some(expected) = state.api_token.as_deref() {
        if !bearer_matches(&headers, expected) {
            warn!("Result call without a valid bearer token");
            return AppError::domain(DomainError::CallerRejected)
                .with_context("missing or invalid bearer token")
                .with_request_id(request_id)
                .into_response();
        }
    }

    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
                field: "body".to_string(),
                reason: rejection.body_text(),
            }))
            .with_request_id(request_id)
            .into_response();
        }
    };
    let transaction_key = payload.transaction_key.unwrap_or_default();

    match state.processor.confirm(&reference, &transaction_key).await {
        Ok(outcome) => {
            info!(reference = %reference, outcome = ?outcome, "Result call handled");
            success_response(
                StatusCode::OK,
                ResultAcknowledgement {
                    message: outcome.message(),
                },
            )
        }
        Err(e) => AppError::from(e).with_request_id(request_id).into_response(),
    }
}

fn bearer_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| secure_eq(token.trim().as_bytes(), expected.as_bytes()))
        .unwrap_or(false)
}
