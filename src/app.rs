//! Service wiring shared by the binary and the integration tests

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

use crate::api::results::{handle_result, ResultState};
use crate::api::webhooks::{handle_webhook, WebhookState};
use crate::config::AppConfig;
use crate::database::activity_repository::ActivityRepository;
use crate::database::ledger_repository::LedgerRepository;
use crate::database::memory::{
    MemoryActivityScheduler, MemoryBusinessRecords, MemoryLedgerStore, MemoryTransactionStore,
};
use crate::database::repository::{
    ActivityScheduler, BusinessRecordDirectory, LedgerStore, TransactionStore,
};
use crate::database::transaction_repository::TransactionRepository;
use crate::health::{self, HealthChecker};
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::payments::provider::PaymentLookup;
use crate::payments::reference::ReferenceFormat;
use crate::services::{
    notification::EscalationNotifier, KeyVault, Ledger, ReconciliationSearch, ResultProcessor,
    SettlementPolicy, SettlementStateMachine, WebhookProcessor,
};

/// The persistence collaborators every service is built on.
#[derive(Clone)]
pub struct Stores {
    pub transactions: Arc<dyn TransactionStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub directory: Arc<dyn BusinessRecordDirectory>,
    pub scheduler: Arc<dyn ActivityScheduler>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        let activities = Arc::new(ActivityRepository::new(pool.clone()));
        Self {
            transactions: Arc::new(TransactionRepository::new(pool.clone())),
            ledger: Arc::new(LedgerRepository::new(pool)),
            directory: activities.clone(),
            scheduler: activities,
        }
    }

    pub fn memory() -> Self {
        Self::from_memory(
            MemoryTransactionStore::new(),
            MemoryLedgerStore::new(),
            MemoryBusinessRecords::new(),
            MemoryActivityScheduler::new(),
        )
    }

    /// Keeps the caller's handles so tests can seed and inspect.
    pub fn from_memory(
        transactions: MemoryTransactionStore,
        ledger: MemoryLedgerStore,
        directory: MemoryBusinessRecords,
        scheduler: MemoryActivityScheduler,
    ) -> Self {
        Self {
            transactions: Arc::new(transactions),
            ledger: Arc::new(ledger),
            directory: Arc::new(directory),
            scheduler: Arc::new(scheduler),
        }
    }
}

pub struct Services {
    pub key_vault: KeyVault,
    pub settlement: Arc<SettlementStateMachine>,
    pub webhooks: Arc<WebhookProcessor>,
    pub results: Arc<ResultProcessor>,
}

impl Services {
    pub fn build(config: &AppConfig, stores: &Stores, lookup: Arc<dyn PaymentLookup>) -> Self {
        let format = ReferenceFormat::from(&config.reference);
        let provider_id = config.acquirer.provider_id;
        let currency = config.acquirer.settlement_currency.clone();

        let escalation = EscalationNotifier::new(
            stores.directory.clone(),
            stores.scheduler.clone(),
            format.clone(),
            config.escalation.fallback_user_id,
        );
        let settlement = Arc::new(SettlementStateMachine::new(
            stores.transactions.clone(),
            escalation,
            SettlementPolicy {
                wait_attempts: config.settlement.wait_attempts,
                wait_interval: config.settlement.wait_interval,
            },
        ));

        let ledger = Ledger::new(stores.ledger.clone());
        let key_vault = KeyVault::new(stores.transactions.clone());
        let search = ReconciliationSearch::new(
            lookup,
            ledger.clone(),
            format.clone(),
            currency.clone(),
            config.settlement.search_pause,
        );

        let webhooks = Arc::new(WebhookProcessor::new(
            stores.transactions.clone(),
            settlement.clone(),
            format.clone(),
            provider_id,
            currency,
            config.webhook.allowed_ips.clone(),
        ));
        let results = Arc::new(ResultProcessor::new(
            stores.transactions.clone(),
            key_vault.clone(),
            search,
            ledger,
            settlement.clone(),
            format,
            provider_id,
        ));

        Self {
            key_vault,
            settlement,
            webhooks,
            results,
        }
    }
}

pub fn build_router(config: &AppConfig, services: &Services, health_checker: HealthChecker) -> Router {
    let webhook_routes = Router::new()
        .route("/webhooks/worldpay", post(handle_webhook))
        .with_state(Arc::new(WebhookState {
            processor: services.webhooks.clone(),
            trust_forwarded_for: config.webhook.trust_forwarded_for,
        }));

    let result_routes = Router::new()
        .route("/payments/result/{*reference}", post(handle_result))
        .with_state(Arc::new(ResultState {
            processor: services.results.clone(),
            api_token: config.result_api.api_token.clone(),
        }));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/health/live", get(health::liveness))
        .with_state(health_checker);

    Router::new()
        .merge(webhook_routes)
        .merge(result_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}
