#![allow(dead_code)]

use axum::extract::connect_info::MockConnectInfo;
use axum::Router;
use settlement_backend::app::{build_router, Services, Stores};
use settlement_backend::config::{
    AcquirerConfig, AcquirerEnvironment, AppConfig, EscalationConfig, LogFormat, LoggingConfig,
    ReferenceConfig, ResultApiConfig, ServerConfig, SettlementConfig, WebhookConfig,
};
use settlement_backend::database::memory::{
    MemoryActivityScheduler, MemoryBusinessRecords, MemoryLedgerStore, MemoryTransactionStore,
};
use settlement_backend::health::HealthChecker;
use settlement_backend::payments::providers::{WorldpayConfig, WorldpayLookupClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const ACQUIRER_IP: &str = "34.246.73.11";
pub const PROVIDER_ID: i64 = 1;

pub fn test_config(acquirer_url: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        },
        database: None,
        logging: LoggingConfig {
            level: "DEBUG".to_string(),
            format: LogFormat::Plain,
        },
        acquirer: AcquirerConfig {
            environment: AcquirerEnvironment::Test,
            base_url: acquirer_url.to_string(),
            username: "user".to_string(),
            password: "secret".to_string(),
            provider_id: PROVIDER_ID,
            request_timeout: Duration::from_secs(2),
            settlement_currency: "GBP".to_string(),
        },
        reference: ReferenceConfig::default(),
        webhook: WebhookConfig {
            allowed_ips: vec![ACQUIRER_IP.parse().unwrap()],
            trust_forwarded_for: false,
        },
        settlement: SettlementConfig {
            search_pause: Duration::ZERO,
            ..SettlementConfig::default()
        },
        escalation: EscalationConfig {
            fallback_user_id: Some(99),
        },
        result_api: ResultApiConfig::default(),
    }
}

/// A fully wired service on in-memory stores, with handles for seeding and
/// inspecting them.
pub struct TestApp {
    pub config: AppConfig,
    pub services: Services,
    pub transactions: MemoryTransactionStore,
    pub ledger: MemoryLedgerStore,
    pub records: MemoryBusinessRecords,
    pub scheduler: MemoryActivityScheduler,
}

impl TestApp {
    pub fn new(config: AppConfig) -> Self {
        let transactions = MemoryTransactionStore::new();
        let ledger = MemoryLedgerStore::new();
        let records = MemoryBusinessRecords::new();
        let scheduler = MemoryActivityScheduler::new();
        let stores = Stores::from_memory(
            transactions.clone(),
            ledger.clone(),
            records.clone(),
            scheduler.clone(),
        );
        let lookup = Arc::new(
            WorldpayLookupClient::new(WorldpayConfig::from(&config.acquirer)).unwrap(),
        );
        let services = Services::build(&config, &stores, lookup);

        Self {
            config,
            services,
            transactions,
            ledger,
            records,
            scheduler,
        }
    }

    /// Router as seen from `peer`.
    pub fn router_from(&self, peer: &str) -> Router {
        let peer: SocketAddr = format!("{}:443", peer).parse().unwrap();
        build_router(&self.config, &self.services, HealthChecker::new(None))
            .layer(MockConnectInfo(peer))
    }

    pub fn router(&self) -> Router {
        self.router_from(ACQUIRER_IP)
    }
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
