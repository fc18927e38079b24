//! Card-payment settlement backend: acquirer webhooks, client result
//! confirmation and reconciliation against the acquirer's payment queries.

pub mod api;
pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
