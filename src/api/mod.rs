//! HTTP handlers for acquirer webhooks and client result calls

pub mod results;
pub mod webhooks;
