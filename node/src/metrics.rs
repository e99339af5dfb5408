//! # Prometheus Metrics
//!
//! Counters for every stage of a login, scraped at `/metrics` on the metrics
//! port. Registered in a dedicated [`prometheus::Registry`] prefixed `sqrl_`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Metric handles shared by the request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Nuts handed to browsers by `/nut.json` and `/login`.
    pub nuts_issued_total: IntCounter,
    /// `/cli.sqrl` requests answered without `COMMAND_FAILED`.
    pub transactions_verified_total: IntCounter,
    /// `/cli.sqrl` requests answered with `COMMAND_FAILED`.
    pub transactions_rejected_total: IntCounter,
    /// Tokens minted by a successful `ident`, one per login.
    pub tokens_issued_total: IntCounter,
    /// Redirect URLs answered to `/pag.sqrl` polls.
    pub redirects_served_total: IntCounter,
    /// Tokens successfully redeemed at `/token`.
    pub tokens_exchanged_total: IntCounter,
    /// Time spent in the service handling one `/cli.sqrl` request.
    pub verification_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("sqrl".into()), None)?;

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let nuts_issued_total = counter("nuts_issued_total", "Nuts issued to login pages")?;
        let transactions_verified_total = counter(
            "transactions_verified_total",
            "Client transactions accepted",
        )?;
        let transactions_rejected_total = counter(
            "transactions_rejected_total",
            "Client transactions answered with command failed",
        )?;
        let tokens_issued_total = counter("tokens_issued_total", "Tokens minted by successful idents")?;
        let redirects_served_total = counter(
            "redirects_served_total",
            "Login redirects answered to browser polls",
        )?;
        let tokens_exchanged_total = counter(
            "tokens_exchanged_total",
            "Tokens redeemed for a user id",
        )?;

        let verification_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "verification_latency_seconds",
                "Time to verify and answer one client transaction",
            )
            .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]),
        )?;
        registry.register(Box::new(verification_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            nuts_issued_total,
            transactions_verified_total,
            transactions_rejected_total,
            tokens_issued_total,
            redirects_served_total,
            tokens_exchanged_total,
            verification_latency_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_includes_prefixed_names() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.nuts_issued_total.inc();
        metrics.verification_latency_seconds.observe(0.002);

        let text = metrics.encode().unwrap();
        assert!(text.contains("sqrl_nuts_issued_total 1"));
        assert!(text.contains("sqrl_transactions_rejected_total 0"));
        assert!(text.contains("sqrl_redirects_served_total 0"));
        assert!(text.contains("sqrl_verification_latency_seconds_bucket"));
    }

    #[test]
    fn registries_are_independent() {
        let a = NodeMetrics::new().unwrap();
        let b = NodeMetrics::new().unwrap();
        a.tokens_exchanged_total.inc();
        assert_eq!(b.tokens_exchanged_total.get(), 0);
    }
}
