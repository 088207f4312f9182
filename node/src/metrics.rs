//! # Prometheus Metrics
//!
//! Counters for block and transaction outcomes plus verification latency.
//! Everything lives in a dedicated [`prometheus::Registry`] with the `cloak`
//! prefix; [`NodeMetrics::encode`] renders it in text exposition format.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Blocks connected to their shard.
    pub blocks_connected_total: IntCounter,
    /// Blocks refused, by reason.
    pub blocks_rejected_total: IntCounterVec,
    /// Transactions inside connected blocks.
    pub transactions_verified_total: IntCounter,
    /// Transactions inside refused blocks.
    pub transactions_rejected_total: IntCounter,
    /// Best height per shard.
    pub best_height: IntGaugeVec,
    /// Wall time of one `connect_block`, in seconds.
    pub verification_latency_seconds: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("cloak".into()), None)?;

        let blocks_connected_total =
            IntCounter::new("blocks_connected_total", "Blocks connected to their shard")?;
        registry.register(Box::new(blocks_connected_total.clone()))?;

        let blocks_rejected_total = IntCounterVec::new(
            Opts::new("blocks_rejected_total", "Blocks refused by the ledger"),
            &["reason"],
        )?;
        registry.register(Box::new(blocks_rejected_total.clone()))?;

        let transactions_verified_total = IntCounter::new(
            "transactions_verified_total",
            "Transactions verified inside connected blocks",
        )?;
        registry.register(Box::new(transactions_verified_total.clone()))?;

        let transactions_rejected_total = IntCounter::new(
            "transactions_rejected_total",
            "Transactions carried by refused blocks",
        )?;
        registry.register(Box::new(transactions_rejected_total.clone()))?;

        let best_height = IntGaugeVec::new(
            Opts::new("best_height", "Height of the best block of each shard"),
            &["shard"],
        )?;
        registry.register(Box::new(best_height.clone()))?;

        let verification_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "verification_latency_seconds",
                "Time to verify and persist one block",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(verification_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            blocks_connected_total,
            blocks_rejected_total,
            transactions_verified_total,
            transactions_rejected_total,
            best_height,
            verification_latency_seconds,
        })
    }

    pub fn record_height(&self, shard_id: u8, height: u64) {
        self.best_height
            .with_label_values(&[&shard_id.to_string()])
            .set(height as i64);
    }

    /// All registered metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_prefix_and_labels() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.blocks_connected_total.inc();
        metrics.blocks_rejected_total.with_label_values(&["transaction"]).inc();
        metrics.record_height(3, 42);

        let text = metrics.encode().unwrap();
        assert!(text.contains("cloak_blocks_connected_total 1"));
        assert!(text.contains(r#"cloak_blocks_rejected_total{reason="transaction"} 1"#));
        assert!(text.contains(r#"cloak_best_height{shard="3"} 42"#));
    }
}
