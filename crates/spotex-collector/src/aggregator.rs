use std::sync::Arc;

use spotex_metrics::GaugeMetric;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

use crate::sample::PriceSample;

/// Installs streamed samples into the spot price gauge family.
#[derive(Clone)]
pub struct SnapshotAggregator {
    prices: Arc<GaugeMetric>,
}

impl SnapshotAggregator {
    pub fn new(prices: Arc<GaugeMetric>) -> Self {
        Self { prices }
    }

    /// Drains `samples` until every sender is dropped and the buffer is
    /// empty. Returns the number of samples applied.
    pub async fn drain(&self, mut samples: mpsc::Receiver<PriceSample>) -> usize {
        let mut applied = 0;
        while let Some(sample) = samples.recv().await {
            let key = sample.label_key();
            let labels = key.label_values();
            if let Some(previous) = self.prices.value(&labels) {
                debug!(?key, previous, price = sample.price, "overwriting spot price");
            } else {
                debug!(?key, price = sample.price, "setting spot price");
            }
            self.prices.set(&labels, sample.price);
            applied += 1;
        }
        debug!(applied, series = self.prices.series_count(), "spot price snapshot complete");
        applied
    }

    /// Runs [`Self::drain`] on its own task.
    pub fn spawn(self, samples: mpsc::Receiver<PriceSample>) -> JoinHandle<usize> {
        tokio::spawn(async move { self.drain(samples).await })
    }
}
