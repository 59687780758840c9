pub mod aggregator;
pub mod build_info;
pub mod exporter;
pub mod fetcher;
pub mod orchestrator;
pub mod sample;

#[cfg(test)]
mod testing;

pub use aggregator::SnapshotAggregator;
pub use build_info::{VERSION, register_build_info};
pub use exporter::{ExporterConfig, NAMESPACE, SpotMarketExporter};
pub use fetcher::{PriceError, ScrapeError, fetch_region};
pub use orchestrator::{ScrapeOrchestrator, ScrapeReport};
pub use sample::{LabelKey, PRICE_LABELS, PriceSample};
