pub mod registry;
pub mod types;

pub use registry::{Collector, CounterMetric, GaugeMetric, Metric, MetricsRegistry, fq_name};
pub use types::{CollectedMetric, MetricDescriptor, MetricSample, MetricType, MetricValue};
