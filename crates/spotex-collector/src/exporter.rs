use std::sync::Arc;

use async_trait::async_trait;
use spotex_auth::CredentialProvider;
use spotex_common::error::Result;
use spotex_ec2::{Ec2Client, Ec2Config, SpotPriceSource};
use spotex_metrics::{
    CollectedMetric, Collector, CounterMetric, GaugeMetric, Metric, MetricDescriptor, fq_name,
};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, warn};

use crate::{
    aggregator::SnapshotAggregator,
    orchestrator::{ScrapeOrchestrator, ScrapeReport},
    sample::PRICE_LABELS,
};

pub const NAMESPACE: &str = "aws_spot_market_exporter";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Buffer between region fetchers and the aggregator. A full buffer
    /// makes fetchers wait.
    pub channel_capacity: usize,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Exposes AWS spot prices for every region, refreshed on each collect.
///
/// Collects are serialized: a second caller waits until the running cycle
/// has fetched, aggregated and read out its snapshot.
pub struct SpotMarketExporter {
    orchestrator: ScrapeOrchestrator,
    spot_prices: Arc<GaugeMetric>,
    duration: GaugeMetric,
    scrape_errors: GaugeMetric,
    total_scrapes: CounterMetric,
    channel_capacity: usize,
    cycle: Mutex<()>,
}

impl SpotMarketExporter {
    pub fn new(source: Arc<dyn SpotPriceSource>, config: ExporterConfig) -> Self {
        Self {
            orchestrator: ScrapeOrchestrator::new(source),
            spot_prices: Arc::new(GaugeMetric::new(
                &fq_name(NAMESPACE, "spot_price"),
                "Current market price of a spot instance, per hour, in dollars",
                &PRICE_LABELS,
            )),
            duration: GaugeMetric::new(
                &fq_name(NAMESPACE, "scrape_duration_seconds"),
                "The scrape duration.",
                &[],
            ),
            scrape_errors: GaugeMetric::new(
                &fq_name(NAMESPACE, "scrape_error"),
                "The scrape error status.",
                &[],
            ),
            total_scrapes: CounterMetric::new(
                &fq_name(NAMESPACE, "scrapes_total"),
                "Total AWS spot market scrapes.",
                &[],
            ),
            channel_capacity: config.channel_capacity.max(1),
            cycle: Mutex::new(()),
        }
    }

    /// Opens the EC2 session and builds the exporter on top of it. A failure
    /// here means no cycle could ever succeed.
    pub fn connect(
        ec2: Ec2Config,
        credentials: &dyn CredentialProvider,
        config: ExporterConfig,
    ) -> Result<Self> {
        let client = Ec2Client::new(ec2, credentials)?;
        Ok(Self::new(Arc::new(client), config))
    }

    /// Runs one full cycle: drops the previous snapshot, fans out over every
    /// region, waits for the aggregator, then updates the cycle metrics and
    /// reads everything out.
    pub async fn scrape(&self) -> Vec<CollectedMetric> {
        let _cycle = self.cycle.lock().await;

        self.spot_prices.reset();
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let aggregator = SnapshotAggregator::new(Arc::clone(&self.spot_prices)).spawn(rx);

        let report = self.orchestrator.scrape(tx).await;
        let applied = match aggregator.await {
            Ok(applied) => applied,
            Err(err) => {
                error!(error = %err, "spot price aggregator did not complete");
                0
            }
        };

        self.record_cycle(&report, applied);

        vec![
            self.duration.snapshot(),
            self.total_scrapes.snapshot(),
            self.scrape_errors.snapshot(),
            self.spot_prices.snapshot(),
        ]
    }

    fn record_cycle(&self, report: &ScrapeReport, applied: usize) {
        self.total_scrapes.inc_one(&[]);
        self.scrape_errors.set(&[], report.errors as f64);
        self.duration.set(&[], report.duration.as_secs_f64());

        if report.errors > 0 {
            warn!(
                regions = report.regions,
                failed_regions = report.failed_regions,
                errors = report.errors,
                series = applied,
                duration_ms = report.duration.as_millis() as u64,
                "spot market scrape finished with errors"
            );
        } else {
            debug!(
                regions = report.regions,
                series = applied,
                duration_ms = report.duration.as_millis() as u64,
                "spot market scrape finished"
            );
        }
    }
}

#[async_trait]
impl Collector for SpotMarketExporter {
    fn describe(&self) -> Vec<MetricDescriptor> {
        vec![
            self.duration.descriptor(),
            self.total_scrapes.descriptor(),
            self.scrape_errors.descriptor(),
            self.spot_prices.descriptor(),
        ]
    }

    async fn collect(&self) -> Vec<CollectedMetric> {
        self.scrape().await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex as StdMutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use spotex_auth::StaticCredentialProvider;
    use spotex_common::error::SpotexError;
    use spotex_ec2::{SpotPriceHistoryPage, SpotPriceHistoryRequest};
    use spotex_metrics::{MetricValue, MetricsRegistry};

    use super::*;
    use crate::testing::{FakeSource, record};

    fn family<'a>(metrics: &'a [CollectedMetric], suffix: &str) -> &'a CollectedMetric {
        let name = fq_name(NAMESPACE, suffix);
        metrics
            .iter()
            .find(|metric| metric.descriptor.name == name)
            .unwrap()
    }

    fn scalar(metrics: &[CollectedMetric], suffix: &str) -> f64 {
        let samples = &family(metrics, suffix).samples;
        assert_eq!(samples.len(), 1);
        samples[0].value.as_f64()
    }

    fn exporter(source: FakeSource) -> SpotMarketExporter {
        SpotMarketExporter::new(Arc::new(source), ExporterConfig::default())
    }

    #[tokio::test]
    async fn one_parseable_record_across_two_regions() {
        let exporter = exporter(FakeSource::with_regions(&["a", "b"]).page(
            "a",
            vec![record(Some("0.0123"), "a-1", "Linux/UNIX", "t3.micro")],
        ));

        let metrics = exporter.collect().await;

        let prices = family(&metrics, "spot_price");
        assert_eq!(prices.samples.len(), 1);
        assert_eq!(
            prices.samples[0].labels,
            vec![
                ("region".to_string(), "a".to_string()),
                ("az".to_string(), "a-1".to_string()),
                ("product".to_string(), "Linux/UNIX".to_string()),
                ("instance_type".to_string(), "t3.micro".to_string()),
            ]
        );
        assert_eq!(prices.samples[0].value, MetricValue::Gauge(0.0123));
        assert_eq!(scalar(&metrics, "scrape_error"), 0.0);
        assert_eq!(scalar(&metrics, "scrapes_total"), 1.0);
        assert!(scalar(&metrics, "scrape_duration_seconds") >= 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_spans_discovery_through_slowest_region() {
        let regions = ["a", "b", "c", "d"];
        let exporter = exporter(
            FakeSource::with_regions(&regions)
                .page("a", vec![record(Some("0.5"), "a-1", "Linux/UNIX", "t3.micro")])
                .delayed(Duration::from_secs(5)),
        );

        let metrics = exporter.collect().await;

        let duration = scalar(&metrics, "scrape_duration_seconds");
        assert!(duration >= 5.0, "duration {duration}");
        assert!(duration < 5.0 * regions.len() as f64 / 2.0, "duration {duration}");
        assert_eq!(family(&metrics, "spot_price").samples.len(), 1);
    }

    #[tokio::test]
    async fn unparseable_price_reports_one_error() {
        let exporter = exporter(
            FakeSource::with_regions(&["a"])
                .page("a", vec![record(Some("abc"), "a-1", "Linux/UNIX", "t3.micro")]),
        );

        let metrics = exporter.collect().await;

        assert!(family(&metrics, "spot_price").samples.is_empty());
        assert_eq!(scalar(&metrics, "scrape_error"), 1.0);
        assert_eq!(scalar(&metrics, "scrapes_total"), 1.0);
    }

    #[tokio::test]
    async fn discovery_failure_still_completes_and_next_cycle_runs() {
        let exporter = exporter(FakeSource::failing_discovery());

        let first = exporter.collect().await;
        assert!(family(&first, "spot_price").samples.is_empty());
        assert!(scalar(&first, "scrape_error") >= 1.0);

        let second = exporter.collect().await;
        assert!(scalar(&second, "scrape_error") >= 1.0);
        assert_eq!(scalar(&second, "scrapes_total"), 2.0);
    }

    #[tokio::test]
    async fn previous_cycle_series_are_dropped() {
        let exporter = exporter(
            FakeSource::with_regions(&["a"])
                .page("a", vec![record(Some("0.5"), "a-1", "Linux/UNIX", "t3.micro")])
                .failing_discovery_from(1),
        );

        let first = exporter.collect().await;
        assert_eq!(family(&first, "spot_price").samples.len(), 1);

        let second = exporter.collect().await;
        assert!(family(&second, "spot_price").samples.is_empty());
        assert_eq!(scalar(&second, "scrape_error"), 1.0);
    }

    #[tokio::test]
    async fn describe_is_stable_across_collects() {
        let exporter = exporter(
            FakeSource::with_regions(&["a"])
                .page("a", vec![record(Some("0.5"), "a-1", "Linux/UNIX", "t3.micro")])
                .delayed(Duration::from_millis(20)),
        );

        let before = exporter.describe();
        let (_, during) = tokio::join!(exporter.collect(), async { exporter.describe() });
        exporter.collect().await;
        let after = exporter.describe();

        assert_eq!(before.len(), 4);
        assert_eq!(before, during);
        assert_eq!(before, after);
        assert_eq!(
            before[3].variable_labels,
            vec!["region", "az", "product", "instance_type"]
        );
    }

    /// Source that stamps every price with the number of the discovery call
    /// that started its cycle, and logs when each step happens.
    #[derive(Default)]
    struct CycleSource {
        cycles: AtomicUsize,
        events: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl SpotPriceSource for CycleSource {
        async fn describe_regions(&self) -> Result<Vec<String>> {
            let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
            self.events.lock().unwrap().push(format!("discover {cycle}"));
            Ok(vec!["a".to_string(), "b".to_string()])
        }

        async fn describe_spot_price_history(
            &self,
            request: &SpotPriceHistoryRequest,
        ) -> Result<SpotPriceHistoryPage> {
            let cycle = self.cycles.load(Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.events
                .lock()
                .unwrap()
                .push(format!("fetched {cycle} {}", request.region));
            let price = cycle.to_string();
            Ok(SpotPriceHistoryPage {
                records: vec![record(Some(&price), "z-1", "Linux/UNIX", "t3.micro")],
                next_token: None,
            })
        }
    }

    #[tokio::test]
    async fn concurrent_collects_never_interleave() {
        let source = Arc::new(CycleSource::default());
        let exporter = SpotMarketExporter::new(source.clone(), ExporterConfig::default());

        let (first, second) = tokio::join!(exporter.collect(), exporter.collect());

        for metrics in [&first, &second] {
            let prices = &family(metrics, "spot_price").samples;
            assert_eq!(prices.len(), 2);
            assert_eq!(prices[0].value, prices[1].value);
        }
        assert_ne!(
            family(&first, "spot_price").samples[0].value,
            family(&second, "spot_price").samples[0].value
        );

        let events = source.events.lock().unwrap().clone();
        let second_discovery = events.iter().position(|e| e == "discover 2").unwrap();
        let first_fetches = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.starts_with("fetched 1 "))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        assert_eq!(first_fetches.len(), 2);
        assert!(first_fetches.iter().all(|index| *index < second_discovery));
    }

    #[tokio::test]
    async fn registers_and_renders_through_registry() {
        let registry = MetricsRegistry::new();
        let exporter = Arc::new(exporter(FakeSource::with_regions(&["a"]).page(
            "a",
            vec![record(Some("0.0123"), "a-1", "Linux/UNIX", "t3.micro")],
        )));
        registry.register_collector(exporter).unwrap();

        let rendered = registry.render_prometheus().await;

        assert!(rendered.contains(
            "aws_spot_market_exporter_spot_price{region=\"a\",az=\"a-1\",product=\"Linux/UNIX\",instance_type=\"t3.micro\"} 0.0123\n"
        ));
        assert!(rendered.contains("aws_spot_market_exporter_scrapes_total 1\n"));
        assert!(rendered.contains("aws_spot_market_exporter_scrape_error 0\n"));
        assert!(rendered.contains("# TYPE aws_spot_market_exporter_scrapes_total counter\n"));
    }

    #[test]
    fn connect_fails_without_credentials() {
        let result = SpotMarketExporter::connect(
            Ec2Config::default(),
            &StaticCredentialProvider::new("", ""),
            ExporterConfig::default(),
        );
        assert!(matches!(result, Err(SpotexError::Credentials(_))));
    }
}
