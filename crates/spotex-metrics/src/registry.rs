use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use spotex_common::error::{Result, SpotexError};
use tracing::warn;

use crate::types::{CollectedMetric, MetricDescriptor, MetricSample, MetricType, MetricValue};

type LabelValues = Vec<String>;

/// A single metric family whose values live in process memory.
pub trait Metric: Send + Sync {
    fn descriptor(&self) -> MetricDescriptor;
    fn collect(&self) -> Vec<MetricSample>;

    fn snapshot(&self) -> CollectedMetric {
        CollectedMetric {
            descriptor: self.descriptor(),
            samples: self.collect(),
        }
    }
}

/// A source that produces its metric families on demand, once per scrape.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Static descriptors of every family `collect` may emit. Must not block
    /// on `collect`.
    fn describe(&self) -> Vec<MetricDescriptor>;

    async fn collect(&self) -> Vec<CollectedMetric>;
}

pub struct MetricsRegistry {
    metrics: RwLock<HashMap<String, Arc<dyn Metric>>>,
    collectors: RwLock<Vec<Arc<dyn Collector>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
            collectors: RwLock::new(Vec::new()),
        }
    }

    pub fn register_gauge(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
    ) -> Result<Arc<GaugeMetric>> {
        let metric = Arc::new(GaugeMetric::new(name, help, variable_labels));
        self.register(metric.clone())?;
        Ok(metric)
    }

    /// Registers a collector after checking that none of its descriptors
    /// clash with an already registered family.
    pub fn register_collector(&self, collector: Arc<dyn Collector>) -> Result<()> {
        let mut known = self.describe_all().into_iter().map(|d| d.name).collect::<HashSet<_>>();
        for descriptor in collector.describe() {
            if !known.insert(descriptor.name.clone()) {
                return Err(SpotexError::InvalidArgument(format!(
                    "metric already registered: {}",
                    descriptor.name
                )));
            }
        }

        self.collectors
            .write()
            .map_err(|_| {
                SpotexError::InternalError("failed to acquire collector registry lock".to_string())
            })?
            .push(collector);
        Ok(())
    }

    pub fn describe_all(&self) -> Vec<MetricDescriptor> {
        let mut descriptors: Vec<MetricDescriptor> = match self.metrics.read() {
            Ok(guard) => guard.values().map(|metric| metric.descriptor()).collect(),
            Err(_) => Vec::new(),
        };
        for collector in self.collectors_snapshot() {
            descriptors.extend(collector.describe());
        }

        descriptors.sort_by(|left, right| left.name.cmp(&right.name));
        descriptors
    }

    pub async fn gather(&self) -> Vec<CollectedMetric> {
        let mut collected: Vec<CollectedMetric> = match self.metrics.read() {
            Ok(guard) => guard.values().map(|metric| metric.snapshot()).collect(),
            Err(_) => Vec::new(),
        };

        for collector in self.collectors_snapshot() {
            collected.extend(collector.collect().await);
        }

        collected.sort_by(|left, right| left.descriptor.name.cmp(&right.descriptor.name));
        collected
    }

    pub async fn render_prometheus(&self) -> String {
        encode_text(&self.gather().await)
    }

    fn collectors_snapshot(&self) -> Vec<Arc<dyn Collector>> {
        match self.collectors.read() {
            Ok(guard) => guard.clone(),
            Err(_) => {
                warn!("collector registry lock poisoned");
                Vec::new()
            }
        }
    }

    fn register<M: Metric + 'static>(&self, metric: Arc<M>) -> Result<()> {
        let descriptor = metric.descriptor();
        let name = descriptor.name.clone();
        if self
            .collectors_snapshot()
            .iter()
            .flat_map(|collector| collector.describe())
            .any(|existing| existing.name == name)
        {
            return Err(SpotexError::InvalidArgument(format!(
                "metric already registered: {name}"
            )));
        }

        let mut metrics = self.metrics.write().map_err(|_| {
            SpotexError::InternalError("failed to acquire metrics registry lock".to_string())
        })?;

        if metrics.contains_key(&name) {
            return Err(SpotexError::InvalidArgument(format!(
                "metric already registered: {name}"
            )));
        }

        metrics.insert(name, metric);
        Ok(())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins a namespace and a metric name the Prometheus way.
pub fn fq_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}_{name}")
    }
}

pub struct CounterMetric {
    descriptor: MetricDescriptor,
    series: RwLock<HashMap<LabelValues, Arc<AtomicU64>>>,
}

impl CounterMetric {
    pub fn new(name: &str, help: &str, variable_labels: &[&str]) -> Self {
        Self {
            descriptor: MetricDescriptor::new(name, help, MetricType::Counter, variable_labels),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn inc(&self, labels: &[&str], value: u64) {
        let series = self.get_or_create_series(labels);
        series.fetch_add(value, Ordering::Relaxed);
    }

    pub fn inc_one(&self, labels: &[&str]) {
        self.inc(labels, 1);
    }

    fn get_or_create_series(&self, labels: &[&str]) -> Arc<AtomicU64> {
        let label_values = normalize_labels(&self.descriptor, labels);
        if let Ok(guard) = self.series.read()
            && let Some(existing) = guard.get(&label_values)
        {
            return existing.clone();
        }

        match self.series.write() {
            Ok(mut guard) => guard
                .entry(label_values)
                .or_insert_with(|| Arc::new(AtomicU64::new(0)))
                .clone(),
            Err(_) => Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Metric for CounterMetric {
    fn descriptor(&self) -> MetricDescriptor {
        self.descriptor.clone()
    }

    fn collect(&self) -> Vec<MetricSample> {
        let series = match self.series.read() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };

        let mut samples = series
            .iter()
            .map(|(label_values, value)| MetricSample {
                labels: materialize_labels(&self.descriptor, label_values),
                value: MetricValue::Counter(value.load(Ordering::Relaxed) as f64),
            })
            .collect::<Vec<_>>();
        samples.sort_by(|left, right| left.labels.cmp(&right.labels));
        samples
    }
}

/// Float gauge. Values are stored as raw `f64` bits.
pub struct GaugeMetric {
    descriptor: MetricDescriptor,
    series: RwLock<HashMap<LabelValues, Arc<AtomicU64>>>,
}

impl GaugeMetric {
    pub fn new(name: &str, help: &str, variable_labels: &[&str]) -> Self {
        Self {
            descriptor: MetricDescriptor::new(name, help, MetricType::Gauge, variable_labels),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, labels: &[&str], value: f64) {
        let series = self.get_or_create_series(labels);
        series.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn value(&self, labels: &[&str]) -> Option<f64> {
        let label_values = normalize_labels(&self.descriptor, labels);
        let guard = self.series.read().ok()?;
        guard
            .get(&label_values)
            .map(|value| f64::from_bits(value.load(Ordering::Relaxed)))
    }

    pub fn series_count(&self) -> usize {
        self.series.read().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Drops every series.
    pub fn reset(&self) {
        match self.series.write() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    fn get_or_create_series(&self, labels: &[&str]) -> Arc<AtomicU64> {
        let label_values = normalize_labels(&self.descriptor, labels);
        if let Ok(guard) = self.series.read()
            && let Some(existing) = guard.get(&label_values)
        {
            return existing.clone();
        }

        match self.series.write() {
            Ok(mut guard) => guard
                .entry(label_values)
                .or_insert_with(|| Arc::new(AtomicU64::new(0f64.to_bits())))
                .clone(),
            Err(_) => Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }
}

impl Metric for GaugeMetric {
    fn descriptor(&self) -> MetricDescriptor {
        self.descriptor.clone()
    }

    fn collect(&self) -> Vec<MetricSample> {
        let series = match self.series.read() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };

        let mut samples = series
            .iter()
            .map(|(label_values, value)| MetricSample {
                labels: materialize_labels(&self.descriptor, label_values),
                value: MetricValue::Gauge(f64::from_bits(value.load(Ordering::Relaxed))),
            })
            .collect::<Vec<_>>();
        samples.sort_by(|left, right| left.labels.cmp(&right.labels));
        samples
    }
}

/// Renders metric families in the Prometheus text exposition format.
pub fn encode_text(metrics: &[CollectedMetric]) -> String {
    let mut output = String::new();

    for metric in metrics {
        output.push_str("# HELP ");
        output.push_str(&metric.descriptor.name);
        output.push(' ');
        output.push_str(&escape_help(&metric.descriptor.help));
        output.push('\n');

        output.push_str("# TYPE ");
        output.push_str(&metric.descriptor.name);
        output.push(' ');
        output.push_str(metric.descriptor.metric_type.as_prometheus_type());
        output.push('\n');

        for sample in &metric.samples {
            output.push_str(&render_sample_line(
                &metric.descriptor.name,
                &sample.labels,
                sample.value.as_f64(),
            ));
        }
    }

    output
}

fn normalize_labels(descriptor: &MetricDescriptor, labels: &[&str]) -> LabelValues {
    let expected = descriptor.variable_labels.len();
    (0..expected)
        .map(|index| labels.get(index).copied().unwrap_or_default().to_string())
        .collect()
}

fn materialize_labels(descriptor: &MetricDescriptor, values: &[String]) -> Vec<(String, String)> {
    descriptor
        .variable_labels
        .iter()
        .zip(values.iter())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn render_sample_line(name: &str, labels: &[(String, String)], value: f64) -> String {
    let mut rendered = String::new();
    rendered.push_str(name);

    if !labels.is_empty() {
        rendered.push('{');
        for (index, (key, value)) in labels.iter().enumerate() {
            if index > 0 {
                rendered.push(',');
            }
            rendered.push_str(key);
            rendered.push_str("=\"");
            rendered.push_str(&escape_label_value(value));
            rendered.push('"');
        }
        rendered.push('}');
    }

    rendered.push(' ');
    rendered.push_str(&format_metric_value(value));
    rendered.push('\n');
    rendered
}

fn format_metric_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let rendered = if value.is_sign_positive() { "+Inf" } else { "-Inf" };
        rendered.to_string()
    } else if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}
