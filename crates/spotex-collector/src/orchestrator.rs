use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use spotex_ec2::SpotPriceSource;
use tokio::{sync::mpsc, task::JoinSet, time::Instant};
use tracing::{debug, error};

use crate::{fetcher::fetch_region, sample::PriceSample};

/// Outcome of one fan-out over every region.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrapeReport {
    pub regions: usize,
    pub failed_regions: usize,
    pub errors: u64,
    pub duration: Duration,
}

/// Discovers regions and fetches each of them on its own task.
#[derive(Clone)]
pub struct ScrapeOrchestrator {
    source: Arc<dyn SpotPriceSource>,
}

impl ScrapeOrchestrator {
    pub fn new(source: Arc<dyn SpotPriceSource>) -> Self {
        Self { source }
    }

    /// Runs one fan-out. Every region task gets a clone of `samples`; the
    /// stream closes once all of them have finished, which is also when this
    /// returns. A failed region discovery counts one error and fetches
    /// nothing.
    pub async fn scrape(&self, samples: mpsc::Sender<PriceSample>) -> ScrapeReport {
        let started_at = Instant::now();
        let errors = Arc::new(AtomicU64::new(0));

        let regions = match self.source.describe_regions().await {
            Ok(regions) => regions,
            Err(err) => {
                error!(error = %err, kind = err.kind(), "failed to list regions");
                errors.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
        };
        let region_count = regions.len();
        debug!(regions = region_count, "fetching spot prices");

        let mut tasks = JoinSet::new();
        for region in regions {
            let source = Arc::clone(&self.source);
            let samples = samples.clone();
            let errors = Arc::clone(&errors);
            tasks.spawn(async move {
                match fetch_region(source.as_ref(), &region, &samples).await {
                    Ok(_) => true,
                    Err(err) => {
                        error!(%region, count = err.count, "failed to fetch spot prices: {err}");
                        errors.fetch_add(err.count, Ordering::Relaxed);
                        false
                    }
                }
            });
        }
        drop(samples);

        let mut failed_regions = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => {}
                Ok(false) => failed_regions += 1,
                Err(err) => {
                    error!(error = %err, "region fetch task did not complete");
                    errors.fetch_add(1, Ordering::Relaxed);
                    failed_regions += 1;
                }
            }
        }

        ScrapeReport {
            regions: region_count,
            failed_regions,
            errors: errors.load(Ordering::Relaxed),
            duration: started_at.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSource, record};

    async fn run(source: FakeSource) -> (ScrapeReport, Vec<PriceSample>) {
        let orchestrator = ScrapeOrchestrator::new(Arc::new(source));
        let (tx, mut rx) = mpsc::channel(1);
        let drain = tokio::spawn(async move {
            let mut samples = Vec::new();
            while let Some(sample) = rx.recv().await {
                samples.push(sample);
            }
            samples
        });

        let report = orchestrator.scrape(tx).await;
        (report, drain.await.unwrap())
    }

    #[tokio::test]
    async fn discovery_failure_yields_one_error_and_no_fetches() {
        let source = Arc::new(FakeSource::failing_discovery());
        let orchestrator = ScrapeOrchestrator::new(source.clone());
        let (tx, mut rx) = mpsc::channel(1);

        let report = orchestrator.scrape(tx).await;

        assert_eq!(report.errors, 1);
        assert_eq!(report.regions, 0);
        assert!(rx.recv().await.is_none());
        assert_eq!(source.history_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fans_out_to_every_region() {
        let source = FakeSource::with_regions(&["a", "b", "c"])
            .page("a", vec![record(Some("0.1"), "a-1", "Linux/UNIX", "t3.micro")])
            .page("b", vec![record(Some("0.2"), "b-1", "Linux/UNIX", "t3.micro")])
            .page("c", vec![record(Some("0.3"), "c-1", "Linux/UNIX", "t3.micro")]);

        let (report, samples) = run(source).await;

        assert_eq!(report.regions, 3);
        assert_eq!(report.errors, 0);
        assert_eq!(report.failed_regions, 0);
        let mut regions = samples.iter().map(|s| s.region.as_str()).collect::<Vec<_>>();
        regions.sort();
        assert_eq!(regions, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn sums_errors_across_regions_without_stopping_siblings() {
        let source = FakeSource::with_regions(&["a", "b", "c"])
            .page(
                "a",
                vec![
                    record(Some("x"), "a-1", "Linux/UNIX", "t3.micro"),
                    record(Some("y"), "a-2", "Linux/UNIX", "t3.micro"),
                ],
            )
            .failing_page("b")
            .page("c", vec![record(Some("0.3"), "c-1", "Linux/UNIX", "t3.micro")]);

        let (report, samples) = run(source).await;

        assert_eq!(report.errors, 3);
        assert_eq!(report.failed_regions, 2);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].region, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn regions_are_fetched_concurrently() {
        let source = FakeSource::with_regions(&["a", "b", "c", "d"]).delayed(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        let (report, _) = run(source).await;

        assert_eq!(report.errors, 0);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
