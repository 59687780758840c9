use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use spotex_common::error::{Result, SpotexError};
use spotex_ec2::{SpotPriceHistoryPage, SpotPriceHistoryRequest, SpotPriceRecord, SpotPriceSource};

/// Scripted in-memory provider. Page `n` of a region is served for the
/// continuation token `n`.
#[derive(Default)]
pub(crate) struct FakeSource {
    regions: Vec<String>,
    discovery_fails_from: Option<usize>,
    pages: HashMap<String, Vec<Option<Vec<SpotPriceRecord>>>>,
    delay: Option<Duration>,
    pub(crate) discovery_calls: AtomicUsize,
    pub(crate) history_calls: AtomicUsize,
    pub(crate) requests: Mutex<Vec<SpotPriceHistoryRequest>>,
}

impl FakeSource {
    pub(crate) fn with_regions(regions: &[&str]) -> Self {
        Self {
            regions: regions.iter().map(|region| region.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn failing_discovery() -> Self {
        Self::with_regions(&[]).failing_discovery_from(0)
    }

    pub(crate) fn failing_discovery_from(mut self, call: usize) -> Self {
        self.discovery_fails_from = Some(call);
        self
    }

    pub(crate) fn page(mut self, region: &str, records: Vec<SpotPriceRecord>) -> Self {
        self.pages
            .entry(region.to_string())
            .or_default()
            .push(Some(records));
        self
    }

    pub(crate) fn failing_page(mut self, region: &str) -> Self {
        self.pages.entry(region.to_string()).or_default().push(None);
        self
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SpotPriceSource for FakeSource {
    async fn describe_regions(&self) -> Result<Vec<String>> {
        let call = self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        match self.discovery_fails_from {
            Some(from) if call >= from => Err(SpotexError::Http("connection refused".to_string())),
            _ => Ok(self.regions.clone()),
        }
    }

    async fn describe_spot_price_history(
        &self,
        request: &SpotPriceHistoryRequest,
    ) -> Result<SpotPriceHistoryPage> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let Some(pages) = self.pages.get(&request.region) else {
            return Ok(SpotPriceHistoryPage::default());
        };
        let index = request
            .next_token
            .as_deref()
            .map(|token| token.parse::<usize>().unwrap())
            .unwrap_or(0);

        match pages.get(index) {
            Some(Some(records)) => Ok(SpotPriceHistoryPage {
                records: records.clone(),
                next_token: (index + 1 < pages.len()).then(|| (index + 1).to_string()),
            }),
            Some(None) => Err(SpotexError::Api {
                code: "RequestLimitExceeded".to_string(),
                message: "Request limit exceeded.".to_string(),
            }),
            None => Ok(SpotPriceHistoryPage::default()),
        }
    }
}

pub(crate) fn record(
    price: Option<&str>,
    availability_zone: &str,
    product: &str,
    instance_type: &str,
) -> SpotPriceRecord {
    SpotPriceRecord {
        spot_price: price.map(str::to_string),
        availability_zone: Some(availability_zone.to_string()),
        product_description: Some(product.to_string()),
        instance_type: Some(instance_type.to_string()),
    }
}
