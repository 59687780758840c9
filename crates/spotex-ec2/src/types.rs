use chrono::{DateTime, Utc};
use spotex_common::time;

/// A raw spot price history entry. Every field may be missing from the
/// provider response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotPriceRecord {
    pub spot_price: Option<String>,
    pub availability_zone: Option<String>,
    pub product_description: Option<String>,
    pub instance_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotPriceHistoryRequest {
    pub region: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub next_token: Option<String>,
}

impl SpotPriceHistoryRequest {
    /// Asks for the single current time point: start and end are both now.
    pub fn current(region: impl Into<String>) -> Self {
        let now = time::now();
        Self {
            region: region.into(),
            start_time: now,
            end_time: now,
            next_token: None,
        }
    }

    pub fn with_next_token(&self, next_token: impl Into<String>) -> Self {
        Self {
            next_token: Some(next_token.into()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotPriceHistoryPage {
    pub records: Vec<SpotPriceRecord>,
    pub next_token: Option<String>,
}
