use async_trait::async_trait;
use spotex_common::error::Result;

use crate::types::{SpotPriceHistoryPage, SpotPriceHistoryRequest};

/// The two read-only provider calls the exporter depends on.
#[async_trait]
pub trait SpotPriceSource: Send + Sync {
    /// Names of every region enabled for the account.
    async fn describe_regions(&self) -> Result<Vec<String>>;

    /// One page of spot price history for `request.region`.
    async fn describe_spot_price_history(
        &self,
        request: &SpotPriceHistoryRequest,
    ) -> Result<SpotPriceHistoryPage>;
}
