use std::collections::HashSet;

use spotex_ec2::{SpotPriceHistoryRequest, SpotPriceRecord, SpotPriceSource};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::sample::PriceSample;

/// Non-fatal failure of one region's fetch. Only the count is reported
/// upstream; details go to the log.
#[derive(Debug, Error)]
#[error("partial scrape failure in region {region}: {count} error(s)")]
pub struct ScrapeError {
    pub region: String,
    pub count: u64,
}

#[derive(Debug, Error, PartialEq)]
pub enum PriceError {
    #[error("spot price {0:?} is not a number")]
    NotANumber(String),
    #[error("spot price {0} is negative or not finite")]
    OutOfRange(String),
}

/// Parses a provider price string into dollars per hour.
///
/// `NaN`, infinities and negative values parse as floats but are rejected:
/// none of them is a price the market can quote, and exporting them would
/// put unusable series into the snapshot.
pub fn parse_price(raw: &str) -> Result<f64, PriceError> {
    let price = raw
        .parse::<f64>()
        .map_err(|_| PriceError::NotANumber(raw.to_string()))?;
    if !price.is_finite() || price < 0.0 {
        return Err(PriceError::OutOfRange(raw.to_string()));
    }
    Ok(price)
}

/// Fetches the current spot prices of `region` and streams every valid
/// sample into `samples` as soon as it is decoded.
///
/// Records without a price are skipped silently. Unparseable prices and
/// failed listing calls are counted; the scan keeps going after a bad record
/// and stops after a failed page. Returns the number of samples sent when
/// nothing failed.
pub async fn fetch_region(
    source: &dyn SpotPriceSource,
    region: &str,
    samples: &mpsc::Sender<PriceSample>,
) -> Result<usize, ScrapeError> {
    let mut errors = 0u64;
    let mut sent = 0usize;
    let mut request = SpotPriceHistoryRequest::current(region);
    let mut seen_tokens = HashSet::new();

    'pages: loop {
        let page = match source.describe_spot_price_history(&request).await {
            Ok(page) => page,
            Err(err) => {
                error!(%region, error = %err, kind = err.kind(), "failed to query spot price history");
                errors += 1;
                break;
            }
        };

        for record in page.records {
            let sample = match to_sample(region, record) {
                None => continue,
                Some(Ok(sample)) => sample,
                Some(Err(err)) => {
                    error!(%region, error = %err, "failed to parse spot price");
                    errors += 1;
                    continue;
                }
            };

            if samples.send(sample).await.is_err() {
                warn!(%region, "sample stream closed before region fetch finished");
                errors += 1;
                break 'pages;
            }
            sent += 1;
        }

        match page.next_token {
            Some(token) if seen_tokens.insert(token.clone()) => {
                request = request.with_next_token(token);
            }
            Some(token) => {
                warn!(%region, %token, "provider repeated continuation token, stopping pagination");
                break;
            }
            None => break,
        }
    }

    debug!(%region, sent, errors, "region fetch finished");
    if errors > 0 {
        return Err(ScrapeError {
            region: region.to_string(),
            count: errors,
        });
    }
    Ok(sent)
}

fn to_sample(region: &str, record: SpotPriceRecord) -> Option<Result<PriceSample, PriceError>> {
    let raw_price = record.spot_price?;
    Some(parse_price(&raw_price).map(|price| PriceSample {
        region: region.to_string(),
        availability_zone: record.availability_zone.unwrap_or_default(),
        product: record.product_description.unwrap_or_default(),
        instance_type: record.instance_type.unwrap_or_default(),
        price,
    }))
}
