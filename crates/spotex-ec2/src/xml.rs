use quick_xml::de::from_str as xml_from_str;
use serde::Deserialize;
use spotex_common::error::{Result, SpotexError};

use crate::types::{SpotPriceHistoryPage, SpotPriceRecord};

#[derive(Debug, Deserialize)]
#[serde(rename = "DescribeRegionsResponse")]
struct DescribeRegionsXml {
    #[serde(rename = "regionInfo", default)]
    region_info: RegionInfoXml,
}

#[derive(Debug, Default, Deserialize)]
struct RegionInfoXml {
    #[serde(rename = "item", default)]
    items: Vec<RegionXml>,
}

#[derive(Debug, Deserialize)]
struct RegionXml {
    #[serde(rename = "regionName")]
    region_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "DescribeSpotPriceHistoryResponse")]
struct DescribeSpotPriceHistoryXml {
    #[serde(rename = "spotPriceHistorySet", default)]
    history: SpotPriceHistorySetXml,
    #[serde(rename = "nextToken")]
    next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SpotPriceHistorySetXml {
    #[serde(rename = "item", default)]
    items: Vec<SpotPriceXml>,
}

#[derive(Debug, Deserialize)]
struct SpotPriceXml {
    #[serde(rename = "instanceType")]
    instance_type: Option<String>,
    #[serde(rename = "productDescription")]
    product_description: Option<String>,
    #[serde(rename = "spotPrice")]
    spot_price: Option<String>,
    #[serde(rename = "availabilityZone")]
    availability_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Response")]
struct ErrorResponseXml {
    #[serde(rename = "Errors", default)]
    errors: ErrorsXml,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorsXml {
    #[serde(rename = "Error", default)]
    errors: Vec<ErrorXml>,
}

#[derive(Debug, Deserialize)]
struct ErrorXml {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

pub fn parse_describe_regions(body: &str) -> Result<Vec<String>> {
    let payload: DescribeRegionsXml = xml_from_str(body).map_err(|err| {
        SpotexError::Decode(format!("invalid DescribeRegions response: {err}"))
    })?;

    Ok(payload
        .region_info
        .items
        .into_iter()
        .filter_map(|region| non_empty(region.region_name))
        .collect())
}

pub fn parse_spot_price_history(body: &str) -> Result<SpotPriceHistoryPage> {
    let payload: DescribeSpotPriceHistoryXml = xml_from_str(body).map_err(|err| {
        SpotexError::Decode(format!("invalid DescribeSpotPriceHistory response: {err}"))
    })?;

    let records = payload
        .history
        .items
        .into_iter()
        .map(|item| SpotPriceRecord {
            spot_price: item.spot_price,
            availability_zone: item.availability_zone,
            product_description: item.product_description,
            instance_type: item.instance_type,
        })
        .collect();

    Ok(SpotPriceHistoryPage {
        records,
        next_token: non_empty(payload.next_token),
    })
}

/// Maps an EC2 error document to [`SpotexError::Api`]. Falls back to the
/// HTTP status when the body is not a recognizable error response.
pub fn parse_error_response(status: u16, body: &str) -> SpotexError {
    match xml_from_str::<ErrorResponseXml>(body) {
        Ok(payload) => match payload.errors.errors.into_iter().next() {
            Some(error) => SpotexError::Api {
                code: error.code,
                message: error.message,
            },
            None => SpotexError::Http(format!("status {status} with empty error list")),
        },
        Err(_) => SpotexError::Http(format!("status {status}")),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
