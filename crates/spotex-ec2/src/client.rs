use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use spotex_auth::{CredentialProvider, Credentials, RequestToSign, sign_request};
use spotex_common::{
    error::{Result, SpotexError},
    time,
};
use tracing::debug;
use url::{Url, form_urlencoded};

use crate::{
    source::SpotPriceSource,
    types::{SpotPriceHistoryPage, SpotPriceHistoryRequest},
    xml,
};

pub const API_VERSION: &str = "2016-11-15";
pub const SERVICE_NAME: &str = "ec2";
pub const DEFAULT_REGION: &str = "eu-west-1";
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://ec2.{region}.amazonaws.com";
const REGION_PLACEHOLDER: &str = "{region}";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

#[derive(Debug, Clone)]
pub struct Ec2Config {
    /// Region of the session; region discovery is sent here.
    pub region: String,
    /// Endpoint URL; `{region}` is replaced with the target region per call.
    pub endpoint_template: String,
    /// Per-request timeout. `None` leaves calls unbounded.
    pub request_timeout: Option<Duration>,
}

impl Default for Ec2Config {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint_template: DEFAULT_ENDPOINT_TEMPLATE.to_string(),
            request_timeout: None,
        }
    }
}

/// Signed EC2 Query API client.
pub struct Ec2Client {
    http: reqwest::Client,
    credentials: Credentials,
    config: Ec2Config,
}

impl Ec2Client {
    /// Establishes the provider session. Fails when no credentials can be
    /// resolved or the configuration is unusable.
    pub fn new(config: Ec2Config, credentials: &dyn CredentialProvider) -> Result<Self> {
        if config.region.trim().is_empty() {
            return Err(SpotexError::InvalidArgument(
                "session region must not be empty".to_string(),
            ));
        }
        endpoint_url(&config.endpoint_template, &config.region)?;

        let credentials = credentials.provide()?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|err| {
            SpotexError::InternalError(format!("failed to build http client: {err}"))
        })?;

        Ok(Self {
            http,
            credentials,
            config,
        })
    }

    async fn call(&self, region: &str, params: &[(&str, &str)]) -> Result<String> {
        let url = endpoint_url(&self.config.endpoint_template, region)?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(SpotexError::InvalidArgument(format!(
                    "endpoint has no host: {url}"
                )));
            }
        };

        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("Version", API_VERSION)
            .extend_pairs(params)
            .finish();

        let signed = sign_request(
            &self.credentials,
            region,
            SERVICE_NAME,
            &RequestToSign {
                method: "POST",
                uri: url.path(),
                query_string: "",
                headers: &[("host", host.as_str()), ("content-type", FORM_CONTENT_TYPE)],
                payload: body.as_bytes(),
            },
            time::now(),
        );

        let mut request = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header("x-amz-date", &signed.amz_date)
            .header(AUTHORIZATION, &signed.authorization);
        if let Some(token) = &signed.security_token {
            request = request.header("x-amz-security-token", token);
        }

        let action = params.first().map(|(_, value)| *value).unwrap_or_default();
        debug!(%region, action, "calling ec2 api");
        let response = request
            .body(body)
            .send()
            .await
            .map_err(|err| SpotexError::Http(format!("request to {url} failed: {err}")))?;

        let status = response.status();
        let text = response.text().await.map_err(|err| {
            SpotexError::Http(format!("failed to read response from {url}: {err}"))
        })?;

        if !status.is_success() {
            return Err(xml::parse_error_response(status.as_u16(), &text));
        }

        Ok(text)
    }
}

#[async_trait]
impl SpotPriceSource for Ec2Client {
    async fn describe_regions(&self) -> Result<Vec<String>> {
        let body = self
            .call(&self.config.region, &[("Action", "DescribeRegions")])
            .await?;
        xml::parse_describe_regions(&body)
    }

    async fn describe_spot_price_history(
        &self,
        request: &SpotPriceHistoryRequest,
    ) -> Result<SpotPriceHistoryPage> {
        let start_time = time::format_iso8601(&request.start_time);
        let end_time = time::format_iso8601(&request.end_time);
        let mut params = vec![
            ("Action", "DescribeSpotPriceHistory"),
            ("StartTime", start_time.as_str()),
            ("EndTime", end_time.as_str()),
        ];
        if let Some(token) = &request.next_token {
            params.push(("NextToken", token.as_str()));
        }

        let body = self.call(&request.region, &params).await?;
        xml::parse_spot_price_history(&body)
    }
}

fn endpoint_url(template: &str, region: &str) -> Result<Url> {
    let raw = template.replace(REGION_PLACEHOLDER, region);
    Url::parse(&raw)
        .map_err(|err| SpotexError::InvalidArgument(format!("invalid endpoint {raw}: {err}")))
}
