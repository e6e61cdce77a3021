//! The reqwest-backed OpenAQ v3 client.

use crate::client::error::ClientError;
use crate::client::rate_limit::RateLimit;
use crate::client::{Connect, LocationListing, MeasurementClient, PageData};
use crate::types::location::{Coordinates, Location};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

const API_ROOT: &str = "https://api.openaq.org/v3";
const API_KEY_HEADER: &str = "X-API-Key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Measurements are requested at this fixed page size.
pub const PAGE_LIMIT: u32 = 1000;

pub struct OpenAqClient {
    http: reqwest::Client,
    api_key: String,
}

impl OpenAqClient {
    pub fn new(api_key: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
        })
    }

    /// Issues one GET, classifies transport and status failures, and parses
    /// both the JSON body and the rate-limit headers. A 429 surfaces as
    /// [`ClientError::RateLimited`] with the service-suggested cool-down.
    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<(Value, RateLimit), ClientError> {
        let response = self
            .http
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout(url.to_string())
                } else {
                    ClientError::Request(url.to_string(), e)
                }
            })?;

        let limits = RateLimit::from_headers(response.headers());

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited {
                retry_after: limits.suggested_delay(),
            });
        }

        let response = response
            .error_for_status()
            .map_err(|e| match e.status() {
                Some(status) => ClientError::HttpStatus {
                    url: url.to_string(),
                    status,
                    source: e,
                },
                None => ClientError::Request(url.to_string(), e),
            })?;

        let body = response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(url.to_string())
            } else {
                ClientError::Decode(url.to_string(), e)
            }
        })?;

        Ok((body, limits))
    }
}

fn result_rows(body: &Value) -> usize {
    body.get("results")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// Turns a successful measurements response into the controller-facing page
/// signal.
///
/// Proactive throttling wins over the empty-page signal: a response that
/// drained the quota must trigger the cool-down even if it carried no data,
/// otherwise the chunk would be marked finished on a starved window.
fn classify_page(body: Value, limits: RateLimit) -> Result<Option<PageData>, ClientError> {
    if let Some(retry_after) = limits.throttle_delay() {
        warn!(
            "Remaining quota {:?} below safety threshold, throttling for {}s",
            limits.remaining, retry_after
        );
        return Err(ClientError::RateLimited { retry_after });
    }

    let rows = result_rows(&body);
    if rows == 0 {
        return Ok(None);
    }
    Ok(Some(PageData { rows, body }))
}

#[async_trait]
impl MeasurementClient for OpenAqClient {
    async fn list_locations(
        &self,
        center: Coordinates,
        radius_m: u32,
        limit: u32,
    ) -> Result<LocationListing, ClientError> {
        let url = format!("{API_ROOT}/locations");
        let query = [
            (
                "coordinates",
                format!("{},{}", center.latitude, center.longitude),
            ),
            ("radius", radius_m.to_string()),
            ("limit", limit.to_string()),
        ];
        let (raw, _) = self.get_json(&url, &query).await?;

        let results: Vec<Location> = match raw.get("results") {
            Some(results) => serde_json::from_value(results.clone())
                .map_err(|e| ClientError::Payload(url.clone(), e))?,
            None => Vec::new(),
        };
        info!("Listed {} locations from {}", results.len(), url);

        Ok(LocationListing { raw, results })
    }

    async fn sensor_measurements(
        &self,
        sensor_id: i64,
        year: i32,
        page: u32,
    ) -> Result<Option<PageData>, ClientError> {
        let url = format!("{API_ROOT}/sensors/{sensor_id}/measurements");
        let query = [
            ("datetime_from", format!("{year}-01-01")),
            ("datetime_to", format!("{year}-12-31")),
            ("limit", PAGE_LIMIT.to_string()),
            ("page", page.to_string()),
        ];
        let (body, limits) = self.get_json(&url, &query).await?;
        classify_page(body, limits)
    }

    async fn close(self) {
        // Dropping the reqwest client tears down its connection pool; nothing
        // else to flush.
    }
}

/// Builds fresh [`OpenAqClient`] handles bound to one API key.
pub struct OpenAqConnector {
    api_key: String,
}

impl OpenAqConnector {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Connect for OpenAqConnector {
    type Client = OpenAqClient;

    async fn connect(&self) -> Result<OpenAqClient, ClientError> {
        OpenAqClient::new(&self.api_key)
    }
}
