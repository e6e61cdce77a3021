//! Upstream API access: the client trait the controller drives, the reqwest
//! implementation of it, and the connection lifecycle around both.

pub mod connection;
pub mod error;
pub mod openaq;
pub mod rate_limit;

use crate::client::error::ClientError;
use crate::types::location::{Coordinates, Location};
use async_trait::async_trait;
use serde_json::Value;

/// One non-empty page of measurements: the raw payload plus its row count.
#[derive(Debug, Clone)]
pub struct PageData {
    pub rows: usize,
    pub body: Value,
}

/// The locations listing: raw payload for archival plus the typed results.
#[derive(Debug, Clone)]
pub struct LocationListing {
    pub raw: Value,
    pub results: Vec<Location>,
}

/// The upstream API surface the fetch controller consumes.
///
/// Kept as a trait so the retry orchestration can be exercised against a
/// scripted client in tests. Implementations signal a rate-limit condition by
/// failing with [`ClientError::RateLimited`], which carries the suggested
/// cool-down upward instead of absorbing it.
#[async_trait]
pub trait MeasurementClient: Send {
    /// Lists up to `limit` monitoring locations within `radius_m` meters of `center`.
    async fn list_locations(
        &self,
        center: Coordinates,
        radius_m: u32,
        limit: u32,
    ) -> Result<LocationListing, ClientError>;

    /// Fetches one page of measurements for a sensor over a whole year.
    ///
    /// Returns `None` when the service reports zero rows for the page; this is
    /// the normal loop-termination signal, not an error.
    async fn sensor_measurements(
        &self,
        sensor_id: i64,
        year: i32,
        page: u32,
    ) -> Result<Option<PageData>, ClientError>;

    /// Releases the connection's resources.
    async fn close(self);
}

/// Factory producing fresh client handles, used by [`connection::ConnectionManager`]
/// whenever the current connection is recycled.
#[async_trait]
pub trait Connect: Send + Sync {
    type Client: MeasurementClient;

    async fn connect(&self) -> Result<Self::Client, ClientError>;
}
