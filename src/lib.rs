//! Resumable bulk-downloader for the OpenAQ v3 measurement API.
//!
//! The crate enumerates monitoring locations around a fixed geographic point,
//! discovers each location's sensors, and drains per-sensor, per-year measurement
//! pages into a blob store, one compressed archive per page. Every page and every
//! drained work unit leaves a durable artifact behind, so a re-run of the whole
//! process picks up exactly where the previous one stopped.

mod client;
mod config;
mod error;
mod fetch;
mod storage;
mod types;

pub use error::ArchiverError;

pub use client::connection::ConnectionManager;
pub use client::error::ClientError;
pub use client::openaq::{OpenAqClient, OpenAqConnector};
pub use client::rate_limit::RateLimit;
pub use client::{Connect, LocationListing, MeasurementClient, PageData};

pub use config::{ArchiverConfig, ENV_API_KEY, ENV_DATASTORE};

pub use fetch::controller::{ChunkOutcome, FetchController, RunSummary, LOCATIONS_KEY};

pub use storage::archive::{compress_entry, store_compressed};
pub use storage::error::StorageError;
pub use storage::fs::FsBlobStore;
pub use storage::BlobStore;

pub use types::chunk::Chunk;
pub use types::location::{Coordinates, Country, Location, Parameter, Sensor};
