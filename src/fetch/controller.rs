//! The resumable fetch controller: enumeration, page loop, retry escalation
//! and persistence, in one strictly sequential pass.
//!
//! Work is resumed at two granularities. A chunk whose finished marker exists
//! is skipped wholesale; within an unfinished chunk, every page whose archive
//! already exists is skipped individually. Together these make a re-run of the
//! whole process idempotent without any in-process state surviving between
//! runs.

use crate::client::connection::ConnectionManager;
use crate::client::error::ClientError;
use crate::client::{Connect, MeasurementClient};
use crate::config::ArchiverConfig;
use crate::error::ArchiverError;
use crate::storage::archive::store_compressed;
use crate::storage::BlobStore;
use crate::types::chunk::Chunk;
use log::{error, info, warn};
use std::time::Duration;

/// Blob holding the raw discovered-locations listing.
pub const LOCATIONS_KEY: &str = "locations.json.zip";

/// Cool-down applied to plain transport timeouts, which carry no suggested
/// delay of their own.
const TIMEOUT_COOLDOWN_SECONDS: u64 = 60;

/// Consecutive-failure count at which the connection is reset and the same
/// page retried immediately.
const RESET_THRESHOLD: u32 = 3;
/// Consecutive-failure count at which the current chunk is abandoned for this
/// run (it resumes from its surviving pages on the next run).
const ABANDON_THRESHOLD: u32 = 5;
/// Consecutive-failure count at which the whole run aborts; at this point the
/// upstream is considered broken beyond what waiting fixes.
const FATAL_THRESHOLD: u32 = 7;

/// How one chunk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Empty page observed, finished marker written.
    Completed { new_pages: usize },
    /// Finished marker was already present; nothing fetched.
    AlreadyFinished,
    /// Given up after repeated failures; no marker written.
    Abandoned,
}

/// Counters reported after a full run, for the operator's benefit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub locations: usize,
    pub chunks_completed: usize,
    pub chunks_skipped: usize,
    pub chunks_abandoned: usize,
    pub pages_stored: usize,
}

/// Cool-down before the next attempt: the suggested delay plus a minute per
/// consecutive failure for rate limits, a flat minute for transport timeouts.
/// Saturating, since the suggested delay is parsed from an untrusted header.
fn cooldown_seconds(err: &ClientError, streak: u32) -> u64 {
    match err {
        ClientError::RateLimited { retry_after } => {
            retry_after.saturating_add(60 * u64::from(streak))
        }
        _ => TIMEOUT_COOLDOWN_SECONDS,
    }
}

pub struct FetchController<C: Connect, S: BlobStore> {
    config: ArchiverConfig,
    connection: ConnectionManager<C>,
    store: S,
}

impl<C: Connect, S: BlobStore> FetchController<C, S> {
    pub fn new(config: ArchiverConfig, connector: C, store: S) -> Self {
        Self {
            config,
            connection: ConnectionManager::new(connector),
            store,
        }
    }

    /// Enumerates locations, archives the raw listing, then drains every
    /// (year, sensor) chunk of every location in order.
    ///
    /// Only fatal exhaustion propagates out of here; rate limits, timeouts
    /// and abandoned chunks are absorbed by the per-chunk escalation policy.
    pub async fn run(mut self) -> Result<RunSummary, ArchiverError> {
        let client = self.connection.client().await?;
        let listing = client
            .list_locations(
                self.config.center,
                self.config.radius_m,
                self.config.location_limit,
            )
            .await?;
        store_compressed(&self.store, LOCATIONS_KEY, &listing.raw).await?;
        info!("Got {} locations", listing.results.len());

        let mut summary = RunSummary {
            locations: listing.results.len(),
            ..RunSummary::default()
        };

        for location in &listing.results {
            let sensor_ids = location.sensor_ids(&self.config.parameters);
            info!(
                "Downloading measurements for station {} ({} sensors of interest)",
                location.name,
                sensor_ids.len()
            );

            // The failure streak spans chunks of one location so that a sensor
            // or endpoint that keeps failing past chunk abandonment still
            // reaches the fatal tier instead of cycling forever.
            let mut failures = 0u32;
            for year in self.config.years.clone() {
                for &sensor_id in &sensor_ids {
                    let chunk = Chunk::new(location, sensor_id, year);
                    match self.download_chunk(&chunk, &mut failures).await? {
                        ChunkOutcome::Completed { new_pages } => {
                            summary.chunks_completed += 1;
                            summary.pages_stored += new_pages;
                        }
                        ChunkOutcome::AlreadyFinished => summary.chunks_skipped += 1,
                        ChunkOutcome::Abandoned => summary.chunks_abandoned += 1,
                    }
                }
            }
        }

        info!(
            "Run complete: {} chunks downloaded, {} skipped, {} abandoned, {} pages stored",
            summary.chunks_completed,
            summary.chunks_skipped,
            summary.chunks_abandoned,
            summary.pages_stored
        );
        Ok(summary)
    }

    /// Pages through one chunk until the service returns an empty page, then
    /// writes the finished marker. `failures` is the consecutive-failure
    /// streak shared across the enclosing location's chunks; every successful
    /// fetch resets it, a page skip leaves it untouched.
    async fn download_chunk(
        &mut self,
        chunk: &Chunk,
        failures: &mut u32,
    ) -> Result<ChunkOutcome, ArchiverError> {
        let key = chunk.key();
        if self.store.exists(&chunk.marker_key()).await? {
            info!("Chunk {key} already downloaded, skipping");
            return Ok(ChunkOutcome::AlreadyFinished);
        }
        info!("Downloading chunk {key}");

        let mut new_pages = 0usize;
        let mut page = 0u32;
        loop {
            page += 1;
            let page_key = chunk.page_key(page);
            if self.store.exists(&page_key).await? {
                info!("Page {page_key} exists, skipping");
                continue;
            }

            let client = self.connection.client().await?;
            match client
                .sensor_measurements(chunk.sensor_id, chunk.year, page)
                .await
            {
                Ok(Some(data)) => {
                    *failures = 0;
                    info!("Storing page {page_key} ({} rows)", data.rows);
                    store_compressed(&self.store, &page_key, &data.body).await?;
                    new_pages += 1;
                }
                Ok(None) => {
                    *failures = 0;
                    break;
                }
                Err(err) if err.is_recoverable() => {
                    *failures += 1;
                    // The failed page is retried, so undo this iteration's
                    // advance before escalating.
                    page -= 1;
                    match *failures {
                        RESET_THRESHOLD => {
                            warn!(
                                "{failures} consecutive failures, resetting connection and retrying page {} of chunk {key}",
                                page + 1
                            );
                            self.connection.recycle(Duration::ZERO).await?;
                        }
                        ABANDON_THRESHOLD => {
                            warn!("{failures} consecutive failures, abandoning chunk {key}");
                            self.connection.recycle(Duration::ZERO).await?;
                            return Ok(ChunkOutcome::Abandoned);
                        }
                        FATAL_THRESHOLD => {
                            error!("{failures} consecutive failures, giving up: {err}");
                            return Err(ArchiverError::RetriesExhausted {
                                chunk: key,
                                failures: *failures,
                                source: err,
                            });
                        }
                        streak => {
                            let delay = cooldown_seconds(&err, streak);
                            warn!(
                                "Fetch failed ({err}), cooling down {delay}s then retrying page {} of chunk {key}",
                                page + 1
                            );
                            self.connection.recycle(Duration::from_secs(delay)).await?;
                        }
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.store.put(&chunk.marker_key(), b"done".to_vec()).await?;
        info!("Finished chunk {key}");
        Ok(ChunkOutcome::Completed { new_pages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LocationListing, PageData};
    use crate::config::DEFAULT_CENTER;
    use crate::storage::error::StorageError;
    use crate::types::location::{Coordinates, Country, Location, Parameter, Sensor};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::{HashMap, VecDeque};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    // --- In-memory store ---

    #[derive(Clone, Default)]
    struct MemoryStore {
        blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MemoryStore {
        fn insert(&self, key: &str, bytes: &[u8]) {
            self.blobs
                .lock()
                .unwrap()
                .insert(key.to_string(), bytes.to_vec());
        }

        fn contains(&self, key: &str) -> bool {
            self.blobs.lock().unwrap().contains_key(key)
        }

        fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
            keys.sort();
            keys
        }

        fn snapshot(&self) -> HashMap<String, Vec<u8>> {
            self.blobs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BlobStore for MemoryStore {
        async fn exists(&self, key: &str) -> Result<bool, StorageError> {
            Ok(self.contains(key))
        }

        async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
            self.blobs.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }
    }

    // --- Scripted client ---

    #[derive(Debug, Clone)]
    enum Scripted {
        Page(usize),
        Empty,
        RateLimited(u64),
        Timeout,
        Broken,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        script: Arc<Mutex<VecDeque<Scripted>>>,
        calls: Arc<Mutex<Vec<(i64, i32, u32)>>>,
        connects: Arc<Mutex<Vec<Instant>>>,
        closes: Arc<Mutex<usize>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<(i64, i32, u32)> {
            self.calls.lock().unwrap().clone()
        }

        /// Gaps between consecutive connects; under a paused runtime these are
        /// exactly the recycle cool-downs.
        fn connect_gaps(&self) -> Vec<Duration> {
            let connects = self.connects.lock().unwrap();
            connects.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    struct MockClient {
        locations: Vec<Location>,
        recorder: Recorder,
    }

    #[async_trait]
    impl MeasurementClient for MockClient {
        async fn list_locations(
            &self,
            _center: Coordinates,
            _radius_m: u32,
            _limit: u32,
        ) -> Result<LocationListing, ClientError> {
            Ok(LocationListing {
                raw: json!({ "results": [], "meta": { "found": self.locations.len() } }),
                results: self.locations.clone(),
            })
        }

        async fn sensor_measurements(
            &self,
            sensor_id: i64,
            year: i32,
            page: u32,
        ) -> Result<Option<PageData>, ClientError> {
            self.recorder
                .calls
                .lock()
                .unwrap()
                .push((sensor_id, year, page));
            let next = self
                .recorder
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted");
            match next {
                Scripted::Page(rows) => {
                    let values: Vec<Value> =
                        (0..rows).map(|i| json!({ "value": i as f64 })).collect();
                    Ok(Some(PageData {
                        rows,
                        body: json!({ "results": values }),
                    }))
                }
                Scripted::Empty => Ok(None),
                Scripted::RateLimited(retry_after) => {
                    Err(ClientError::RateLimited { retry_after })
                }
                Scripted::Timeout => Err(ClientError::Timeout("mock".to_string())),
                Scripted::Broken => Err(ClientError::Payload(
                    "mock".to_string(),
                    serde_json::from_str::<Value>("not json").unwrap_err(),
                )),
            }
        }

        async fn close(self) {
            *self.recorder.closes.lock().unwrap() += 1;
        }
    }

    struct MockConnector {
        locations: Vec<Location>,
        recorder: Recorder,
    }

    #[async_trait]
    impl Connect for MockConnector {
        type Client = MockClient;

        async fn connect(&self) -> Result<MockClient, ClientError> {
            self.recorder.connects.lock().unwrap().push(Instant::now());
            Ok(MockClient {
                locations: self.locations.clone(),
                recorder: self.recorder.clone(),
            })
        }
    }

    // --- Fixtures ---

    fn test_location() -> Location {
        Location {
            id: 2812630,
            name: "Vracar".to_string(),
            country: Country {
                code: "RS".to_string(),
            },
            coordinates: DEFAULT_CENTER,
            sensors: vec![Sensor {
                id: 42,
                parameter: Parameter {
                    name: "pm25".to_string(),
                },
            }],
        }
    }

    fn test_config(years: std::ops::RangeInclusive<i32>) -> ArchiverConfig {
        let mut config = ArchiverConfig::new("test-key", PathBuf::from("unused"));
        config.years = years;
        config.parameters = vec!["pm25".to_string()];
        config
    }

    fn controller(
        years: std::ops::RangeInclusive<i32>,
        script: Vec<Scripted>,
    ) -> (FetchController<MockConnector, MemoryStore>, Recorder, MemoryStore) {
        let recorder = Recorder::default();
        *recorder.script.lock().unwrap() = script.into();
        let connector = MockConnector {
            locations: vec![test_location()],
            recorder: recorder.clone(),
        };
        let store = MemoryStore::default();
        let controller = FetchController::new(test_config(years), connector, store.clone());
        (controller, recorder, store)
    }

    const CHUNK_2023: &str = "2812630_42_RS_Vracar_2023";
    const CHUNK_2024: &str = "2812630_42_RS_Vracar_2024";

    // --- Scenarios ---

    #[tokio::test]
    async fn two_pages_then_empty_stores_pages_and_marker() {
        let (controller, recorder, store) = controller(
            2023..=2023,
            vec![Scripted::Page(1000), Scripted::Page(400), Scripted::Empty],
        );

        let summary = controller.run().await.unwrap();

        assert_eq!(summary.locations, 1);
        assert_eq!(summary.chunks_completed, 1);
        assert_eq!(summary.pages_stored, 2);
        assert_eq!(
            store.keys(),
            vec![
                format!("{CHUNK_2023}.finished"),
                format!("{CHUNK_2023}_page1.json.zip"),
                format!("{CHUNK_2023}_page2.json.zip"),
                LOCATIONS_KEY.to_string(),
            ]
        );
        // Contiguous pages 1..N, with N+1 observed empty and never persisted.
        assert_eq!(
            recorder.calls(),
            vec![(42, 2023, 1), (42, 2023, 2), (42, 2023, 3)]
        );
    }

    #[tokio::test]
    async fn existing_page_is_not_rerequested() {
        let (controller, recorder, store) =
            controller(2023..=2023, vec![Scripted::Page(400), Scripted::Empty]);
        store.insert(&format!("{CHUNK_2023}_page1.json.zip"), b"from prior run");

        let summary = controller.run().await.unwrap();

        assert_eq!(summary.chunks_completed, 1);
        assert_eq!(summary.pages_stored, 1);
        // Page 1 is skipped, requests start at page 2.
        assert_eq!(recorder.calls(), vec![(42, 2023, 2), (42, 2023, 3)]);
        assert!(store.contains(&format!("{CHUNK_2023}.finished")));
    }

    #[tokio::test]
    async fn finished_chunk_issues_no_measurement_calls() {
        let (controller, recorder, store) = controller(2023..=2023, vec![]);
        store.insert(&format!("{CHUNK_2023}.finished"), b"done");

        let summary = controller.run().await.unwrap();

        assert_eq!(summary.chunks_skipped, 1);
        assert_eq!(summary.chunks_completed, 0);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn second_run_over_same_store_is_idempotent() {
        let (first, _, store) = controller(
            2023..=2023,
            vec![Scripted::Page(1000), Scripted::Page(400), Scripted::Empty],
        );
        first.run().await.unwrap();
        let after_first = store.snapshot();

        // Second run over the same store: scripted with nothing, so any
        // measurement call would panic on an exhausted script.
        let recorder = Recorder::default();
        let connector = MockConnector {
            locations: vec![test_location()],
            recorder: recorder.clone(),
        };
        let second = FetchController::new(test_config(2023..=2023), connector, store.clone());
        let summary = second.run().await.unwrap();

        assert_eq!(summary.chunks_skipped, 1);
        assert!(recorder.calls().is_empty());
        assert_eq!(store.snapshot(), after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_recycles_abandons_then_aborts() {
        // Seven consecutive rate-limit failures, suggested delay 7s. The five
        // first ones land in the 2023 chunk (abandoned at the fifth), the
        // streak then carries into the 2024 chunk and turns fatal at seven.
        let (controller, recorder, store) = controller(
            2023..=2024,
            vec![Scripted::RateLimited(7); 7],
        );

        let err = controller.run().await.unwrap_err();
        assert!(matches!(
            err,
            ArchiverError::RetriesExhausted { failures: 7, .. }
        ));

        // Startup connect plus one reconnect per handled failure; the seventh
        // failure aborts without recycling.
        assert_eq!(recorder.connects.lock().unwrap().len(), 7);
        assert_eq!(*recorder.closes.lock().unwrap(), 6);
        let gaps: Vec<u64> = recorder
            .connect_gaps()
            .iter()
            .map(Duration::as_secs)
            .collect();
        assert_eq!(gaps, vec![7 + 60, 7 + 120, 0, 7 + 240, 0, 7 + 360]);

        // Failures 1-5 retry page 1 of the 2023 chunk, 6-7 page 1 of 2024.
        assert_eq!(
            recorder.calls(),
            vec![
                (42, 2023, 1),
                (42, 2023, 1),
                (42, 2023, 1),
                (42, 2023, 1),
                (42, 2023, 1),
                (42, 2024, 1),
                (42, 2024, 1),
            ]
        );

        // No marker and no page was written anywhere.
        assert_eq!(store.keys(), vec![LOCATIONS_KEY.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_chunk_leaves_no_marker_and_run_continues() {
        let (controller, recorder, store) = controller(
            2023..=2024,
            vec![
                Scripted::RateLimited(10),
                Scripted::RateLimited(10),
                Scripted::RateLimited(10),
                Scripted::RateLimited(10),
                Scripted::RateLimited(10),
                Scripted::Page(10),
                Scripted::Empty,
            ],
        );

        let summary = controller.run().await.unwrap();

        assert_eq!(summary.chunks_abandoned, 1);
        assert_eq!(summary.chunks_completed, 1);
        assert!(!store.contains(&format!("{CHUNK_2023}.finished")));
        assert!(store.contains(&format!("{CHUNK_2024}.finished")));
        assert!(store.contains(&format!("{CHUNK_2024}_page1.json.zip")));
        // The success in the 2024 chunk reset the streak.
        assert_eq!(recorder.calls().last(), Some(&(42, 2024, 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_timeout_gets_flat_cooldown() {
        let (controller, recorder, _store) = controller(
            2023..=2023,
            vec![Scripted::Timeout, Scripted::Page(3), Scripted::Empty],
        );

        let summary = controller.run().await.unwrap();

        assert_eq!(summary.chunks_completed, 1);
        let gaps: Vec<u64> = recorder
            .connect_gaps()
            .iter()
            .map(Duration::as_secs)
            .collect();
        assert_eq!(gaps, vec![60]);
        // Same page retried after the timeout.
        assert_eq!(
            recorder.calls(),
            vec![(42, 2023, 1), (42, 2023, 1), (42, 2023, 2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_failure_streak() {
        // Two failures, a success, two more failures: the streak never reaches
        // the reset threshold, so every recycle carries a computed delay.
        let (controller, recorder, _store) = controller(
            2023..=2023,
            vec![
                Scripted::RateLimited(5),
                Scripted::RateLimited(5),
                Scripted::Page(3),
                Scripted::RateLimited(5),
                Scripted::RateLimited(5),
                Scripted::Page(3),
                Scripted::Empty,
            ],
        );

        let summary = controller.run().await.unwrap();

        assert_eq!(summary.chunks_completed, 1);
        assert_eq!(summary.pages_stored, 2);
        let gaps: Vec<u64> = recorder
            .connect_gaps()
            .iter()
            .map(Duration::as_secs)
            .collect();
        assert_eq!(gaps, vec![5 + 60, 5 + 120, 5 + 60, 5 + 120]);
    }

    #[test]
    fn cooldown_grows_with_the_streak_and_saturates() {
        let rate_limited = ClientError::RateLimited { retry_after: 7 };
        assert_eq!(cooldown_seconds(&rate_limited, 1), 67);
        assert_eq!(cooldown_seconds(&rate_limited, 4), 247);

        // An absurd server-suggested reset must not overflow the addition.
        let hostile = ClientError::RateLimited {
            retry_after: u64::MAX,
        };
        assert_eq!(cooldown_seconds(&hostile, 2), u64::MAX);

        let timeout = ClientError::Timeout("mock".to_string());
        assert_eq!(cooldown_seconds(&timeout, 4), TIMEOUT_COOLDOWN_SECONDS);
    }

    #[tokio::test]
    async fn unrecoverable_errors_propagate_immediately() {
        let (controller, recorder, store) = controller(2023..=2023, vec![Scripted::Broken]);

        let err = controller.run().await.unwrap_err();
        assert!(matches!(err, ArchiverError::Client(_)));
        assert_eq!(recorder.calls().len(), 1);
        assert!(!store.contains(&format!("{CHUNK_2023}.finished")));
    }
}
