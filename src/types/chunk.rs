//! The unit of resumability: one (location, sensor, year) combination.

use crate::types::location::Location;

/// A single download work unit.
///
/// Every chunk derives a stable string key that names both its page archives
/// and its completion marker in the blob store, so two runs over the same
/// datastore always agree on what has already been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub location_id: i64,
    pub sensor_id: i64,
    pub country_code: String,
    pub location_name: String,
    pub year: i32,
}

impl Chunk {
    pub fn new(location: &Location, sensor_id: i64, year: i32) -> Self {
        Self {
            location_id: location.id,
            sensor_id,
            country_code: location.country.code.clone(),
            location_name: location.name.clone(),
            year,
        }
    }

    /// Stable key embedding location id, sensor id, country code, sanitized
    /// location name and year.
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.location_id,
            self.sensor_id,
            self.country_code,
            sanitize_name(&self.location_name),
            self.year
        )
    }

    /// Blob name for one fetched page, 1-based.
    pub fn page_key(&self, page: u32) -> String {
        format!("{}_page{}.json.zip", self.key(), page)
    }

    /// Blob name for the finished marker written once the page sequence is drained.
    pub fn marker_key(&self) -> String {
        format!("{}.finished", self.key())
    }
}

/// Location names go into blob names verbatim apart from characters that would
/// break a filesystem-backed store.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '-',
            other => other,
        })
        .collect()
}
