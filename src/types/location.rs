//! Data structures for monitoring locations and their sensors, mirroring the
//! relevant parts of the OpenAQ v3 `/locations` payload. Immutable once fetched.

use serde::Deserialize;
use std::collections::HashMap;

/// A geographical coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// The country a location belongs to. Only the ISO code is of interest here;
/// it becomes part of every derived blob name.
#[derive(Debug, Clone, Deserialize)]
pub struct Country {
    pub code: String,
}

/// The measured quantity a sensor reports, e.g. "pm25" or "temperature".
#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    pub name: String,
}

/// A single sensor attached to a location.
#[derive(Debug, Clone, Deserialize)]
pub struct Sensor {
    pub id: i64,
    pub parameter: Parameter,
}

/// A monitoring location as returned by the locations listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub country: Country,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub sensors: Vec<Sensor>,
}

impl Location {
    /// Selects the sensor ids measuring the given parameters, in parameter order.
    ///
    /// Parameters this location does not measure are silently skipped, as are
    /// zero/sentinel sensor ids. When several sensors report the same parameter
    /// the first one listed wins.
    pub fn sensor_ids(&self, parameters: &[String]) -> Vec<i64> {
        let mut by_parameter: HashMap<&str, i64> = HashMap::new();
        for sensor in &self.sensors {
            by_parameter
                .entry(sensor.parameter.name.as_str())
                .or_insert(sensor.id);
        }
        parameters
            .iter()
            .filter_map(|name| by_parameter.get(name.as_str()).copied())
            .filter(|&id| id != 0)
            .collect()
    }
}
