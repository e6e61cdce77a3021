//! Process configuration, loaded once at startup and passed into the
//! controller. There is no other configuration surface.

use crate::error::ArchiverError;
use crate::types::location::Coordinates;
use std::env;
use std::ops::RangeInclusive;
use std::path::PathBuf;

pub const ENV_API_KEY: &str = "OPENAQ_API_KEY";
pub const ENV_DATASTORE: &str = "DATASTORE_PATH";

/// Belgrade city centre.
pub const DEFAULT_CENTER: Coordinates = Coordinates {
    latitude: 44.8125,
    longitude: 20.4612,
};
pub const DEFAULT_RADIUS_METERS: u32 = 8_000;
pub const DEFAULT_YEARS: RangeInclusive<i32> = 2021..=2025;
pub const DEFAULT_PARAMETERS: [&str; 4] = ["pm1", "pm10", "pm25", "temperature"];

/// Cap on the locations listing request.
pub const LOCATION_LIMIT: u32 = 1000;

#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    pub api_key: String,
    pub datastore: PathBuf,
    pub center: Coordinates,
    pub radius_m: u32,
    pub years: RangeInclusive<i32>,
    pub parameters: Vec<String>,
    pub location_limit: u32,
}

impl ArchiverConfig {
    pub fn new(api_key: impl Into<String>, datastore: impl Into<PathBuf>) -> Self {
        Self {
            api_key: api_key.into(),
            datastore: datastore.into(),
            center: DEFAULT_CENTER,
            radius_m: DEFAULT_RADIUS_METERS,
            years: DEFAULT_YEARS,
            parameters: DEFAULT_PARAMETERS.iter().map(|p| p.to_string()).collect(),
            location_limit: LOCATION_LIMIT,
        }
    }

    /// Reads the API credential and datastore root from the environment.
    /// `datastore_override` takes precedence over the environment variable,
    /// for contexts where the path arrives as a command-line flag instead.
    pub fn from_env(datastore_override: Option<PathBuf>) -> Result<Self, ArchiverError> {
        let api_key =
            env::var(ENV_API_KEY).map_err(|_| ArchiverError::MissingEnv(ENV_API_KEY))?;
        let datastore = match datastore_override {
            Some(path) => path,
            None => env::var(ENV_DATASTORE)
                .map(PathBuf::from)
                .map_err(|_| ArchiverError::MissingEnv(ENV_DATASTORE))?,
        };
        Ok(Self::new(api_key, datastore))
    }
}
