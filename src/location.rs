use serde::{Deserialize, Serialize};
use std::fmt;

/// Latitude of Nordkapp, Norway. Used when no fix has ever been seen.
pub const DEFAULT_LATITUDE: f64 = 71.172500;
/// Longitude of Nordkapp, Norway
pub const DEFAULT_LONGITUDE: f64 = 25.784444;
/// Accuracy radius of the default location (meters)
pub const DEFAULT_ACCURACY: f64 = 300.0;
/// Sentinel for "no altitude reported"
pub const DEFAULT_ALTITUDE: f64 = 0.0;

/// Source of a location fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gps,
    Network,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gps => "gps",
            Provider::Network => "network",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw location reading pushed by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub provider: Provider,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Radius of 68% confidence (meters)
    pub accuracy: f64,
    /// Wall-clock time of the fix (ms since epoch)
    pub time: i64,
    /// Monotonic capture time (ns), comparable with `Clock::elapsed_realtime_nanos`
    pub elapsed_realtime_nanos: i64,
    #[serde(default)]
    pub satellite_count: u32,
}

impl LocationFix {
    pub fn new(
        provider: Provider,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        accuracy: f64,
        time: i64,
        elapsed_realtime_nanos: i64,
    ) -> Self {
        Self {
            provider,
            latitude,
            longitude,
            altitude,
            accuracy,
            time,
            elapsed_realtime_nanos,
            satellite_count: 0,
        }
    }

    pub fn with_satellites(mut self, satellite_count: u32) -> Self {
        self.satellite_count = satellite_count;
        self
    }

    /// Fallback location used before any provider has reported
    pub fn default_location() -> Self {
        Self::new(
            Provider::Network,
            DEFAULT_LATITUDE,
            DEFAULT_LONGITUDE,
            DEFAULT_ALTITUDE,
            DEFAULT_ACCURACY,
            0,
            0,
        )
    }

    pub fn has_altitude(&self) -> bool {
        self.altitude != DEFAULT_ALTITUDE
    }
}
