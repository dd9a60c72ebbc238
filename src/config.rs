use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TrackbookError};
use crate::filter::LocationQualityFilter;
use crate::smoothing::{
    DEFAULT_ALTITUDE_SMOOTHING_VALUE, MAX_WAYPOINTS_FOR_ELEVATION, MIN_WAYPOINTS_FOR_ELEVATION,
};

/// Recording settings. Passed into the session explicitly and replaced
/// through `RecordingSession::on_config_changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ignore the network provider
    pub gps_only: bool,
    /// Maximum accepted accuracy radius for GPS fixes (meters)
    pub accuracy_threshold: u32,
    /// Maximum fix age (seconds)
    pub location_age_threshold_secs: u64,
    /// Altitude moving-average window (5..=20)
    pub altitude_smoothing_value: usize,
    pub use_imperial: bool,
    /// Require two standard deviations of separation between waypoints
    pub recording_accuracy_high: bool,
    /// Period of the recording tick (ms)
    pub tick_interval_ms: u64,
    /// Minimum period between snapshot writes (ms)
    pub snapshot_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gps_only: false,
            accuracy_threshold: 30,
            location_age_threshold_secs: 60,
            altitude_smoothing_value: DEFAULT_ALTITUDE_SMOOTHING_VALUE,
            use_imperial: false,
            recording_accuracy_high: false,
            tick_interval_ms: 1_000,
            snapshot_interval_ms: 9_000,
        }
    }
}

/// A discrete settings change the session reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    GpsOnly(bool),
    Units,
    RecordingAccuracy,
    AccuracyThreshold,
    LocationAge,
    AltitudeSmoothing(usize),
    Intervals,
}

impl Config {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.accuracy_threshold == 0 {
            return Err(TrackbookError::InvalidConfig(
                "accuracy_threshold must be positive".to_string(),
            ));
        }
        if self.location_age_threshold_secs == 0 {
            return Err(TrackbookError::InvalidConfig(
                "location_age_threshold_secs must be positive".to_string(),
            ));
        }
        if !(MIN_WAYPOINTS_FOR_ELEVATION..=MAX_WAYPOINTS_FOR_ELEVATION)
            .contains(&self.altitude_smoothing_value)
        {
            return Err(TrackbookError::InvalidConfig(format!(
                "altitude_smoothing_value must be within {}..={}, got {}",
                MIN_WAYPOINTS_FOR_ELEVATION, MAX_WAYPOINTS_FOR_ELEVATION, self.altitude_smoothing_value
            )));
        }
        if self.tick_interval_ms == 0 || self.snapshot_interval_ms == 0 {
            return Err(TrackbookError::InvalidConfig(
                "intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Distinctness multiplier: 2 in high-accuracy mode, else 1
    pub fn accuracy_multiplier(&self) -> u32 {
        if self.recording_accuracy_high {
            2
        } else {
            1
        }
    }

    pub fn location_age_threshold_nanos(&self) -> i64 {
        i64::try_from(self.location_age_threshold_secs)
            .unwrap_or(i64::MAX / 1_000_000_000)
            .saturating_mul(1_000_000_000)
    }

    /// Acceptance gate configured from these settings
    pub fn quality_filter(&self) -> LocationQualityFilter {
        LocationQualityFilter {
            accuracy_threshold: self.accuracy_threshold,
            age_threshold_nanos: self.location_age_threshold_nanos(),
            accuracy_multiplier: self.accuracy_multiplier(),
        }
    }

    /// Changes needed to go from `self` to `next`
    pub fn diff(&self, next: &Config) -> Vec<ConfigChange> {
        let mut changes = Vec::new();
        if self.gps_only != next.gps_only {
            changes.push(ConfigChange::GpsOnly(next.gps_only));
        }
        if self.use_imperial != next.use_imperial {
            changes.push(ConfigChange::Units);
        }
        if self.recording_accuracy_high != next.recording_accuracy_high {
            changes.push(ConfigChange::RecordingAccuracy);
        }
        if self.accuracy_threshold != next.accuracy_threshold {
            changes.push(ConfigChange::AccuracyThreshold);
        }
        if self.location_age_threshold_secs != next.location_age_threshold_secs {
            changes.push(ConfigChange::LocationAge);
        }
        if self.altitude_smoothing_value != next.altitude_smoothing_value {
            changes.push(ConfigChange::AltitudeSmoothing(next.altitude_smoothing_value));
        }
        if self.tick_interval_ms != next.tick_interval_ms
            || self.snapshot_interval_ms != next.snapshot_interval_ms
        {
            changes.push(ConfigChange::Intervals);
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.accuracy_multiplier(), 1);
        assert_eq!(config.location_age_threshold_nanos(), 60_000_000_000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"gps_only": true}"#).unwrap();
        assert!(config.gps_only);
        assert_eq!(config.accuracy_threshold, 30);
        assert_eq!(config.altitude_smoothing_value, 13);
    }

    #[test]
    fn test_validation_rejects_bad_window() {
        let config = Config {
            altitude_smoothing_value: 21,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TrackbookError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"recording_accuracy_high": true, "use_imperial": true}}"#).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.accuracy_multiplier(), 2);
        assert!(config.use_imperial);
        assert_eq!(config.quality_filter().accuracy_multiplier, 2);
    }

    #[test]
    fn test_diff() {
        let old = Config::default();
        let new = Config {
            gps_only: true,
            altitude_smoothing_value: 8,
            ..Config::default()
        };
        assert_eq!(
            old.diff(&new),
            vec![ConfigChange::GpsOnly(true), ConfigChange::AltitudeSmoothing(8)]
        );
        assert!(old.diff(&old).is_empty());
    }
}
