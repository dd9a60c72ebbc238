//! Location quality checks.
//!
//! Decides whether a raw fix is fresh enough, accurate enough and far enough
//! from the previous waypoint to be recorded, and which of two fixes is the
//! better estimate of the current position.

use geo::{GeodesicDistance, Point};

use crate::location::{LocationFix, Provider};

/// Two fixes further apart than this in time are never compared on accuracy (ms)
pub const SIGNIFICANT_TIME_DIFFERENCE: i64 = 120_000;
/// Accuracy degradation tolerated from the same provider (meters)
pub const SIGNIFICANT_ACCURACY_DEGRADATION: f64 = 200.0;
/// Extra accuracy allowance for non-GPS providers (meters)
pub const NETWORK_ACCURACY_ALLOWANCE: u32 = 10;
/// Maximum fix age (ns)
pub const DEFAULT_LOCATION_AGE_THRESHOLD_NANOS: i64 = 60_000_000_000;
/// Substitute for a zero/unknown accuracy radius (meters)
pub const DEFAULT_DISTINCTNESS_ACCURACY: f64 = 15.0;
/// Gap between fixes that marks the earlier one as a stop-over (ms)
pub const STOP_OVER_THRESHOLD: i64 = 300_000;
/// Speed between the first two fixes above which the first is a glitch (km/h)
pub const IMPLAUSIBLE_TRACK_START_SPEED: f64 = 250.0;

/// Geodesic distance in meters between two fixes (WGS84 ellipsoid)
pub fn distance_between(a: &LocationFix, b: &LocationFix) -> f64 {
    let pa = Point::new(a.longitude, a.latitude);
    let pb = Point::new(b.longitude, b.latitude);
    pa.geodesic_distance(&pb)
}

/// Distance from `previous` to `fix`, zero when there is no previous fix
pub fn calculate_distance(previous: Option<&LocationFix>, fix: &LocationFix) -> f64 {
    previous.map_or(0.0, |prev| distance_between(prev, fix))
}

/// Whether `candidate` is a better position estimate than `reference`
pub fn is_better_location(candidate: &LocationFix, reference: Option<&LocationFix>) -> bool {
    let reference = match reference {
        Some(reference) => reference,
        None => return true,
    };

    let time_delta = candidate.time - reference.time;
    if time_delta > SIGNIFICANT_TIME_DIFFERENCE {
        // user has likely moved
        return true;
    }
    if time_delta < -SIGNIFICANT_TIME_DIFFERENCE {
        return false;
    }

    let is_newer = time_delta > 0;
    let accuracy_delta = candidate.accuracy - reference.accuracy;
    let is_less_accurate = accuracy_delta > 0.0;
    let is_more_accurate = accuracy_delta < 0.0;
    let is_significantly_less_accurate = accuracy_delta > SIGNIFICANT_ACCURACY_DEGRADATION;
    let is_from_same_provider = candidate.provider == reference.provider;

    is_more_accurate
        || (is_newer && !is_less_accurate)
        || (is_newer && !is_significantly_less_accurate && is_from_same_provider)
}

/// Fix age measured on the monotonic clock must stay below `threshold_nanos`
pub fn is_recent_enough(fix: &LocationFix, now_nanos: i64, threshold_nanos: i64) -> bool {
    now_nanos - fix.elapsed_realtime_nanos < threshold_nanos
}

/// Accuracy radius must stay below the threshold; network fixes get some slack
pub fn is_accurate_enough(fix: &LocationFix, threshold_meters: u32) -> bool {
    let threshold = match fix.provider {
        Provider::Gps => threshold_meters,
        Provider::Network => threshold_meters + NETWORK_ACCURACY_ALLOWANCE,
    };
    fix.accuracy < f64::from(threshold)
}

/// Whether `fix` moved further from `previous` than the combined position
/// uncertainty of both fixes, scaled by `multiplier` standard deviations.
pub fn is_different_enough(previous: Option<&LocationFix>, fix: &LocationFix, multiplier: u32) -> bool {
    let previous = match previous {
        Some(previous) => previous,
        None => return true,
    };
    let accuracy_a = effective_accuracy(previous.accuracy);
    let accuracy_b = effective_accuracy(fix.accuracy);
    let combined = (accuracy_a * accuracy_a + accuracy_b * accuracy_b).sqrt();
    distance_between(previous, fix) > combined * f64::from(multiplier.max(1))
}

fn effective_accuracy(accuracy: f64) -> f64 {
    if accuracy > 0.0 && accuracy.is_finite() {
        accuracy
    } else {
        DEFAULT_DISTINCTNESS_ACCURACY
    }
}

/// Whether the time gap between two consecutive fixes suggests a stop
pub fn is_stop_over(previous: Option<&LocationFix>, fix: &LocationFix) -> bool {
    previous.map_or(false, |prev| fix.time - prev.time > STOP_OVER_THRESHOLD)
}

/// Speed in km/h implied by moving from `first` to `second`
pub fn implied_speed_kmh(first: &LocationFix, second: &LocationFix) -> f64 {
    let distance = distance_between(first, second);
    let seconds = (second.time - first.time) as f64 / 1000.0;
    if seconds <= 0.0 {
        return if distance > 0.0 { f64::INFINITY } else { 0.0 };
    }
    distance / seconds * 3.6
}

/// The first waypoint of a track is a glitch when reaching the second fix
/// from it would require an impossible speed.
pub fn is_first_location_plausible(first: &LocationFix, second: &LocationFix) -> bool {
    implied_speed_kmh(first, second) < IMPLAUSIBLE_TRACK_START_SPEED
}

/// Why a fix was not recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No fix has been received yet
    NoFix,
    Stale,
    Inaccurate,
    TooClose,
}

/// The acceptance gate applied to each tick's candidate fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationQualityFilter {
    pub accuracy_threshold: u32,
    pub age_threshold_nanos: i64,
    pub accuracy_multiplier: u32,
}

impl Default for LocationQualityFilter {
    fn default() -> Self {
        Self {
            accuracy_threshold: 30,
            age_threshold_nanos: DEFAULT_LOCATION_AGE_THRESHOLD_NANOS,
            accuracy_multiplier: 1,
        }
    }
}

impl LocationQualityFilter {
    /// Run recency, accuracy and distinctness checks in that order
    pub fn check(
        &self,
        previous: Option<&LocationFix>,
        fix: &LocationFix,
        now_nanos: i64,
    ) -> Result<(), Rejection> {
        if !is_recent_enough(fix, now_nanos, self.age_threshold_nanos) {
            return Err(Rejection::Stale);
        }
        if !is_accurate_enough(fix, self.accuracy_threshold) {
            return Err(Rejection::Inaccurate);
        }
        if !is_different_enough(previous, fix, self.accuracy_multiplier) {
            return Err(Rejection::TooClose);
        }
        Ok(())
    }
}
