//! Folds accepted fixes into the cumulative state of a track.

use crate::filter::{self, LocationQualityFilter, Rejection};
use crate::location::{LocationFix, DEFAULT_ALTITUDE};
use crate::smoothing::AltitudeSmoother;
use crate::track::{Track, Waypoint};

/// Result of feeding one candidate fix to the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The candidate became a waypoint
    pub accepted: bool,
    /// Why it did not, when rejected
    pub rejection: Option<Rejection>,
    /// The single existing waypoint was dropped as an implausible start
    pub discarded_first: bool,
}

impl UpdateOutcome {
    fn rejected(rejection: Rejection, discarded_first: bool) -> Self {
        Self {
            accepted: false,
            rejection: Some(rejection),
            discarded_first,
        }
    }
}

/// Track-building state machine.
///
/// Owns only the transient "just resumed" flag; the filter and the altitude
/// window belong to the session and are lent in per update. Must be driven
/// from a single thread.
#[derive(Debug, Clone, Default)]
pub struct TrackAccumulator {
    just_resumed: bool,
}

impl TrackAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress distance and elevation for the next accepted fix
    pub fn mark_resumed(&mut self) {
        self.just_resumed = true;
    }

    pub fn is_just_resumed(&self) -> bool {
        self.just_resumed
    }

    pub fn reset(&mut self) {
        self.just_resumed = false;
    }

    /// Process one tick's candidate fix.
    ///
    /// Duration bookkeeping advances whether or not the fix is accepted.
    pub fn update(
        &mut self,
        track: &mut Track,
        fix: &LocationFix,
        quality: &LocationQualityFilter,
        smoother: &mut AltitudeSmoother,
        now_millis: i64,
        now_nanos: i64,
    ) -> UpdateOutcome {
        // Step 1: previous location, dropping an implausible first waypoint
        let mut discarded_first = false;
        let previous: Option<LocationFix> = match track.waypoints.len() {
            0 => None,
            1 if !filter::is_first_location_plausible(&track.waypoints[0].to_fix(), fix) => {
                log::debug!("Discarding implausible first waypoint");
                track.waypoints.clear();
                track.max_altitude = DEFAULT_ALTITUDE;
                track.min_altitude = DEFAULT_ALTITUDE;
                smoother.reset();
                discarded_first = true;
                None
            }
            n => Some(track.waypoints[n - 1].to_fix()),
        };

        // Step 2: elapsed wall time always advances
        advance_duration(track, now_millis);

        // Step 3: acceptance gate
        if let Some(prev) = previous.as_ref() {
            if fix.time < prev.time {
                return UpdateOutcome::rejected(Rejection::Stale, discarded_first);
            }
        }
        if let Err(rejection) = quality.check(previous.as_ref(), fix, now_nanos) {
            log::trace!("Fix rejected: {:?}", rejection);
            return UpdateOutcome::rejected(rejection, discarded_first);
        }

        // Step 4: fold the fix in
        if !self.just_resumed {
            track.length += filter::calculate_distance(previous.as_ref(), fix);
        }

        if fix.has_altitude() {
            self.update_altitude(track, fix.altitude, smoother);
        }

        if filter::is_stop_over(previous.as_ref(), fix) {
            if let Some(last) = track.waypoints.last_mut() {
                last.is_stop_over = true;
            }
        }

        track.latitude = fix.latitude;
        track.longitude = fix.longitude;
        track.waypoints.push(Waypoint::from_fix(fix, track.length));

        // Step 5
        self.just_resumed = false;

        UpdateOutcome {
            accepted: true,
            rejection: None,
            discarded_first,
        }
    }

    /// Tick without a candidate fix: only the duration advances
    pub fn idle(&mut self, track: &mut Track, now_millis: i64) -> UpdateOutcome {
        advance_duration(track, now_millis);
        UpdateOutcome::rejected(Rejection::NoFix, false)
    }

    fn update_altitude(&self, track: &mut Track, altitude: f64, smoother: &mut AltitudeSmoother) {
        let unobserved =
            track.max_altitude == DEFAULT_ALTITUDE && track.min_altitude == DEFAULT_ALTITUDE;
        if unobserved {
            track.max_altitude = altitude;
            track.min_altitude = altitude;
        } else {
            track.max_altitude = track.max_altitude.max(altitude);
            track.min_altitude = track.min_altitude.min(altitude);
        }

        let previous_average = smoother.average();
        smoother.push(altitude);
        if self.just_resumed || !smoother.is_prepared() {
            return;
        }

        let difference = smoother.average() - previous_average;
        if difference > 0.0 {
            track.positive_elevation += difference;
        } else if difference < 0.0 {
            track.negative_elevation += -difference;
        }
        log::debug!(
            "Elevation || prev = {:.2} | curr = {:.2} | pos = {:.2} | neg = {:.2}",
            previous_average,
            smoother.average(),
            track.positive_elevation,
            track.negative_elevation
        );
    }
}

fn advance_duration(track: &mut Track, now_millis: i64) {
    track.duration += now_millis - track.recording_stop;
    track.recording_stop = now_millis;
}
