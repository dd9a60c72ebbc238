use serde::{Deserialize, Serialize};

use crate::location::{LocationFix, Provider, DEFAULT_LATITUDE, DEFAULT_LONGITUDE};
use crate::statistics;

/// Current on-disk version of a track document
pub const CURRENT_TRACK_FORMAT_VERSION: u32 = 4;
/// Current on-disk version of the track list document
pub const CURRENT_TRACKLIST_FORMAT_VERSION: u32 = 1;
/// Map zoom used for a freshly created track
pub const DEFAULT_ZOOM_LEVEL: f64 = 16.0;

/// One accepted location sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub provider: Provider,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub accuracy: f64,
    /// ms since epoch
    pub time: i64,
    /// Track length when this waypoint was added (meters)
    pub distance_to_starting_point: f64,
    pub satellite_count: u32,
    pub is_stop_over: bool,
    pub starred: bool,
}

impl Waypoint {
    pub fn from_fix(fix: &LocationFix, distance_to_starting_point: f64) -> Self {
        Waypoint {
            provider: fix.provider,
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude,
            accuracy: fix.accuracy,
            time: fix.time,
            distance_to_starting_point,
            satellite_count: fix.satellite_count,
            is_stop_over: false,
            starred: false,
        }
    }

    /// Back to a fix for distance and quality comparisons. The monotonic
    /// capture time is not stored, so it is reported as zero.
    pub fn to_fix(&self) -> LocationFix {
        LocationFix::new(
            self.provider,
            self.latitude,
            self.longitude,
            self.altitude,
            self.accuracy,
            self.time,
            0,
        )
        .with_satellites(self.satellite_count)
    }
}

/// One recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_format_version: u32,
    pub waypoints: Vec<Waypoint>,
    /// meters
    pub length: f64,
    /// ms between recording start and the last tick, pauses included
    pub duration: i64,
    /// ms spent paused
    pub recording_paused: i64,
    /// -1 when no step counter is available
    pub step_count: f64,
    /// ms since epoch
    pub recording_start: i64,
    /// ms since epoch
    pub recording_stop: i64,
    pub max_altitude: f64,
    pub min_altitude: f64,
    /// Cumulative climb (meters)
    pub positive_elevation: f64,
    /// Cumulative descent (meters, stored positive)
    pub negative_elevation: f64,
    pub track_path: String,
    pub gpx_path: String,
    pub latitude: f64,
    pub longitude: f64,
    pub zoom_level: f64,
    pub name: String,
}

impl Track {
    /// Empty track whose recording starts at `start_millis`
    pub fn new(start_millis: i64) -> Self {
        Track {
            track_format_version: CURRENT_TRACK_FORMAT_VERSION,
            waypoints: Vec::new(),
            length: 0.0,
            duration: 0,
            recording_paused: 0,
            step_count: 0.0,
            recording_start: start_millis,
            recording_stop: start_millis,
            max_altitude: 0.0,
            min_altitude: 0.0,
            positive_elevation: 0.0,
            negative_elevation: 0.0,
            track_path: String::new(),
            gpx_path: String::new(),
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            zoom_level: DEFAULT_ZOOM_LEVEL,
            name: statistics::readable_date(start_millis),
        }
    }

    /// Unique id: the recording start
    pub fn id(&self) -> i64 {
        self.recording_start
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn last_waypoint(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }

    /// Duration minus time spent paused (ms)
    pub fn moving_duration(&self) -> i64 {
        self.duration - self.recording_paused
    }

    /// Toggle the starred flag on every waypoint at exactly this position.
    /// Returns the new state of the last matching waypoint, if any matched.
    pub fn toggle_starred(&mut self, latitude: f64, longitude: f64) -> Option<bool> {
        let mut state = None;
        for waypoint in self
            .waypoints
            .iter_mut()
            .filter(|w| w.latitude == latitude && w.longitude == longitude)
        {
            waypoint.starred = !waypoint.starred;
            state = Some(waypoint.starred);
        }
        state
    }

    pub fn starred_waypoints(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.iter().filter(|w| w.starred)
    }

    /// Summary for the track list
    pub fn to_tracklist_element(&self) -> TrackListElement {
        TrackListElement {
            name: self.name.clone(),
            date: self.recording_start,
            date_string: statistics::readable_date(self.recording_start),
            duration_string: statistics::readable_duration(self.duration, false),
            length: self.length,
            track_path: self.track_path.clone(),
            gpx_path: self.gpx_path.clone(),
            starred: false,
        }
    }
}

/// Lightweight summary of a saved track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackListElement {
    pub name: String,
    /// Recording start (ms); doubles as the track id
    pub date: i64,
    pub date_string: String,
    pub duration_string: String,
    pub length: f64,
    pub track_path: String,
    pub gpx_path: String,
    pub starred: bool,
}

impl TrackListElement {
    pub fn track_id(&self) -> i64 {
        self.date
    }
}

/// Ordered collection of saved-track summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackList {
    pub tracklist_format_version: u32,
    pub elements: Vec<TrackListElement>,
    /// ms since epoch
    pub modification_date: i64,
    pub total_distance_all: f64,
}

impl Default for TrackList {
    fn default() -> Self {
        TrackList {
            tracklist_format_version: CURRENT_TRACKLIST_FORMAT_VERSION,
            elements: Vec::new(),
            modification_date: 0,
            total_distance_all: 0.0,
        }
    }
}

impl TrackList {
    pub fn get(&self, track_id: i64) -> Option<&TrackListElement> {
        self.elements.iter().find(|e| e.track_id() == track_id)
    }

    pub fn get_mut(&mut self, track_id: i64) -> Option<&mut TrackListElement> {
        self.elements.iter_mut().find(|e| e.track_id() == track_id)
    }

    /// Append a summary, replacing an existing one with the same id
    pub fn add(&mut self, element: TrackListElement) {
        match self.get_mut(element.track_id()) {
            Some(existing) => *existing = element,
            None => self.elements.push(element),
        }
        self.total_distance_all = self.elements.iter().map(|e| e.length).sum();
    }

    pub fn remove(&mut self, track_id: i64) -> Option<TrackListElement> {
        let index = self.elements.iter().position(|e| e.track_id() == track_id)?;
        let removed = self.elements.remove(index);
        self.total_distance_all = self.elements.iter().map(|e| e.length).sum();
        Some(removed)
    }

    pub fn non_starred_ids(&self) -> Vec<i64> {
        self.elements
            .iter()
            .filter(|e| !e.starred)
            .map(TrackListElement::track_id)
            .collect()
    }

    /// Recompute totals from the full tracks
    pub fn recalculate_totals(&mut self, tracks: &[Track]) {
        self.total_distance_all = tracks.iter().map(|t| t.length).sum();
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
