//! Recording session: owns the track being recorded and drives it from a
//! periodic tick.
//!
//! Provider callbacks, step counts and settings changes are queued as
//! [`SessionEvent`]s and drained at the start of every tick, so the track is
//! only ever mutated from the thread calling [`RecordingSession::tick`].

use crossbeam::channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::accumulator::{TrackAccumulator, UpdateOutcome};
use crate::clock::Clock;
use crate::config::{Config, ConfigChange};
use crate::error::{Result, TrackbookError};
use crate::filter::{self, LocationQualityFilter};
use crate::health::{Advisory, ProviderHealth};
use crate::location::{LocationFix, Provider};
use crate::smoothing::AltitudeSmoother;
use crate::statistics;
use crate::storage::{PersistedState, Persister, TrackStore};
use crate::track::Track;

/// Capacity of the event queue between providers and the tick
pub const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordingState {
    #[default]
    NotTracking,
    Active,
    Paused,
}

/// Input delivered to the session from other threads
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Fix(LocationFix),
    ProviderEnabled(Provider),
    ProviderDisabled(Provider),
    PermissionChanged(bool),
    /// Cumulative steps since device boot
    StepCount(f64),
    ConfigChanged(Config),
}

/// Platform location service. Fixes are pushed through the session's event
/// queue; this trait only covers queries and listener registration.
pub trait LocationSource: Send {
    fn last_known(&self, provider: Provider) -> Option<LocationFix>;
    fn is_enabled(&self, provider: Provider) -> bool;
    fn has_permission(&self) -> bool;
    fn subscribe(&mut self, provider: Provider) -> Result<()>;
    fn unsubscribe(&mut self, provider: Provider);
}

/// Device step counter
pub trait StepCounter: Send {
    /// Begin delivering `SessionEvent::StepCount`. False when no sensor exists.
    fn start(&mut self) -> bool;
    fn stop(&mut self);
}

/// Location source driven by hand: used for replays and tests
#[derive(Debug, Clone)]
pub struct ManualLocationSource {
    pub gps_enabled: bool,
    pub network_enabled: bool,
    pub permission: bool,
    pub last_gps: Option<LocationFix>,
    pub last_network: Option<LocationFix>,
}

impl Default for ManualLocationSource {
    fn default() -> Self {
        ManualLocationSource {
            gps_enabled: true,
            network_enabled: true,
            permission: true,
            last_gps: None,
            last_network: None,
        }
    }
}

impl LocationSource for ManualLocationSource {
    fn last_known(&self, provider: Provider) -> Option<LocationFix> {
        match provider {
            Provider::Gps => self.last_gps.clone(),
            Provider::Network => self.last_network.clone(),
        }
    }

    fn is_enabled(&self, provider: Provider) -> bool {
        match provider {
            Provider::Gps => self.gps_enabled,
            Provider::Network => self.network_enabled,
        }
    }

    fn has_permission(&self) -> bool {
        self.permission
    }

    fn subscribe(&mut self, provider: Provider) -> Result<()> {
        if !self.permission {
            return Err(TrackbookError::PermissionDenied(provider));
        }
        if !self.is_enabled(provider) {
            return Err(TrackbookError::ProviderUnavailable(provider));
        }
        Ok(())
    }

    fn unsubscribe(&mut self, _provider: Provider) {}
}

/// One recording, from start to stop
pub struct RecordingSession {
    config: Config,
    clock: Arc<dyn Clock>,
    source: Box<dyn LocationSource>,
    step_counter: Option<Box<dyn StepCounter>>,
    persister: Persister,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,

    state: RecordingState,
    track: Track,
    accumulator: TrackAccumulator,
    quality: LocationQualityFilter,
    smoother: AltitudeSmoother,
    health: ProviderHealth,
    current_best_location: Option<LocationFix>,
    step_offset: Option<f64>,
    last_snapshot_millis: i64,
}

impl RecordingSession {
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        source: Box<dyn LocationSource>,
        step_counter: Option<Box<dyn StepCounter>>,
        store: Arc<dyn TrackStore>,
    ) -> Result<Self> {
        config.validate()?;
        let persister = Persister::new(store)?;
        let (events_tx, events_rx) = channel::bounded(EVENT_QUEUE_CAPACITY);

        let mut health = ProviderHealth::new(config.location_age_threshold_nanos());
        health.set_enabled(Provider::Gps, source.is_enabled(Provider::Gps));
        health.set_enabled(Provider::Network, source.is_enabled(Provider::Network));
        health.permission_granted = source.has_permission();

        // persisted best location first, then whatever the providers remember
        // monotonic times from another process are meaningless here, so a
        // restored fix counts as already aged out
        let aged_out = clock.elapsed_realtime_nanos() - config.location_age_threshold_nanos();
        let mut current_best_location = match persister.store().load_state() {
            Ok(state) => state.and_then(|s| s.current_best_location).map(|mut fix| {
                fix.elapsed_realtime_nanos = aged_out;
                fix
            }),
            Err(e) => {
                log::warn!("Could not read session state: {}", e);
                None
            }
        };
        for provider in [Provider::Gps, Provider::Network] {
            if let Some(fix) = source.last_known(provider) {
                if filter::is_better_location(&fix, current_best_location.as_ref()) {
                    current_best_location = Some(fix);
                }
            }
        }

        let now = clock.now_millis();
        Ok(RecordingSession {
            quality: config.quality_filter(),
            smoother: AltitudeSmoother::new(config.altitude_smoothing_value),
            config,
            clock,
            source,
            step_counter,
            persister,
            events_tx,
            events_rx,
            state: RecordingState::NotTracking,
            track: Track::new(now),
            accumulator: TrackAccumulator::new(),
            health,
            current_best_location,
            step_offset: None,
            last_snapshot_millis: now,
        })
    }

    /// Sender for provider callbacks and other producers
    pub fn event_sender(&self) -> Sender<SessionEvent> {
        self.events_tx.clone()
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn health(&self) -> &ProviderHealth {
        &self.health
    }

    pub fn is_just_resumed(&self) -> bool {
        self.accumulator.is_just_resumed()
    }

    /// Best fix seen so far, or the default location before any fix
    pub fn current_best_location(&self) -> LocationFix {
        self.current_best_location
            .clone()
            .unwrap_or_else(LocationFix::default_location)
    }

    pub fn advisories(&self) -> Vec<Advisory> {
        self.health
            .advisories(self.clock.elapsed_realtime_nanos(), self.config.gps_only)
    }

    /// Begin recording. A new track starts empty at the current time;
    /// otherwise the current track is continued.
    pub fn start(&mut self, new_track: bool) -> Result<()> {
        if self.state == RecordingState::Active {
            return Err(TrackbookError::AlreadyRecording);
        }
        let now = self.clock.now_millis();
        if new_track {
            self.persister.cancel_pending();
            self.track = Track::new(now);
            self.accumulator.reset();
            self.smoother.reset();
            self.step_offset = None;
        }

        self.subscribe_providers();
        self.state = RecordingState::Active;
        self.last_snapshot_millis = now;
        self.persist_state();
        self.start_step_counter();

        log::info!(
            "Recording {} \"{}\"",
            if new_track { "started" } else { "continued" },
            self.track.name
        );
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            RecordingState::Active => {
                self.halt(RecordingState::Paused);
                log::info!(
                    "Recording paused at {}",
                    statistics::readable_distance(self.track.length, self.config.use_imperial)
                );
                Ok(())
            }
            RecordingState::Paused => {
                Err(TrackbookError::InvalidState("Already paused".to_string()))
            }
            RecordingState::NotTracking => Err(TrackbookError::NotRecording),
        }
    }

    /// Continue after a pause or a process restart from the last snapshot
    pub fn resume(&mut self) -> Result<()> {
        if self.state == RecordingState::Active {
            return Err(TrackbookError::AlreadyRecording);
        }
        if let Err(e) = self.persister.flush() {
            log::warn!("Pending writes not confirmed before resume: {}", e);
        }
        match self.persister.store().load_snapshot() {
            Ok(Some(track)) => self.track = track,
            Ok(None) => log::debug!("No snapshot, continuing the in-memory track"),
            Err(e) => log::error!("Could not read snapshot, continuing the in-memory track: {}", e),
        }

        if let Some(last) = self.track.waypoints.last_mut() {
            last.is_stop_over = true;
        }
        self.accumulator.mark_resumed();
        let now = self.clock.now_millis();
        self.track.recording_paused += now - self.track.recording_stop;

        // elevation is computed only from altitudes measured after the pause
        self.smoother.reset();

        self.start(false)
    }

    /// End the recording. A non-empty track is archived in the background and
    /// returned; an empty one is dropped.
    pub fn stop(&mut self) -> Result<Option<Track>> {
        match self.state {
            RecordingState::NotTracking => return Err(TrackbookError::NotRecording),
            RecordingState::Active => self.halt(RecordingState::Paused),
            RecordingState::Paused => {}
        }

        let finished = if self.track.is_empty() {
            self.persister.delete_snapshot();
            None
        } else {
            self.persister.finalize(&self.track);
            Some(self.track.clone())
        };

        self.track = Track::new(self.clock.now_millis());
        self.accumulator.reset();
        self.step_offset = None;
        self.state = RecordingState::NotTracking;
        self.persist_state();
        Ok(finished)
    }

    /// Discard the current track and its snapshot. Safe to call repeatedly.
    pub fn clear(&mut self) {
        self.persister.cancel_pending();
        if self.state == RecordingState::Active {
            self.stop_step_counter();
            self.unsubscribe_providers();
        }
        self.track = Track::new(self.clock.now_millis());
        self.accumulator.reset();
        self.smoother.reset();
        self.step_offset = None;
        self.persister.delete_snapshot();
        self.state = RecordingState::NotTracking;
        self.persist_state();
    }

    /// Restore the state of a previous process. An interrupted active
    /// recording is resumed; returns true in that case.
    pub fn recover(&mut self) -> Result<bool> {
        let persisted = match self.persister.store().load_state()? {
            Some(state) => state,
            None => return Ok(false),
        };
        match persisted.recording_state {
            RecordingState::Active if self.state != RecordingState::Active => {
                log::warn!("Recording was interrupted, trying to resume");
                self.resume()?;
                Ok(true)
            }
            RecordingState::Paused if self.state == RecordingState::NotTracking => {
                if let Some(track) = self.persister.store().load_snapshot()? {
                    self.track = track;
                }
                self.state = RecordingState::Paused;
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Apply new settings
    pub fn on_config_changed(&mut self, config: Config) -> Result<Vec<ConfigChange>> {
        config.validate()?;
        let changes = self.config.diff(&config);
        self.config = config;

        for change in &changes {
            match change {
                ConfigChange::GpsOnly(true) => self.unsubscribe(Provider::Network),
                ConfigChange::GpsOnly(false) => {
                    if self.state == RecordingState::Active {
                        self.subscribe(Provider::Network);
                    }
                }
                ConfigChange::AltitudeSmoothing(capacity) => self.smoother.set_capacity(*capacity),
                ConfigChange::RecordingAccuracy
                | ConfigChange::AccuracyThreshold
                | ConfigChange::LocationAge => {
                    self.quality = self.config.quality_filter();
                    self.health
                        .set_silence_threshold(self.config.location_age_threshold_nanos());
                }
                ConfigChange::Units | ConfigChange::Intervals => {}
            }
        }
        if !changes.is_empty() {
            log::info!("Settings changed: {:?}", changes);
        }
        Ok(changes)
    }

    /// Flip the starred flag of the waypoint at this position
    pub fn toggle_starred(&mut self, latitude: f64, longitude: f64) -> Option<bool> {
        let starred = self.track.toggle_starred(latitude, longitude)?;
        self.persister.save_snapshot(&self.track);
        Some(starred)
    }

    /// Wait until all queued writes are on disk
    pub fn flush(&self) -> Result<()> {
        self.persister.flush()
    }

    /// One step of the recording loop. Returns the accumulator's verdict on
    /// the current best fix, or `None` while not recording. Never fails.
    pub fn tick(&mut self) -> Option<UpdateOutcome> {
        self.drain_events();
        if self.state != RecordingState::Active {
            return None;
        }

        let now_millis = self.clock.now_millis();
        let now_nanos = self.clock.elapsed_realtime_nanos();
        let outcome = match self.current_best_location.as_ref() {
            Some(candidate) => self.accumulator.update(
                &mut self.track,
                candidate,
                &self.quality,
                &mut self.smoother,
                now_millis,
                now_nanos,
            ),
            // the placeholder location is never recorded
            None => self.accumulator.idle(&mut self.track, now_millis),
        };
        if outcome.discarded_first {
            log::info!("Dropped implausible first waypoint");
        }

        let interval = i64::try_from(self.config.snapshot_interval_ms).unwrap_or(i64::MAX);
        if now_millis - self.last_snapshot_millis >= interval {
            self.last_snapshot_millis = now_millis;
            self.persister.save_snapshot(&self.track);
            self.persist_state();
        }
        Some(outcome)
    }

    fn drain_events(&mut self) {
        let events: Vec<SessionEvent> = self
            .events_rx
            .try_iter()
            .take(EVENT_QUEUE_CAPACITY)
            .collect();
        for event in events {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Fix(fix) => {
                if !self.health.permission_granted {
                    log::trace!("Ignoring {} fix without permission", fix.provider);
                    return;
                }
                if self.config.gps_only && fix.provider == Provider::Network {
                    return;
                }
                self.health
                    .record_fix(fix.provider, self.clock.elapsed_realtime_nanos());
                if filter::is_better_location(&fix, self.current_best_location.as_ref()) {
                    self.current_best_location = Some(fix);
                }
            }
            SessionEvent::ProviderEnabled(provider) => {
                log::info!("{} provider enabled", provider);
                self.health.set_enabled(provider, true);
                let wanted = provider == Provider::Gps || !self.config.gps_only;
                if self.state == RecordingState::Active && wanted {
                    self.subscribe(provider);
                }
            }
            SessionEvent::ProviderDisabled(provider) => {
                log::warn!("{} provider disabled", provider);
                self.health.set_enabled(provider, false);
            }
            SessionEvent::PermissionChanged(granted) => {
                self.health.permission_granted = granted;
                if granted {
                    log::info!("Location permission granted");
                    if self.state == RecordingState::Active {
                        self.subscribe_providers();
                    }
                } else {
                    log::warn!("Location permission revoked, keeping last known fix");
                    self.unsubscribe_providers();
                }
            }
            SessionEvent::StepCount(value) => {
                if self.state != RecordingState::Active {
                    return;
                }
                let step_count = self.track.step_count;
                // steps recorded before a restart stay counted
                let offset = *self
                    .step_offset
                    .get_or_insert_with(|| (value - 1.0) - step_count);
                self.track.step_count = value - offset;
            }
            SessionEvent::ConfigChanged(config) => {
                if let Err(e) = self.on_config_changed(config) {
                    log::error!("Rejected settings change: {}", e);
                }
            }
        }
    }

    /// Stop the tick work, write a snapshot, then release providers
    fn halt(&mut self, next: RecordingState) {
        self.state = next;
        self.track.recording_stop = self.clock.now_millis();
        self.persister.cancel_pending();
        self.persister.save_snapshot(&self.track);
        self.persist_state();
        self.smoother.reset();
        self.stop_step_counter();
        self.unsubscribe_providers();
    }

    fn persist_state(&self) {
        self.persister.save_state(PersistedState::new(
            self.state,
            self.current_best_location.clone(),
        ));
    }

    fn subscribe_providers(&mut self) {
        self.subscribe(Provider::Gps);
        if !self.config.gps_only {
            self.subscribe(Provider::Network);
        }
    }

    fn unsubscribe_providers(&mut self) {
        self.unsubscribe(Provider::Gps);
        self.unsubscribe(Provider::Network);
    }

    fn subscribe(&mut self, provider: Provider) {
        if self.health.status(provider).subscribed {
            return;
        }
        if !self.health.permission_granted {
            log::warn!("{}", TrackbookError::PermissionDenied(provider));
            return;
        }
        let enabled = self.source.is_enabled(provider);
        self.health.set_enabled(provider, enabled);
        if !enabled {
            log::warn!("{}", TrackbookError::ProviderUnavailable(provider));
            return;
        }
        match self.source.subscribe(provider) {
            Ok(()) => {
                self.health
                    .set_subscribed(provider, true, self.clock.elapsed_realtime_nanos());
                log::debug!("Subscribed to {} provider", provider);
            }
            Err(e) if e.is_advisory() => log::warn!("{}", e),
            Err(e) => log::error!("Could not subscribe to {} provider: {}", provider, e),
        }
    }

    fn unsubscribe(&mut self, provider: Provider) {
        if self.health.status(provider).subscribed {
            self.source.unsubscribe(provider);
            self.health
                .set_subscribed(provider, false, self.clock.elapsed_realtime_nanos());
            log::debug!("Unsubscribed from {} provider", provider);
        }
    }

    fn start_step_counter(&mut self) {
        let available = match self.step_counter.as_mut() {
            Some(counter) => counter.start(),
            None => false,
        };
        if !available {
            self.track.step_count = -1.0;
        }
    }

    fn stop_step_counter(&mut self) {
        if let Some(counter) = self.step_counter.as_mut() {
            counter.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::filter::Rejection;
    use crate::storage::JsonFileStore;
    use crate::track::Waypoint;
    use tempfile::TempDir;

    const START: i64 = 1_700_000_000_000;

    struct Fixture {
        _dir: TempDir,
        clock: ManualClock,
        store: Arc<JsonFileStore>,
        session: RecordingSession,
    }

    fn fixture_with(source: ManualLocationSource, config: Config) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        let clock = ManualClock::new(START);
        let session = RecordingSession::new(
            config,
            Arc::new(clock.clone()),
            Box::new(source),
            None,
            store.clone(),
        )
        .unwrap();
        Fixture {
            _dir: dir,
            clock,
            store,
            session,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ManualLocationSource::default(), Config::default())
    }

    impl Fixture {
        /// Deliver a fix `meters_north` of the origin, captured now
        fn fix(&self, meters_north: f64, altitude: f64) {
            let fix = LocationFix::new(
                Provider::Gps,
                meters_north / 111_000.0,
                0.0,
                altitude,
                5.0,
                self.clock.now_millis(),
                self.clock.elapsed_realtime_nanos(),
            );
            self.session
                .event_sender()
                .send(SessionEvent::Fix(fix))
                .unwrap();
        }

        fn step(&mut self, millis: i64) -> Option<UpdateOutcome> {
            self.clock.advance(millis);
            self.session.tick()
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut f = fixture();
        assert_eq!(f.session.state(), RecordingState::NotTracking);
        assert!(matches!(f.session.pause(), Err(TrackbookError::NotRecording)));

        f.session.start(true).unwrap();
        assert!(matches!(
            f.session.start(true),
            Err(TrackbookError::AlreadyRecording)
        ));
        assert!(f.session.health().gps.subscribed);
        assert!(f.session.health().network.subscribed);

        f.session.pause().unwrap();
        assert_eq!(f.session.state(), RecordingState::Paused);
        assert!(!f.session.health().gps.subscribed);
        assert!(matches!(
            f.session.pause(),
            Err(TrackbookError::InvalidState(_))
        ));

        f.session.resume().unwrap();
        assert_eq!(f.session.state(), RecordingState::Active);
        assert!(f.session.stop().unwrap().is_none());
        assert_eq!(f.session.state(), RecordingState::NotTracking);
    }

    #[test]
    fn test_tick_records_waypoints() {
        let mut f = fixture();
        f.session.start(true).unwrap();
        assert_eq!(f.session.track().step_count, -1.0);

        for i in 0..5 {
            f.fix(i as f64 * 20.0, 0.0);
            let outcome = f.step(1_000).unwrap();
            assert!(outcome.accepted);
        }
        let track = f.session.track();
        assert_eq!(track.waypoints.len(), 5);
        assert!(track.length > 79.0 && track.length < 81.0);
        assert_eq!(track.duration, 5_000);
    }

    #[test]
    fn test_tick_is_idle_when_not_recording() {
        let mut f = fixture();
        f.fix(0.0, 0.0);
        assert!(f.step(1_000).is_none());
        // fixes still update the best location
        assert_eq!(f.session.current_best_location().accuracy, 5.0);
    }

    #[test]
    fn test_periodic_snapshot() {
        let mut f = fixture();
        f.session.start(true).unwrap();
        f.fix(0.0, 0.0);
        for _ in 0..8 {
            f.step(1_000);
        }
        f.session.flush().unwrap();
        assert!(f.store.load_snapshot().unwrap().is_none());

        f.step(1_000);
        f.session.flush().unwrap();
        let snapshot = f.store.load_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.waypoints.len(), 1);
        assert_eq!(snapshot.duration, 9_000);
    }

    #[test]
    fn test_resume_marks_stop_over_and_skips_distance() {
        let mut f = fixture();
        f.session.start(true).unwrap();
        for i in 0..3 {
            f.fix(i as f64 * 20.0, 0.0);
            f.step(1_000);
        }
        let length_before = f.session.track().length;
        f.session.pause().unwrap();

        f.clock.advance(60_000);
        f.session.resume().unwrap();
        assert!(f.session.is_just_resumed());
        assert!(f.session.track().waypoints[2].is_stop_over);
        assert_eq!(f.session.track().recording_paused, 60_000);

        f.fix(100.0, 0.0);
        let outcome = f.step(1_000).unwrap();
        assert!(outcome.accepted);
        assert!(!f.session.is_just_resumed());
        assert_eq!(f.session.track().waypoints.len(), 4);
        assert_eq!(f.session.track().length, length_before);
    }

    #[test]
    fn test_stop_archives_track() {
        let mut f = fixture();
        f.session.start(true).unwrap();
        for i in 0..3 {
            f.fix(i as f64 * 20.0, 0.0);
            f.step(1_000);
        }
        let finished = f.session.stop().unwrap().unwrap();
        f.session.flush().unwrap();

        assert_eq!(finished.waypoints.len(), 3);
        assert!(f.session.track().is_empty());
        assert!(f.store.load_snapshot().unwrap().is_none());
        assert_eq!(f.store.load_track(finished.id()).unwrap().waypoints.len(), 3);
        let state = f.store.load_state().unwrap().unwrap();
        assert_eq!(state.recording_state, RecordingState::NotTracking);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut f = fixture();
        f.session.start(true).unwrap();
        f.fix(0.0, 0.0);
        f.step(1_000);

        f.session.clear();
        let once = f.session.track().clone();
        f.session.clear();
        assert_eq!(f.session.track(), &once);
        assert!(once.is_empty());
        assert_eq!(f.session.state(), RecordingState::NotTracking);
        f.session.flush().unwrap();
        assert!(f.store.load_snapshot().unwrap().is_none());
    }

    #[test]
    fn test_recover_resumes_interrupted_recording() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        let mut track = Track::new(START);
        for i in 0..3 {
            let fix = LocationFix::new(Provider::Gps, i as f64 * 1e-3, 0.0, 0.0, 5.0, START + i * 1_000, 0);
            track.waypoints.push(Waypoint::from_fix(&fix, 0.0));
        }
        track.recording_stop = START + 2_000;
        store.save_snapshot(&track).unwrap();
        store
            .save_state(&PersistedState::new(RecordingState::Active, None))
            .unwrap();

        let clock = ManualClock::new(START + 12_000);
        let mut session = RecordingSession::new(
            Config::default(),
            Arc::new(clock),
            Box::new(ManualLocationSource::default()),
            None,
            store,
        )
        .unwrap();
        assert!(session.recover().unwrap());
        assert_eq!(session.state(), RecordingState::Active);
        assert_eq!(session.track().waypoints.len(), 3);
        assert!(session.track().waypoints[2].is_stop_over);
        assert_eq!(session.track().recording_paused, 10_000);
    }

    #[test]
    fn test_recover_keeps_paused_recording_paused() {
        let mut f = fixture();
        f.session.start(true).unwrap();
        for i in 0..3 {
            f.fix(i as f64 * 20.0, 0.0);
            f.step(1_000);
        }
        f.session.pause().unwrap();
        f.session.flush().unwrap();

        let mut restarted = RecordingSession::new(
            Config::default(),
            Arc::new(f.clock.clone()),
            Box::new(ManualLocationSource::default()),
            None,
            f.store.clone(),
        )
        .unwrap();
        assert!(!restarted.recover().unwrap());
        assert_eq!(restarted.state(), RecordingState::Paused);
        assert_eq!(restarted.track().waypoints.len(), 3);
        assert!(!restarted.health().gps.subscribed);
        assert!(restarted.tick().is_none());

        f.clock.advance(5_000);
        restarted.resume().unwrap();
        assert_eq!(restarted.state(), RecordingState::Active);
        assert_eq!(restarted.track().recording_paused, 5_000);
    }

    #[test]
    fn test_default_location_is_never_recorded() {
        let config = Config {
            accuracy_threshold: 400,
            ..Config::default()
        };
        let mut f = fixture_with(ManualLocationSource::default(), config);
        f.session.start(true).unwrap();

        let outcome = f.step(1_000).unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.rejection, Some(Rejection::NoFix));
        assert!(f.session.track().is_empty());
        assert_eq!(f.session.track().duration, 1_000);
        assert_eq!(f.session.current_best_location().latitude, 71.1725);

        f.fix(0.0, 0.0);
        assert!(f.step(1_000).unwrap().accepted);
        assert_eq!(f.session.track().waypoints.len(), 1);
        assert_eq!(f.session.track().waypoints[0].latitude, 0.0);
    }

    #[test]
    fn test_missing_permission_is_advisory() {
        let source = ManualLocationSource {
            permission: false,
            ..ManualLocationSource::default()
        };
        let mut f = fixture_with(source, Config::default());
        f.session.start(true).unwrap();
        assert_eq!(f.session.state(), RecordingState::Active);
        assert!(!f.session.health().gps.subscribed);
        assert!(f.session.advisories().contains(&Advisory::PermissionMissing));

        // fixes are ignored until permission returns
        f.fix(0.0, 0.0);
        f.step(1_000);
        assert!(f.session.track().is_empty());

        f.session
            .event_sender()
            .send(SessionEvent::PermissionChanged(true))
            .unwrap();
        f.step(1_000);
        assert!(f.session.advisories().is_empty());
    }

    #[test]
    fn test_provider_disabled_keeps_recording() {
        let mut f = fixture();
        f.session.start(true).unwrap();
        f.session
            .event_sender()
            .send(SessionEvent::ProviderDisabled(Provider::Network))
            .unwrap();
        f.fix(0.0, 0.0);
        assert!(f.step(1_000).unwrap().accepted);
        assert_eq!(
            f.session.advisories(),
            vec![Advisory::ProviderDisabled(Provider::Network)]
        );
    }

    #[test]
    fn test_gps_only_toggle() {
        let mut f = fixture();
        f.session.start(true).unwrap();
        let gps_only = Config {
            gps_only: true,
            ..Config::default()
        };
        let changes = f.session.on_config_changed(gps_only).unwrap();
        assert_eq!(changes, vec![ConfigChange::GpsOnly(true)]);
        assert!(!f.session.health().network.subscribed);

        f.session
            .event_sender()
            .send(SessionEvent::ConfigChanged(Config::default()))
            .unwrap();
        f.step(1_000);
        assert!(f.session.health().network.subscribed);
    }

    #[test]
    fn test_step_count_survives_restart() {
        struct Sensor;
        impl StepCounter for Sensor {
            fn start(&mut self) -> bool {
                true
            }
            fn stop(&mut self) {}
        }

        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        let clock = ManualClock::new(START);
        let mut session = RecordingSession::new(
            Config::default(),
            Arc::new(clock.clone()),
            Box::new(ManualLocationSource::default()),
            Some(Box::new(Sensor)),
            store,
        )
        .unwrap();
        session.start(true).unwrap();
        let events = session.event_sender();

        events.send(SessionEvent::StepCount(5_001.0)).unwrap();
        session.tick();
        assert_eq!(session.track().step_count, 1.0);
        events.send(SessionEvent::StepCount(5_050.0)).unwrap();
        session.tick();
        assert_eq!(session.track().step_count, 50.0);
    }
}
