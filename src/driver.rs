//! Async host for a `RecordingSession`: a fixed-interval tick, a command
//! queue and a shutdown signal on one task.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinHandle};
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::error::{Result, TrackbookError};
use crate::health::Advisory;
use crate::session::{RecordingSession, RecordingState, SessionEvent};
use crate::statistics;

/// Requests from the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Start { new_track: bool },
    Resume,
    Pause,
    Stop,
    Clear,
    ToggleStarred { latitude: f64, longitude: f64 },
}

/// Published after every tick and command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: RecordingState,
    pub waypoint_count: usize,
    pub length: f64,
    pub duration: i64,
    pub distance: String,
    pub velocity: String,
    pub advisories: Vec<Advisory>,
}

impl SessionStatus {
    pub fn from_session(session: &RecordingSession) -> Self {
        let track = session.track();
        let imperial = session.config().use_imperial;
        SessionStatus {
            state: session.state(),
            waypoint_count: track.waypoints.len(),
            length: track.length,
            duration: track.duration,
            distance: statistics::readable_distance(track.length, imperial),
            velocity: statistics::velocity_string(track, imperial),
            advisories: session.advisories(),
        }
    }
}

/// Handle to a session running on a tokio task
pub struct SessionDriver {
    commands: mpsc::Sender<SessionCommand>,
    shutdown: watch::Sender<bool>,
    status: watch::Receiver<SessionStatus>,
    events: crossbeam::channel::Sender<SessionEvent>,
    task: JoinHandle<RecordingSession>,
}

impl SessionDriver {
    /// Move the session onto a new task. Must be called within a
    /// multi-threaded tokio runtime; waiting for pending writes blocks in place.
    pub fn spawn(session: RecordingSession) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(SessionStatus::from_session(&session));
        let events = session.event_sender();
        let task = tokio::spawn(run_session(session, commands_rx, shutdown_rx, status_tx));
        SessionDriver {
            commands: commands_tx,
            shutdown: shutdown_tx,
            status: status_rx,
            events,
            task,
        }
    }

    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TrackbookError::InvalidState("session task has ended".to_string()))
    }

    /// Queue for provider callbacks
    pub fn events(&self) -> crossbeam::channel::Sender<SessionEvent> {
        self.events.clone()
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Stop ticking, pause an active recording and hand the session back
    pub async fn shutdown(self) -> Result<RecordingSession> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| TrackbookError::InvalidState(format!("session task failed: {}", e)))
    }
}

fn tick_interval(millis: u64) -> Interval {
    let mut ticker = interval(Duration::from_millis(millis.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Tick loop. Returns the session once shutdown is signalled or every
/// command sender is gone.
pub async fn run_session(
    mut session: RecordingSession,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut shutdown: watch::Receiver<bool>,
    status: watch::Sender<SessionStatus>,
) -> RecordingSession {
    let mut period = session.config().tick_interval_ms;
    let mut ticker = tick_interval(period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                session.tick();
                if session.config().tick_interval_ms != period {
                    period = session.config().tick_interval_ms;
                    ticker = tick_interval(period);
                    log::debug!("Tick interval now {} ms", period);
                }
            }
            command = commands.recv() => {
                match command {
                    Some(command) => apply(&mut session, command),
                    None => break,
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
        let _ = status.send(SessionStatus::from_session(&session));
    }

    // the loop is gone, so no tick can touch the track while it is saved
    if session.state() == RecordingState::Active {
        if let Err(e) = session.pause() {
            log::error!("Could not pause on shutdown: {}", e);
        }
    }
    if let Err(e) = task::block_in_place(|| session.flush()) {
        log::error!("Pending writes lost on shutdown: {}", e);
    }
    let _ = status.send(SessionStatus::from_session(&session));
    log::info!("Session driver stopped");
    session
}

fn apply(session: &mut RecordingSession, command: SessionCommand) {
    let result = match command.clone() {
        SessionCommand::Start { new_track } => session.start(new_track),
        // resuming waits for queued snapshot writes
        SessionCommand::Resume => task::block_in_place(|| session.resume()),
        SessionCommand::Pause => session.pause(),
        SessionCommand::Stop => session.stop().map(|_| ()),
        SessionCommand::Clear => {
            session.clear();
            Ok(())
        }
        SessionCommand::ToggleStarred {
            latitude,
            longitude,
        } => {
            session.toggle_starred(latitude, longitude);
            Ok(())
        }
    };
    if let Err(e) = result {
        log::warn!("{:?} ignored: {}", command, e);
    }
}
