//! Durable storage for tracks, the track list and session state.
//!
//! `TrackStore` is the blocking interface. `Persister` puts a store behind a
//! worker thread so the recording tick never waits on disk I/O.

use crossbeam::channel::{self, Sender};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::{Result, TrackbookError};
use crate::export;
use crate::location::LocationFix;
use crate::session::RecordingState;
use crate::statistics;
use crate::track::{Track, TrackList, CURRENT_TRACKLIST_FORMAT_VERSION, CURRENT_TRACK_FORMAT_VERSION};

/// Current on-disk version of the session state document
pub const CURRENT_STATE_FORMAT_VERSION: u32 = 1;

const SNAPSHOT_FILE: &str = "temp.json";
const STATE_FILE: &str = "state.json";
const TRACKLIST_FILE: &str = "tracklist.json";
const TRACKS_DIR: &str = "tracks";
const GPX_DIR: &str = "gpx";

/// What a restarted process needs to pick up where it left off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub state_format_version: u32,
    pub recording_state: RecordingState,
    pub current_best_location: Option<LocationFix>,
}

impl PersistedState {
    pub fn new(recording_state: RecordingState, current_best_location: Option<LocationFix>) -> Self {
        PersistedState {
            state_format_version: CURRENT_STATE_FORMAT_VERSION,
            recording_state,
            current_best_location,
        }
    }
}

/// Blocking persistence operations
pub trait TrackStore: Send + Sync {
    /// Overwrite the in-progress snapshot
    fn save_snapshot(&self, track: &Track) -> Result<()>;
    fn load_snapshot(&self) -> Result<Option<Track>>;
    /// Removing a missing snapshot is not an error
    fn delete_snapshot(&self) -> Result<()>;

    /// Archive a finished track (JSON and GPX) and add it to the track list.
    /// Returns the track with its file paths filled in.
    fn save_final(&self, track: &Track) -> Result<Track>;

    fn load_tracklist(&self) -> Result<TrackList>;
    fn save_tracklist(&self, tracklist: &TrackList) -> Result<()>;
    fn load_track(&self, track_id: i64) -> Result<Track>;
    fn rename_track(&self, track_id: i64, name: &str) -> Result<()>;
    fn delete_track(&self, track_id: i64) -> Result<()>;
    /// Delete every track not starred in the list; returns how many went
    fn delete_non_starred(&self) -> Result<usize>;

    fn save_state(&self, state: &PersistedState) -> Result<()>;
    fn load_state(&self) -> Result<Option<PersistedState>>;
}

/// JSON files under one base directory:
///
/// ```text
/// <base>/temp.json                       in-progress snapshot
/// <base>/state.json                      recording state + best location
/// <base>/tracklist.json
/// <base>/tracks/<yyyy-MM-dd-HH-mm-ss>.json
/// <base>/gpx/<yyyy-MM-dd-HH-mm-ss>.gpx
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(base_dir.join(TRACKS_DIR))?;
        fs::create_dir_all(base_dir.join(GPX_DIR))?;
        Ok(JsonFileStore { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.base_dir.join(SNAPSHOT_FILE)
    }

    fn state_path(&self) -> PathBuf {
        self.base_dir.join(STATE_FILE)
    }

    fn tracklist_path(&self) -> PathBuf {
        self.base_dir.join(TRACKLIST_FILE)
    }

    pub fn track_file(&self, track_id: i64) -> PathBuf {
        self.base_dir
            .join(TRACKS_DIR)
            .join(format!("{}.json", statistics::sortable_date(track_id)))
    }

    pub fn gpx_file(&self, track_id: i64) -> PathBuf {
        self.base_dir
            .join(GPX_DIR)
            .join(format!("{}.gpx", statistics::sortable_date(track_id)))
    }

    fn write_track_files(&self, track: &Track) -> Result<()> {
        write_json(Path::new(&track.track_path), track)?;
        write_atomic(Path::new(&track.gpx_path), export::to_gpx(track).as_bytes())
    }

    fn resolve_track_path(&self, tracklist: &TrackList, track_id: i64) -> PathBuf {
        match tracklist.get(track_id) {
            Some(element) if !element.track_path.is_empty() => PathBuf::from(&element.track_path),
            _ => self.track_file(track_id),
        }
    }
}

impl TrackStore for JsonFileStore {
    fn save_snapshot(&self, track: &Track) -> Result<()> {
        write_json(&self.snapshot_path(), track)?;
        log::debug!(
            "Snapshot saved: {} waypoints, {:.1} m",
            track.waypoints.len(),
            track.length
        );
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<Track>> {
        let track: Option<Track> = read_json(&self.snapshot_path())?;
        if let Some(track) = &track {
            check_version(track.track_format_version, CURRENT_TRACK_FORMAT_VERSION)?;
        }
        Ok(track)
    }

    fn delete_snapshot(&self) -> Result<()> {
        remove_if_exists(&self.snapshot_path())
    }

    fn save_final(&self, track: &Track) -> Result<Track> {
        let mut finished = track.clone();
        finished.track_path = self.track_file(track.id()).to_string_lossy().into_owned();
        finished.gpx_path = self.gpx_file(track.id()).to_string_lossy().into_owned();
        self.write_track_files(&finished)?;

        let mut tracklist = self.load_tracklist()?;
        tracklist.add(finished.to_tracklist_element());
        tracklist.modification_date = finished.recording_stop;
        self.save_tracklist(&tracklist)?;

        log::info!(
            "Saved track \"{}\" ({}) to {}",
            finished.name,
            statistics::readable_distance(finished.length, false),
            finished.track_path
        );
        Ok(finished)
    }

    fn load_tracklist(&self) -> Result<TrackList> {
        match read_json::<TrackList>(&self.tracklist_path())? {
            Some(tracklist) => {
                check_version(
                    tracklist.tracklist_format_version,
                    CURRENT_TRACKLIST_FORMAT_VERSION,
                )?;
                Ok(tracklist)
            }
            None => Ok(TrackList::default()),
        }
    }

    fn save_tracklist(&self, tracklist: &TrackList) -> Result<()> {
        write_json(&self.tracklist_path(), tracklist)
    }

    fn load_track(&self, track_id: i64) -> Result<Track> {
        let tracklist = self.load_tracklist()?;
        let path = self.resolve_track_path(&tracklist, track_id);
        let track: Track = read_json(&path)?.ok_or(TrackbookError::TrackNotFound(track_id))?;
        check_version(track.track_format_version, CURRENT_TRACK_FORMAT_VERSION)?;
        Ok(track)
    }

    fn rename_track(&self, track_id: i64, name: &str) -> Result<()> {
        let mut tracklist = self.load_tracklist()?;
        let element = tracklist
            .get_mut(track_id)
            .ok_or(TrackbookError::TrackNotFound(track_id))?;
        element.name = name.to_string();

        let mut track = self.load_track(track_id)?;
        track.name = name.to_string();
        if track.track_path.is_empty() {
            track.track_path = self.track_file(track_id).to_string_lossy().into_owned();
        }
        if track.gpx_path.is_empty() {
            track.gpx_path = self.gpx_file(track_id).to_string_lossy().into_owned();
        }
        self.write_track_files(&track)?;
        self.save_tracklist(&tracklist)
    }

    fn delete_track(&self, track_id: i64) -> Result<()> {
        let mut tracklist = self.load_tracklist()?;
        let element = tracklist
            .remove(track_id)
            .ok_or(TrackbookError::TrackNotFound(track_id))?;
        for path in [&element.track_path, &element.gpx_path] {
            if !path.is_empty() {
                remove_if_exists(Path::new(path))?;
            }
        }
        self.save_tracklist(&tracklist)?;
        log::info!("Deleted track \"{}\"", element.name);
        Ok(())
    }

    fn delete_non_starred(&self) -> Result<usize> {
        let ids = self.load_tracklist()?.non_starred_ids();
        for id in &ids {
            self.delete_track(*id)?;
        }
        Ok(ids.len())
    }

    fn save_state(&self, state: &PersistedState) -> Result<()> {
        write_json(&self.state_path(), state)
    }

    fn load_state(&self) -> Result<Option<PersistedState>> {
        let state: Option<PersistedState> = read_json(&self.state_path())?;
        if let Some(state) = &state {
            check_version(state.state_format_version, CURRENT_STATE_FORMAT_VERSION)?;
        }
        Ok(state)
    }
}

fn check_version(found: u32, expected: u32) -> Result<()> {
    if found > expected {
        return Err(TrackbookError::UnsupportedFormat { found, expected });
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

/// Write to a `.tmp` sibling, then rename over the target
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

enum Job {
    Snapshot { generation: u64, track: Box<Track> },
    /// Archive the track, then drop the snapshot if archiving worked
    Finalize { track: Box<Track> },
    DeleteSnapshot,
    State(PersistedState),
    Flush(Sender<()>),
}

/// Runs a `TrackStore` on a background thread. Requests are fire-and-forget;
/// failures are logged and not retried.
pub struct Persister {
    store: Arc<dyn TrackStore>,
    sender: Option<Sender<Job>>,
    generation: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl Persister {
    pub fn new(store: Arc<dyn TrackStore>) -> Result<Self> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let generation = Arc::new(AtomicU64::new(0));

        let worker_store = Arc::clone(&store);
        let worker_generation = Arc::clone(&generation);
        let worker = std::thread::Builder::new()
            .name("trackbook-persist".to_string())
            .spawn(move || {
                for job in receiver.iter() {
                    let current = worker_generation.load(Ordering::SeqCst);
                    process_job(worker_store.as_ref(), job, current);
                }
                log::debug!("Persistence worker stopped");
            })?;

        Ok(Persister {
            store,
            sender: Some(sender),
            generation,
            worker: Some(worker),
        })
    }

    /// Direct access for blocking reads (snapshot reload, state recovery)
    pub fn store(&self) -> &Arc<dyn TrackStore> {
        &self.store
    }

    pub fn save_snapshot(&self, track: &Track) {
        let generation = self.generation.load(Ordering::SeqCst);
        self.send(Job::Snapshot {
            generation,
            track: Box::new(track.clone()),
        });
    }

    pub fn finalize(&self, track: &Track) {
        self.send(Job::Finalize {
            track: Box::new(track.clone()),
        });
    }

    pub fn delete_snapshot(&self) {
        self.send(Job::DeleteSnapshot);
    }

    pub fn save_state(&self, state: PersistedState) {
        self.send(Job::State(state));
    }

    /// Drop every snapshot write queued so far
    pub fn cancel_pending(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Block until everything queued before this call has been handled
    pub fn flush(&self) -> Result<()> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| TrackbookError::Storage("persistence worker stopped".to_string()))?;
        sender
            .send(Job::Flush(reply_tx))
            .map_err(|_| TrackbookError::Storage("persistence worker stopped".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| TrackbookError::Storage("persistence worker stopped".to_string()))
    }

    fn send(&self, job: Job) {
        let delivered = match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        };
        if !delivered {
            log::error!("Persistence worker is gone, write dropped");
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        // closing the channel ends the worker loop after the queue drains
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Persistence worker panicked");
            }
        }
    }
}

fn process_job(store: &dyn TrackStore, job: Job, current_generation: u64) {
    match job {
        Job::Snapshot { generation, track } => {
            if generation != current_generation {
                log::debug!("Skipping cancelled snapshot write");
                return;
            }
            if let Err(e) = store.save_snapshot(&track) {
                log::error!("Snapshot write failed: {}", e);
            }
        }
        Job::Finalize { track } => match store.save_final(&track) {
            Ok(_) => {
                if let Err(e) = store.delete_snapshot() {
                    log::error!("Could not remove snapshot: {}", e);
                }
            }
            Err(e) => log::error!("Saving track failed, snapshot kept: {}", e),
        },
        Job::DeleteSnapshot => {
            if let Err(e) = store.delete_snapshot() {
                log::error!("Could not remove snapshot: {}", e);
            }
        }
        Job::State(state) => {
            if let Err(e) = store.save_state(&state) {
                log::error!("State write failed: {}", e);
            }
        }
        Job::Flush(reply) => {
            let _ = reply.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Provider;
    use crate::track::Waypoint;
    use tempfile::TempDir;

    fn store() -> (TempDir, JsonFileStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn track_with_points(start: i64, points: usize) -> Track {
        let mut track = Track::new(start);
        for i in 0..points {
            let fix = LocationFix::new(
                Provider::Gps,
                48.137_154_3 + i as f64 * 1e-4,
                11.575_382_1 - i as f64 * 1e-4,
                519.3 + 0.1 * i as f64,
                3.9,
                start + 1_000 * i as i64 + 7,
                0,
            )
            .with_satellites(9);
            track.length += 11.132_4;
            track.waypoints.push(Waypoint::from_fix(&fix, track.length));
        }
        track.recording_stop = start + 1_000 * points as i64;
        track.duration = track.recording_stop - start;
        track.positive_elevation = 0.1 + 0.2;
        track.max_altitude = 519.3 + 0.1 * (points as f64 - 1.0);
        track.min_altitude = 519.3;
        track
    }

    #[test]
    fn test_snapshot_round_trip_is_exact() {
        let (_dir, store) = store();
        assert!(store.load_snapshot().unwrap().is_none());

        let mut track = track_with_points(1_700_000_000_123, 3);
        track.waypoints[1].starred = true;
        track.waypoints[0].is_stop_over = true;
        track.step_count = 1234.0;
        store.save_snapshot(&track).unwrap();

        let loaded = store.load_snapshot().unwrap().unwrap();
        assert_eq!(loaded, track);
        assert_eq!(loaded.positive_elevation.to_bits(), track.positive_elevation.to_bits());

        store.delete_snapshot().unwrap();
        store.delete_snapshot().unwrap();
        assert!(store.load_snapshot().unwrap().is_none());
    }

    #[test]
    fn test_newer_format_is_rejected() {
        let (_dir, store) = store();
        let mut track = track_with_points(0, 1);
        track.track_format_version = CURRENT_TRACK_FORMAT_VERSION + 1;
        store.save_snapshot(&track).unwrap();
        assert!(matches!(
            store.load_snapshot(),
            Err(TrackbookError::UnsupportedFormat { found: 5, expected: 4 })
        ));
    }

    #[test]
    fn test_save_final_writes_files_and_list() {
        let (_dir, store) = store();
        let track = track_with_points(1_709_571_909_000, 4);
        let saved = store.save_final(&track).unwrap();

        assert!(saved.track_path.ends_with("2024-03-04-17-05-09.json"));
        assert!(Path::new(&saved.gpx_path).exists());
        let gpx = fs::read_to_string(&saved.gpx_path).unwrap();
        assert_eq!(gpx.matches("<trkpt ").count(), 4);

        let tracklist = store.load_tracklist().unwrap();
        assert_eq!(tracklist.len(), 1);
        assert_eq!(tracklist.modification_date, track.recording_stop);
        assert_eq!(store.load_track(track.id()).unwrap(), saved);
    }

    #[test]
    fn test_rename_and_delete() {
        let (_dir, store) = store();
        let first = store.save_final(&track_with_points(1_000_000, 2)).unwrap();
        let second = store.save_final(&track_with_points(2_000_000, 2)).unwrap();

        store.rename_track(first.id(), "Evening run").unwrap();
        assert_eq!(store.load_track(first.id()).unwrap().name, "Evening run");
        assert_eq!(
            store.load_tracklist().unwrap().get(first.id()).map(|e| e.name.clone()),
            Some("Evening run".to_string())
        );

        store.delete_track(second.id()).unwrap();
        assert!(!Path::new(&second.track_path).exists());
        assert!(!Path::new(&second.gpx_path).exists());
        assert!(matches!(
            store.load_track(second.id()),
            Err(TrackbookError::TrackNotFound(_))
        ));
        assert!(matches!(
            store.delete_track(second.id()),
            Err(TrackbookError::TrackNotFound(_))
        ));
    }

    #[test]
    fn test_delete_non_starred() {
        let (_dir, store) = store();
        for start in [1_000_000, 2_000_000, 3_000_000] {
            store.save_final(&track_with_points(start, 1)).unwrap();
        }
        let mut tracklist = store.load_tracklist().unwrap();
        tracklist.get_mut(2_000_000).unwrap().starred = true;
        store.save_tracklist(&tracklist).unwrap();

        assert_eq!(store.delete_non_starred().unwrap(), 2);
        let remaining = store.load_tracklist().unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.get(2_000_000).is_some());
    }

    #[test]
    fn test_state_round_trip() {
        let (_dir, store) = store();
        assert!(store.load_state().unwrap().is_none());
        let fix = LocationFix::new(Provider::Network, 1.0, 2.0, 0.0, 25.0, 99, 5);
        let state = PersistedState::new(RecordingState::Active, Some(fix));
        store.save_state(&state).unwrap();
        assert_eq!(store.load_state().unwrap(), Some(state));
    }

    #[test]
    fn test_cancelled_snapshot_is_skipped() {
        let (_dir, store) = store();
        let track = track_with_points(0, 2);
        process_job(
            &store,
            Job::Snapshot {
                generation: 0,
                track: Box::new(track.clone()),
            },
            1,
        );
        assert!(store.load_snapshot().unwrap().is_none());

        process_job(
            &store,
            Job::Snapshot {
                generation: 1,
                track: Box::new(track),
            },
            1,
        );
        assert!(store.load_snapshot().unwrap().is_some());
    }

    #[test]
    fn test_persister_flush_orders_writes() {
        let (dir, store) = store();
        let persister = Persister::new(Arc::new(store)).unwrap();
        let track = track_with_points(5_000_000, 3);

        persister.save_snapshot(&track);
        persister.flush().unwrap();
        assert_eq!(persister.store().load_snapshot().unwrap(), Some(track.clone()));

        persister.finalize(&track);
        persister.flush().unwrap();
        assert!(persister.store().load_snapshot().unwrap().is_none());
        assert!(dir.path().join("tracklist.json").exists());
    }
}
