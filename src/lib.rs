// Trackbook recording core
// Filters location fixes into tracks, keeps statistics and persists recordings

pub mod accumulator;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod export;
pub mod filter;
pub mod health;
pub mod location;
pub mod session;
pub mod smoothing;
pub mod statistics;
pub mod storage;
pub mod track;

pub use accumulator::{TrackAccumulator, UpdateOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigChange};
pub use driver::{SessionCommand, SessionDriver, SessionStatus};
pub use error::{Result, TrackbookError};
pub use filter::{LocationQualityFilter, Rejection};
pub use health::{Advisory, ProviderHealth};
pub use location::{LocationFix, Provider};
pub use session::{
    LocationSource, ManualLocationSource, RecordingSession, RecordingState, SessionEvent,
    StepCounter,
};
pub use smoothing::AltitudeSmoother;
pub use storage::{JsonFileStore, PersistedState, Persister, TrackStore};
pub use track::{Track, TrackList, TrackListElement, Waypoint};
