use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use trackbook_core::statistics::{readable_distance, readable_duration, velocity_string};
use trackbook_core::{
    Clock, Config, JsonFileStore, LocationFix, ManualClock, ManualLocationSource,
    RecordingSession, SessionEvent,
};

/// Replay a recorded list of location fixes through a recording session
#[derive(Parser, Debug)]
struct Args {
    /// JSON array of fixes
    #[arg(long)]
    fixes: PathBuf,

    /// Directory for the saved track, GPX file and track list
    #[arg(long)]
    out: PathBuf,

    /// Settings JSON (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the tick interval (ms)
    #[arg(long)]
    tick_ms: Option<u64>,
}

fn load_fixes(path: &Path) -> anyhow::Result<Vec<LocationFix>> {
    let reader = BufReader::new(File::open(path)?);
    let mut fixes: Vec<LocationFix> = serde_json::from_reader(reader)?;
    fixes.sort_by_key(|fix| fix.time);
    Ok(fixes)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match args.config.as_ref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval_ms = tick_ms;
        config.validate()?;
    }
    let tick = i64::try_from(config.tick_interval_ms)?;

    let fixes = load_fixes(&args.fixes)?;
    let first_time = match fixes.first() {
        Some(fix) => fix.time,
        None => anyhow::bail!("{} contains no fixes", args.fixes.display()),
    };
    log::info!("Replaying {} fixes from {}", fixes.len(), args.fixes.display());

    let clock = ManualClock::new(first_time);
    let store = Arc::new(JsonFileStore::new(&args.out)?);
    let mut session = RecordingSession::new(
        config,
        Arc::new(clock.clone()),
        Box::new(ManualLocationSource::default()),
        None,
        store.clone(),
    )?;
    let events = session.event_sender();
    session.start(true)?;

    let mut accepted = 0usize;
    let mut rejections: HashMap<String, usize> = HashMap::new();
    let mut pending = fixes.into_iter().peekable();
    loop {
        // fixes are delivered as if captured the moment they arrive
        while let Some(fix) = pending.next_if(|fix| fix.time <= clock.now_millis()) {
            let mut fix = fix;
            fix.elapsed_realtime_nanos = clock.elapsed_realtime_nanos();
            if events.try_send(SessionEvent::Fix(fix)).is_err() {
                log::warn!("Event queue full, fix dropped");
            }
        }
        clock.advance(tick);
        if let Some(outcome) = session.tick() {
            if outcome.accepted {
                accepted += 1;
            } else if let Some(rejection) = outcome.rejection {
                *rejections.entry(format!("{:?}", rejection)).or_default() += 1;
            }
        }
        if pending.peek().is_none() {
            break;
        }
    }

    log::info!("{}", session.health().format_status(clock.elapsed_realtime_nanos()));
    let track = match session.stop()? {
        Some(track) => track,
        None => anyhow::bail!("No fix was accepted, nothing saved"),
    };
    session.flush()?;

    let imperial = session.config().use_imperial;
    println!("Track:      {}", track.name);
    println!("Waypoints:  {} ({} ticks accepted)", track.waypoints.len(), accepted);
    println!("Distance:   {}", readable_distance(track.length, imperial));
    println!("Duration:   {}", readable_duration(track.duration, false));
    println!("Velocity:   {}", velocity_string(&track, imperial));
    println!(
        "Elevation:  +{} / -{}",
        readable_distance(track.positive_elevation, imperial),
        readable_distance(track.negative_elevation, imperial)
    );
    let mut reasons: Vec<_> = rejections.into_iter().collect();
    reasons.sort();
    for (reason, count) in reasons {
        println!("Rejected:   {} x {}", count, reason);
    }
    println!("Saved:      {}", store.track_file(track.id()).display());
    println!("GPX:        {}", store.gpx_file(track.id()).display());
    Ok(())
}
