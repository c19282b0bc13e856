//! Watcher: turns the executor into a daemon over
//! `.ai/tasks/pending/`, debouncing filesystem events before handing each
//! settled task file to a caller-supplied runner.
//!
//! Grounded on the debounced-notify pattern the `vtcode` example repo uses
//! for its own config watcher (`config_watcher.rs`): a `notify::Watcher`
//! feeds a channel of raw events, and a last-seen-timestamp map decides when
//! a path has gone quiet long enough to act on. The queueing/debounce
//! bookkeeping here ([`PendingQueue`]) is kept separate from the
//! notify/tokio plumbing in [`run`] so it can be tested without a real
//! filesystem watch.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default debounce window before a settled file is enqueued.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Tracks recently-touched task files and which ones are mid-run, so a burst
/// of writes to the same file only enqueues it once it goes quiet, and a
/// file already being worked on is never enqueued a second time.
#[derive(Debug, Default)]
pub struct PendingQueue {
    last_seen: HashMap<PathBuf, Instant>,
    in_flight: HashSet<PathBuf>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` changed (or was discovered) just now.
    pub fn touch(&mut self, path: PathBuf) {
        self.last_seen.insert(path, Instant::now());
    }

    /// Mark `path` as currently being processed, excluding it from future
    /// `ready` results until [`PendingQueue::finish`] is called.
    pub fn start(&mut self, path: PathBuf) {
        self.in_flight.insert(path);
    }

    pub fn finish(&mut self, path: &Path) {
        self.in_flight.remove(path);
    }

    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.in_flight.contains(path)
    }

    /// Paths that have been quiet for at least `debounce` and are not
    /// already in flight. Returned paths are removed from `last_seen` so a
    /// second call without an intervening `touch` returns nothing for them.
    pub fn ready(&mut self, debounce: Duration) -> Vec<PathBuf> {
        let now = Instant::now();
        let settled: Vec<PathBuf> = self
            .last_seen
            .iter()
            .filter(|(path, seen)| now.duration_since(**seen) >= debounce && !self.in_flight.contains(*path))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &settled {
            self.last_seen.remove(path);
        }
        settled
    }
}

/// Lists markdown task files already sitting in `pending_dir`, recursively
///. Used both for the
/// initial scan on startup and to seed the queue after a burst of events.
pub fn scan_pending(pending_dir: &Path) -> Vec<PathBuf> {
    if !pending_dir.exists() {
        return Vec::new();
    }
    walkdir::WalkDir::new(pending_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "md"))
        .map(|entry| entry.path().to_path_buf())
        .collect()
}

fn event_touches_markdown(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .iter()
            .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

/// Options for a watch run.
pub struct WatchOptions {
    pub pending_dir: PathBuf,
    pub debounce: Duration,
    /// How often the debounce queue is polled for settled paths.
    pub poll_interval: Duration,
}

impl WatchOptions {
    pub fn new(pending_dir: PathBuf) -> Self {
        Self { pending_dir, debounce: DEFAULT_DEBOUNCE, poll_interval: Duration::from_millis(100) }
    }
}

/// Watches `options.pending_dir` and calls `on_task` once per settled task
/// file, one at a time, until interrupted.
///
/// On SIGINT (and SIGTERM on unix), the watcher stops accepting new files
/// immediately but awaits the in-flight `on_task` call before returning
///.
pub async fn run<F, Fut>(options: WatchOptions, on_task: F) -> anyhow::Result<()>
where
    F: Fn(PathBuf) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    std::fs::create_dir_all(&options.pending_dir)?;

    let (tx, mut raw_events) = mpsc::unbounded_channel::<Event>();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher.watch(&options.pending_dir, RecursiveMode::Recursive)?;

    let mut queue = PendingQueue::new();
    for path in scan_pending(&options.pending_dir) {
        queue.touch(path);
    }

    let mut shutdown_requested = false;
    let mut poll = tokio::time::interval(options.poll_interval);

    info!(dir = %options.pending_dir.display(), "watching for pending tasks");

    loop {
        if shutdown_requested {
            break;
        }

        tokio::select! {
            biased;

            _ = shutdown_signal() => {
                info!("shutdown requested, finishing in-flight task before exit");
                shutdown_requested = true;
            }

            Some(event) = raw_events.recv() => {
                for path in event_touches_markdown(&event) {
                    debug!(path = %path.display(), "task file event");
                    queue.touch(path);
                }
            }

            _ = poll.tick() => {
                for path in queue.ready(options.debounce) {
                    if queue.is_in_flight(&path) {
                        continue;
                    }
                    queue.start(path.clone());
                    on_task(path.clone()).await;
                    queue.finish(&path);
                }
            }
        }
    }

    // Drain whatever settled right as shutdown began, but only the one
    // in-flight task — no new work is picked up once shutdown started.
    for path in queue.ready(Duration::from_secs(0)) {
        if queue.is_in_flight(&path) {
            continue;
        }
        warn!(path = %path.display(), "dropping newly-settled task at shutdown, will be picked up on restart");
    }

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
