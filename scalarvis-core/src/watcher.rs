//! Kernel-native directory watcher, debounced and routed to
//! create/write-close callbacks.
//!
//! Grounded on `FileWatcherLinuxImpl` (`inotify` with
//! `IN_CLOSE_WRITE | IN_MODIFY | IN_MOVED_TO | IN_CREATE`), reimplemented
//! on the cross-platform `notify` crate rather than inotify directly —
//! the source's per-platform `FileWatcherFactory` split collapses into
//! `notify`'s own backend selection.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long a burst of write events on one path is coalesced before the
/// write-close callback fires, so a streaming writer's many small
/// appends produce one parse wakeup instead of one per syscall.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

pub trait WatchSink: Send + Sync {
    fn on_file_created(&self, dir: &Path, file_name: &str);
    fn on_file_write_close(&self, dir: &Path, file_name: &str);
}

pub struct FileWatcher {
    notify_watcher: Mutex<Option<RecommendedWatcher>>,
    debounce_thread: Mutex<Option<JoinHandle<()>>>,
    stop: Arc<Mutex<bool>>,
    watched_dirs: Mutex<std::collections::HashSet<PathBuf>>,
}

impl FileWatcher {
    pub fn new() -> Self {
        Self {
            notify_watcher: Mutex::new(None),
            debounce_thread: Mutex::new(None),
            stop: Arc::new(Mutex::new(false)),
            watched_dirs: Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Start the underlying OS watch and the debounce thread. `sink`
    /// receives routed callbacks for the lifetime of this watcher.
    pub fn init(&self, sink: Arc<dyn WatchSink>) -> crate::Result<()> {
        let (tx, rx) = channel::<Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .map_err(|e| crate::error::EngineError::ConfigParse(e.to_string()))?;

        // Re-apply any paths registered before init() (tests call
        // add_watch_paths before init in some flows).
        for dir in self.watched_dirs.lock().unwrap().iter() {
            let _ = watcher.watch(dir, RecursiveMode::NonRecursive);
        }

        *self.notify_watcher.lock().unwrap() = Some(watcher);

        let stop = self.stop.clone();
        let handle = std::thread::spawn(move || debounce_loop(rx, sink, stop));
        *self.debounce_thread.lock().unwrap() = Some(handle);
        Ok(())
    }

    pub fn add_watch_paths(&self, dirs: &[PathBuf]) -> crate::Result<()> {
        let mut watched = self.watched_dirs.lock().unwrap();
        let mut guard = self.notify_watcher.lock().unwrap();
        for dir in dirs {
            if let Some(watcher) = guard.as_mut() {
                watcher
                    .watch(dir, RecursiveMode::NonRecursive)
                    .map_err(|e| crate::error::EngineError::ConfigParse(e.to_string()))?;
            }
            watched.insert(dir.clone());
        }
        Ok(())
    }

    pub fn del_watch_paths(&self, dirs: &[PathBuf]) -> crate::Result<()> {
        let mut watched = self.watched_dirs.lock().unwrap();
        let mut guard = self.notify_watcher.lock().unwrap();
        for dir in dirs {
            if let Some(watcher) = guard.as_mut() {
                let _ = watcher.unwatch(dir);
            }
            watched.remove(dir);
        }
        Ok(())
    }

    pub fn reset(&self) {
        *self.stop.lock().unwrap() = true;
        if let Some(handle) = self.debounce_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        *self.notify_watcher.lock().unwrap() = None;
        self.watched_dirs.lock().unwrap().clear();
        *self.stop.lock().unwrap() = false;
    }
}

impl Default for FileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        *self.stop.lock().unwrap() = true;
    }
}

fn debounce_loop(rx: std::sync::mpsc::Receiver<Event>, sink: Arc<dyn WatchSink>, stop: Arc<Mutex<bool>>) {
    let mut pending_write: HashMap<PathBuf, Instant> = HashMap::new();
    loop {
        if *stop.lock().unwrap() {
            return;
        }
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => route_event(&event, &sink, &mut pending_write),
            Err(RecvTimeoutError::Timeout) => {
                flush_due(&mut pending_write, &sink);
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn route_event(event: &Event, sink: &Arc<dyn WatchSink>, pending_write: &mut HashMap<PathBuf, Instant>) {
    for path in &event.paths {
        match event.kind {
            EventKind::Create(_) => {
                if let Some((dir, name)) = split_path(path) {
                    sink.on_file_created(&dir, &name);
                }
                pending_write.insert(path.clone(), Instant::now());
            }
            EventKind::Modify(_) => {
                pending_write.insert(path.clone(), Instant::now());
            }
            _ => {}
        }
    }
}

fn flush_due(pending_write: &mut HashMap<PathBuf, Instant>, sink: &Arc<dyn WatchSink>) {
    let now = Instant::now();
    let due: Vec<PathBuf> = pending_write
        .iter()
        .filter(|(_, &seen)| now.duration_since(seen) >= DEBOUNCE_WINDOW)
        .map(|(path, _)| path.clone())
        .collect();
    for path in due {
        pending_write.remove(&path);
        if let Some((dir, name)) = split_path(&path) {
            sink.on_file_write_close(&dir, &name);
        }
    }
}

fn split_path(path: &Path) -> Option<(PathBuf, String)> {
    let dir = path.parent()?.to_path_buf();
    let name = path.file_name()?.to_string_lossy().into_owned();
    Some((dir, name))
}
