//! Bounded worker pool that runs parse tasks and tracks per-project
//! progress, polled every `progress_poll_interval`.
//!
//! Grounded on `ScalarVisuallyServer::AddParseTask`/`parseWatcher`: one
//! submitted task per file, progress measured as
//! `sum(file offsets) / sum(file sizes) * 100`, a project is "finished"
//! once every one of its files' tasks has completed.

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::file::{FileStore, ParseDataType};
use crate::index::TagIndex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

struct ProjectState {
    data_size: u64,
    offsets: Vec<(String, Arc<AtomicU64>)>,
    remaining: AtomicUsize,
    finished: AtomicBool,
    percent: AtomicU32,
}

pub struct ParseScheduler {
    pool: rayon::ThreadPool,
    projects: RwLock<HashMap<String, Arc<ProjectState>>>,
    poll_interval: Duration,
    next_project_id: AtomicU64,
}

impl ParseScheduler {
    pub fn new(config: &Config) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.resolved_worker_count())
            .build()
            .map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        Ok(Self {
            pool,
            projects: RwLock::new(HashMap::new()),
            poll_interval: config.progress_poll_interval(),
            next_project_id: AtomicU64::new(1),
        })
    }

    pub fn new_project_id(&self) -> String {
        format!("import-{}", self.next_project_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register `project` and submit one parse task per `(path, data_type,
    /// file_size)` entry. Files are assumed already registered in `store`
    /// (via `FileStore::add_file`) and marked imported by the caller.
    pub fn add_parse_task(
        &self,
        project: String,
        files: Vec<(String, ParseDataType, u64)>,
        store: Arc<FileStore>,
        index: Arc<TagIndex>,
        ingest: Arc<crate::config::IngestConfig>,
    ) {
        let data_size = files.iter().map(|(_, _, size)| *size).sum();
        let offsets: Vec<(String, Arc<AtomicU64>)> = files
            .iter()
            .map(|(path, _, _)| (path.clone(), Arc::new(AtomicU64::new(0))))
            .collect();
        let state = Arc::new(ProjectState {
            data_size: data_size.max(1),
            offsets: offsets.clone(),
            remaining: AtomicUsize::new(files.len()),
            finished: AtomicBool::new(files.is_empty()),
            percent: AtomicU32::new(if files.is_empty() { 100 } else { 0 }),
        });
        self.projects.write().unwrap().insert(project, state.clone());

        for (path, data_type, _) in files {
            let store = store.clone();
            let index = index.clone();
            let ingest = ingest.clone();
            let state = state.clone();
            let offset_cell = offsets
                .iter()
                .find(|(p, _)| p == &path)
                .map(|(_, cell)| cell.clone())
                .unwrap();
            self.pool.spawn(move || {
                let path_buf = std::path::PathBuf::from(&path);
                if let Some(normal) = store.get_normal(&path) {
                    let offset = normal.offset();
                    if let Ok(progress) =
                        crate::parse::parse_file(&path_buf, data_type, offset, &store, &index, &ingest)
                    {
                        normal.set_offset(progress.new_offset);
                        offset_cell.store(progress.new_offset, Ordering::SeqCst);
                    }
                }
                if state.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    state.finished.store(true, Ordering::SeqCst);
                    state.percent.store(100, Ordering::SeqCst);
                }
            });
        }
    }

    /// Recompute `percent` for every unfinished project from current file
    /// offsets. Intended to run on a `progress_poll_interval`-period
    /// background tick; exposed directly so callers control the loop
    /// (a dedicated thread in the binary, a tokio interval in the
    /// service).
    pub fn tick(&self) {
        let projects = self.projects.read().unwrap();
        for state in projects.values() {
            if state.finished.load(Ordering::SeqCst) {
                continue;
            }
            let parsed: u64 = state.offsets.iter().map(|(_, cell)| cell.load(Ordering::SeqCst)).sum();
            let percent = ((parsed as f64 / state.data_size as f64) * 100.0).min(100.0) as u32;
            state.percent.store(percent, Ordering::SeqCst);
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// `(finished, percent)`, consuming (removing) the project entry once
    /// finished — matching `GetProjectParseStatus`'s erase-on-finish.
    pub fn project_status(&self, project: &str) -> Option<(bool, u32)> {
        let result = {
            let projects = self.projects.read().unwrap();
            let state = projects.get(project)?;
            if state.finished.load(Ordering::SeqCst) {
                (true, 100)
            } else {
                (false, state.percent.load(Ordering::SeqCst))
            }
        };
        if result.0 {
            self.projects.write().unwrap().remove(project);
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::file::ParseDataType;
    use std::io::Write;

    #[test]
    fn empty_project_reports_finished_immediately() {
        let config = Config::default();
        let scheduler = ParseScheduler::new(&config).unwrap();
        let store = Arc::new(FileStore::new());
        let index = Arc::new(TagIndex::new());
        let ingest = Arc::new(crate::config::IngestConfig::default());
        scheduler.add_parse_task("p1".to_string(), vec![], store, index, ingest);
        assert_eq!(scheduler.project_status("p1"), Some((true, 100)));
        assert_eq!(scheduler.project_status("p1"), None, "status is removed once drained");
    }

    #[test]
    fn parses_a_file_and_reports_completion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker_0.log");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "2024-01-01 00:00:00,000 step: [0/1] loss: 1.0").unwrap();
        }
        let size = std::fs::metadata(&path).unwrap().len();
        let path_str = path.to_string_lossy().to_string();

        let config = Config::default();
        let scheduler = ParseScheduler::new(&config).unwrap();
        let store = Arc::new(FileStore::new());
        store.add_file(path_str.clone(), ParseDataType::TextLog);
        store.get_normal(&path_str).unwrap().set_imported(true);
        let index = Arc::new(TagIndex::new());
        let ingest = Arc::new(crate::config::IngestConfig::default());

        scheduler.add_parse_task(
            "p2".to_string(),
            vec![(path_str.clone(), ParseDataType::TextLog, size)],
            store.clone(),
            index.clone(),
            ingest,
        );

        let mut status = scheduler.project_status("p2");
        for _ in 0..50 {
            if status.map(|(f, _)| f).unwrap_or(false) {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
            status = scheduler.project_status("p2");
        }
        assert_eq!(status, Some((true, 100)));
        assert!(index.contains("Loss", &path_str));
    }
}
