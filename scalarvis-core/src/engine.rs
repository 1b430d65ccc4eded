//! The engine: composes the file store, tag index, parse scheduler, and
//! directory watcher into the eight external commands a client adapter
//! exposes (import, query, merge, token config, parse status, graph
//! listing, incremental tags, created-file discovery).
//!
//! Grounded on `ScalarVisuallyServer` — its constructor wiring the
//! watcher/thread pool together, and its public method surface mapping
//! near one-to-one onto the methods below.

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::file::{File, FileStore, ParseDataType};
use crate::index::TagIndex;
use crate::point::ScalarPoint;
use crate::query::{self, LineType};
use crate::scheduler::ParseScheduler;
use crate::smoother::SmoothingParam;
use crate::watcher::{FileWatcher, WatchSink};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct GraphDataRequest {
    pub tag: String,
    pub file: String,
    pub left: i64,
    pub right: i64,
    pub token: bool,
    pub smoothing: Option<SmoothingParam>,
    pub sample: bool,
}

pub struct GraphDataResponse {
    pub tag: String,
    pub file: String,
    pub lines: Vec<(LineType, Vec<ScalarPoint>)>,
    pub date_index: Vec<(i64, f32, String)>,
}

pub struct MergeResult {
    pub action: &'static str,
    pub name: String,
    pub tags: Vec<String>,
    pub file: String,
    pub sub_files: Vec<String>,
}

pub struct Engine {
    config: Config,
    store: Arc<FileStore>,
    index: Arc<TagIndex>,
    scheduler: Arc<ParseScheduler>,
    watcher: Arc<FileWatcher>,
    imported_paths: Mutex<HashSet<PathBuf>>,
    created_files: Mutex<HashMap<String, HashSet<String>>>,
}

impl Engine {
    /// Build the engine and start its background watcher thread. Returned
    /// wrapped in `Arc` since the watcher holds a `Weak`-free `Arc<dyn
    /// WatchSink>` back-reference to it.
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let engine = Arc::new(Self {
            scheduler: Arc::new(ParseScheduler::new(&config)?),
            store: Arc::new(FileStore::new()),
            index: Arc::new(TagIndex::new()),
            watcher: Arc::new(FileWatcher::new()),
            imported_paths: Mutex::new(HashSet::new()),
            created_files: Mutex::new(HashMap::new()),
            config,
        });
        engine.watcher.init(engine.clone() as Arc<dyn WatchSink>)?;
        Ok(engine)
    }

    // -- Import ----------------------------------------------------------

    /// Recursively scan `paths` for supported files (capped at
    /// `ingest.import_scan_depth`), register and watch them, and submit a
    /// parse task for the whole batch. Returns the project id used to poll
    /// `get_parse_state`. Clears all previously imported state first
    /// unless `append` is set, matching `ImportFileHandler::run`.
    pub fn import_files(&self, paths: Vec<String>, append: bool) -> Result<String> {
        if !append {
            self.reset();
        }

        let mut watch_dirs = Vec::new();
        for p in &paths {
            let path = Path::new(p);
            let dir = if path.is_dir() {
                path.to_path_buf()
            } else {
                path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
            };
            if self.imported_paths.lock().unwrap().insert(dir.clone()) {
                watch_dirs.push(dir);
            }
        }
        self.watcher.add_watch_paths(&watch_dirs)?;

        let files = self.scan_import_files(&paths);
        let project = self.scheduler.new_project_id();
        let mut entries = Vec::with_capacity(files.len());
        for path in files {
            let Some(file_name) = Path::new(&path).file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let data_type = ParseDataType::classify(file_name);
            let file = self.store.add_file(path.clone(), data_type);
            if let Some(normal) = file.as_normal() {
                normal.set_imported(true);
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                entries.push((path, data_type, size));
            }
        }
        self.scheduler.add_parse_task(
            project.clone(),
            entries,
            self.store.clone(),
            self.index.clone(),
            Arc::new(self.config.ingest.clone()),
        );
        Ok(project)
    }

    fn scan_import_files(&self, paths: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        for p in paths {
            let path = Path::new(p);
            if !path.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if ParseDataType::classify(name) != ParseDataType::Unknown {
                        out.push(p.clone());
                    }
                }
                continue;
            }
            self.recursive_scan(path, self.config.ingest.import_scan_depth, &mut out);
        }
        out
    }

    /// Breadth-first scan bounded at `max_depth`, matching
    /// `RecursiveScanFolder`'s queue-based walk (not a recursive call, so a
    /// deep/cyclic symlink tree can't blow the stack).
    fn recursive_scan(&self, root: &Path, max_depth: usize, out: &mut Vec<String>) {
        let mut queue = VecDeque::new();
        queue.push_back((root.to_path_buf(), 0usize));
        while let Some((cur, depth)) = queue.pop_front() {
            if depth == max_depth {
                continue;
            }
            let Ok(entries) = std::fs::read_dir(&cur) else {
                continue;
            };
            for entry in entries.flatten() {
                let entry_path = entry.path();
                if entry_path.is_dir() {
                    queue.push_back((entry_path, depth + 1));
                    continue;
                }
                let Some(name) = entry_path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if ParseDataType::classify(name) != ParseDataType::Unknown {
                    out.push(entry_path.to_string_lossy().into_owned());
                }
            }
        }
    }

    pub fn get_parse_state(&self, project_names: &[String]) -> Vec<(String, bool, u32)> {
        project_names
            .iter()
            .map(|name| match self.scheduler.project_status(name) {
                Some((finished, percent)) => (name.clone(), finished, percent),
                None => (name.clone(), true, 100),
            })
            .collect()
    }

    // -- Graph / query -----------------------------------------------------

    pub fn get_all_graph_info(&self) -> HashMap<String, Vec<String>> {
        self.index.all_graph_info()
    }

    /// Drain the tag index's incremental changelog up to the configured
    /// cap, sorting each tag's file list for a stable response.
    pub fn get_incremental_tag(&self) -> HashMap<String, Vec<String>> {
        self.index
            .drain_incremental(self.config.index.incremental_drain_cap)
            .into_iter()
            .map(|(tag, files)| {
                let mut files: Vec<String> = files.into_iter().collect();
                files.sort();
                (tag, files)
            })
            .collect()
    }

    pub fn get_scalar_data(&self, requests: Vec<GraphDataRequest>) -> Result<Vec<GraphDataResponse>> {
        requests
            .into_iter()
            .map(|req| {
                let lines = query::query_lines(
                    &self.store,
                    &req.tag,
                    &req.file,
                    req.left,
                    req.right,
                    req.token,
                    req.smoothing,
                    req.sample,
                    &self.config.query,
                )?;
                let date_index = lines
                    .iter()
                    .find(|(_, points)| !points.is_empty())
                    .map(|(_, points)| query::build_date_index(points))
                    .unwrap_or_default();
                Ok(GraphDataResponse {
                    tag: req.tag,
                    file: req.file,
                    lines,
                    date_index,
                })
            })
            .collect()
    }

    // -- File merge / token config ------------------------------------------

    pub fn file_merge(&self, name: String, files: Vec<String>, merge: bool) -> Result<MergeResult> {
        if merge {
            let file = self.store.merge(name.clone(), files)?;
            let vf = file.as_virtual().expect("FileStore::merge always returns a virtual file");
            let mut tags: Vec<String> = vf.tags().into_iter().collect();
            tags.sort();
            // Register the virtual file back into the tag index for every
            // tag it unions, giving `Graph::AddFile`'s merge-time symmetry
            // (the original calls `graph->UpdateData` for each tag the
            // merged file carries) — otherwise `GetAllGraph`/
            // `GetIncrementalTag` would never list the merged name as a
            // contributor, only its sub-files.
            for tag in &tags {
                self.index.register(tag, &name);
            }
            let mut sub_files: Vec<String> = vf.sub_files().into_iter().collect();
            sub_files.sort();
            Ok(MergeResult {
                action: "merge",
                name,
                tags,
                file: file.path().to_string(),
                sub_files,
            })
        } else {
            let file = self.store.get(&name).ok_or_else(|| EngineError::UnmergeNotFound(name.clone()))?;
            let vf = match &file {
                File::Virtual(vf) => vf.clone(),
                File::Normal(_) => return Err(EngineError::VirtualFileOperation { op: "unmerge" }),
            };
            let mut tags: Vec<String> = vf.tags().into_iter().collect();
            tags.sort();
            let file_path = file.path().to_string();
            self.store.unmerge(&name)?;
            Ok(MergeResult {
                action: "unset",
                name,
                tags,
                file: file_path,
                sub_files: Vec::new(),
            })
        }
    }

    /// Apply a token-scaling config to a normal file and return its
    /// current tag set, matching `TokenSet::SetFileToken`.
    pub fn set_token_param(
        &self,
        file: &str,
        global_batch_size: f64,
        seq_length: f64,
    ) -> Result<Vec<String>> {
        self.store.update_token_param(file, Some(global_batch_size), Some(seq_length))?;
        let normal = self.store.get_normal(file).ok_or_else(|| EngineError::FileNotFound(file.into()))?;
        let mut tags: Vec<String> = normal.tags().into_iter().collect();
        tags.sort();
        Ok(tags)
    }

    pub fn get_created_file_group_by_dir(&self) -> HashMap<String, HashSet<String>> {
        self.created_files.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.store.reset();
        self.index.reset();
        self.imported_paths.lock().unwrap().clear();
        self.created_files.lock().unwrap().clear();
    }

    /// Recompute progress for every in-flight import project. Meant to be
    /// called on `poll_interval()` by whatever owns the process's event
    /// loop (a tokio interval in the service binary).
    pub fn tick(&self) {
        self.scheduler.tick();
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        self.scheduler.poll_interval()
    }
}

impl WatchSink for Engine {
    /// A new file appeared under a watched directory: record it in the
    /// created-files bookkeeping map, and — if it's the first time we've
    /// seen this path — register a `FileRecord` for it with `empty=true`,
    /// `imported=false`, matching
    /// `FileWatcherLinuxImpl::OnFileCreated`'s `AddFile` + `SetEmpty(true)`
    /// + `SetImported(false)`. The file isn't parsed until an explicit
    /// import or a later write-close marks it imported.
    fn on_file_created(&self, dir: &Path, file_name: &str) {
        self.created_files
            .lock()
            .unwrap()
            .entry(dir.to_string_lossy().into_owned())
            .or_default()
            .insert(file_name.to_string());

        let data_type = ParseDataType::classify(file_name);
        if data_type == ParseDataType::Unknown {
            return;
        }
        let path = dir.join(file_name).to_string_lossy().into_owned();
        let already_known = self.store.get(&path).is_some();
        let file = self.store.add_file(path, data_type);
        if already_known {
            return;
        }
        if let Some(normal) = file.as_normal() {
            normal.set_empty(true);
            normal.set_imported(false);
        }
    }

    /// A watched file finished a write burst: if it's a supported file
    /// that's already been imported, submit a one-file incremental parse
    /// task so new bytes land without waiting on the next explicit import.
    /// Matches `FileWatcherLinuxImpl::OnFileWriteClose`'s
    /// `if (!server.IsFileImported(...)) return;` guard — a file the
    /// watcher merely saw created, but that was never imported, is
    /// ignored here.
    fn on_file_write_close(&self, dir: &Path, file_name: &str) {
        let data_type = ParseDataType::classify(file_name);
        if data_type == ParseDataType::Unknown {
            return;
        }
        let path = dir.join(file_name);
        let path_str = path.to_string_lossy().into_owned();
        let Some(normal) = self.store.get_normal(&path_str) else {
            return;
        };
        if !normal.is_imported() {
            return;
        }
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let project = self.scheduler.new_project_id();
        self.scheduler.add_parse_task(
            project,
            vec![(path_str, data_type, size)],
            self.store.clone(),
            self.index.clone(),
            Arc::new(self.config.ingest.clone()),
        );
    }
}
