//! The tag-keyed graph index: for each tag, which files currently
//! contribute data to it, plus an incremental changelog of
//! recently-touched `(tag, file)` pairs for `GetIncrementalTag`.
//!
//! Grounded on `GraphManager.{h,cpp}` (the per-tag `Graph::dataFiles_`
//! union) and `ScalarVisuallyServer`'s `incrementalTag_`/`GetIncremental`
//! drain loop.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

pub struct TagIndex {
    graphs: RwLock<HashMap<String, HashSet<String>>>,
    incremental: Mutex<HashMap<String, HashSet<String>>>,
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TagIndex {
    pub fn new() -> Self {
        Self {
            graphs: RwLock::new(HashMap::new()),
            incremental: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `(tag, file)` would be a new pairing — no graph for `tag`
    /// yet, or `file` isn't already a member of it. Mirrors
    /// `ScalarVisuallyServer::IsIncremental`; read-only, taken before any
    /// mutation per the lock order in §5.
    pub fn is_incremental(&self, tag: &str, file: &str) -> bool {
        let graphs = self.graphs.read().unwrap();
        match graphs.get(tag) {
            Some(files) => !files.contains(file),
            None => true,
        }
    }

    pub fn add_incremental(&self, tag: &str, file: &str) {
        self.incremental
            .lock()
            .unwrap()
            .entry(tag.to_string())
            .or_default()
            .insert(file.to_string());
    }

    /// Register `file` as a contributor to `tag`'s graph, creating the
    /// graph if this is its first contributor. Also used directly (with
    /// no incremental-changelog entry) to give `Graph::AddFile` its
    /// merge-time symmetry — see the decided Open Question in
    /// SPEC_FULL.md.
    pub fn register(&self, tag: &str, file: &str) {
        self.graphs
            .write()
            .unwrap()
            .entry(tag.to_string())
            .or_default()
            .insert(file.to_string());
    }

    /// Record a data arrival for `(tag, file)`: flags it in the
    /// incremental changelog if it's new, then registers it in the
    /// graph. Call with the graph index lock taken before any per-file
    /// lock, matching §5's ordering.
    pub fn record_update(&self, tag: &str, file: &str) {
        if self.is_incremental(tag, file) {
            self.add_incremental(tag, file);
        }
        self.register(tag, file);
    }

    pub fn remove_file(&self, tag: &str, file: &str) {
        if let Some(files) = self.graphs.write().unwrap().get_mut(tag) {
            files.remove(file);
        }
    }

    pub fn contains(&self, tag: &str, file: &str) -> bool {
        self.graphs
            .read()
            .unwrap()
            .get(tag)
            .is_some_and(|files| files.contains(file))
    }

    /// `tag -> [files]`, for `GetAllGraph`.
    pub fn all_graph_info(&self) -> HashMap<String, Vec<String>> {
        self.graphs
            .read()
            .unwrap()
            .iter()
            .map(|(tag, files)| {
                let mut files: Vec<String> = files.iter().cloned().collect();
                files.sort();
                (tag.clone(), files)
            })
            .collect()
    }

    /// Every tag `file` currently contributes to.
    pub fn file_tags(&self, file: &str) -> HashSet<String> {
        self.graphs
            .read()
            .unwrap()
            .iter()
            .filter(|(_, files)| files.contains(file))
            .map(|(tag, _)| tag.clone())
            .collect()
    }

    /// Drain the incremental changelog, stopping once the running total
    /// of drained files exceeds `cap` (entries are drained whole —
    /// a tag's file set is never split across calls).
    pub fn drain_incremental(&self, cap: usize) -> HashMap<String, HashSet<String>> {
        let mut incremental = self.incremental.lock().unwrap();
        let mut out = HashMap::new();
        let mut count = 0usize;
        let tags: Vec<String> = incremental.keys().cloned().collect();
        for tag in tags {
            let Some(files) = incremental.remove(&tag) else {
                continue;
            };
            count += files.len();
            out.insert(tag, files);
            if count > cap {
                break;
            }
        }
        out
    }

    pub fn reset(&self) {
        self.graphs.write().unwrap().clear();
        self.incremental.lock().unwrap().clear();
    }
}
