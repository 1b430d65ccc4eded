//! A merged view over several normal files, unioning their tags and
//! fanning `get_data` out across the members sorted into one timeline.

use super::store::FileStore;
use super::DataMode;
use crate::smoother::SmoothingParam;
use crate::view::DataView;
use std::collections::HashSet;
use std::sync::RwLock;

pub struct VirtualFile {
    path: String,
    sub_files: RwLock<HashSet<String>>,
    tags: RwLock<HashSet<String>>,
}

impl VirtualFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sub_files: RwLock::new(HashSet::new()),
            tags: RwLock::new(HashSet::new()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn sub_files(&self) -> HashSet<String> {
        self.sub_files.read().unwrap().clone()
    }

    pub fn tags(&self) -> HashSet<String> {
        self.tags.read().unwrap().clone()
    }

    /// Add `paths` as sub-files, pulling each one's current tag set into
    /// this virtual file's own union. Unknown paths are skipped (the
    /// caller, `FileStore::merge`, is expected to have validated them).
    pub fn add_sub_files(&self, paths: &[String], store: &FileStore) {
        let mut sub_files = self.sub_files.write().unwrap();
        let mut tags = self.tags.write().unwrap();
        for path in paths {
            if let Some(normal) = store.get_normal(path) {
                sub_files.insert(path.clone());
                tags.extend(normal.tags());
            }
        }
    }

    pub fn remove_sub_file(&self, path: &str) {
        self.sub_files.write().unwrap().remove(path);
        self.recompute_tags_excluding_removed(path);
    }

    fn recompute_tags_excluding_removed(&self, _removed: &str) {
        // Tags are a pure union; a removal can only shrink the set, but
        // recomputing requires the store, which callers provide via
        // `FileStore::unmerge`'s own tag-rebuild pass.
    }

    /// Fan `get_data` out across every sub-file that both exists in
    /// `store` and declares `tag`, then order the resulting views by
    /// each view's first record's `(step, wall_time)`.
    pub fn get_data(
        &self,
        tag: &str,
        left: i64,
        right: i64,
        mode: DataMode,
        store: &FileStore,
    ) -> Vec<DataView> {
        let sub_files = self.sub_files.read().unwrap();
        let mut views: Vec<DataView> = Vec::new();
        for path in sub_files.iter() {
            let Some(normal) = store.get_normal(path) else {
                continue;
            };
            if !normal.contains_tag(tag) {
                continue;
            }
            if let Some(view) = normal.get_data(tag, left, right, mode) {
                views.push(view);
            }
        }
        views.sort_by(|a, b| {
            let key = |v: &DataView| -> (i64, f64) {
                store
                    .get_normal(v.owner_path())
                    .and_then(|f| {
                        f.with_records(v.tag(), mode.is_smoothing(), |records| {
                            v.first(records).map(|p| (p.step, p.wall_time))
                        })
                    })
                    .flatten()
                    .unwrap_or((i64::MAX, f64::MAX))
            };
            key(a).partial_cmp(&key(b)).unwrap()
        });
        views
    }

    /// Broadcast a smoothing-param change to every sub-file. Each file
    /// gets its own independently-owned smoother instance, not a shared
    /// one — matching the per-`NormalFile` smoother-map design.
    pub fn update_smoothing_param(&self, tag: &str, param: SmoothingParam, store: &FileStore) {
        let sub_files = self.sub_files.read().unwrap();
        for path in sub_files.iter() {
            if let Some(normal) = store.get_normal(path) {
                normal.update_smoothing_param(tag, param.clone());
            }
        }
    }
}
