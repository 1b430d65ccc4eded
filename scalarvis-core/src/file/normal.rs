//! A normal (non-virtual) file's per-tag series, ranges, and smoother state.

use super::{DataMode, ParseDataType};
use crate::point::ScalarPoint;
use crate::smoother::{build_smoother, Smoother, SmoothingParam};
use crate::view::{bounds_for_step_range, DataView};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

struct NormalFileData {
    offset: u64,
    empty: bool,
    imported: bool,
    global_batch_size: f64,
    seq_length: f64,
    tags: HashSet<String>,
    data: HashMap<String, Vec<ScalarPoint>>,
    smoothing_data: HashMap<String, Vec<ScalarPoint>>,
    range: HashMap<String, (i64, i64)>,
}

impl Default for NormalFileData {
    fn default() -> Self {
        Self {
            offset: 0,
            empty: true,
            imported: true,
            global_batch_size: -1.0,
            seq_length: -1.0,
            tags: HashSet::new(),
            data: HashMap::new(),
            smoothing_data: HashMap::new(),
            range: HashMap::new(),
        }
    }
}

/// One data lock for `data`/`smoothing_data`/`range`/`tags`, plus a
/// separate smoother-map mutex, matching the deadlock-avoidance split in
/// the source (`dataMutex_` vs. `smootherMutex_`).
pub struct NormalFile {
    path: String,
    data_type: ParseDataType,
    inner: RwLock<NormalFileData>,
    smoothers: Mutex<HashMap<String, (SmoothingParam, Box<dyn Smoother>)>>,
}

impl NormalFile {
    pub fn new(path: impl Into<String>, data_type: ParseDataType) -> Self {
        Self {
            path: path.into(),
            data_type,
            inner: RwLock::new(NormalFileData::default()),
            smoothers: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data_type(&self) -> ParseDataType {
        self.data_type
    }

    pub fn offset(&self) -> u64 {
        self.inner.read().unwrap().offset
    }

    pub fn set_offset(&self, offset: u64) {
        let mut guard = self.inner.write().unwrap();
        if offset > guard.offset {
            guard.offset = offset;
        }
    }

    pub fn is_empty_file(&self) -> bool {
        self.inner.read().unwrap().empty
    }

    pub fn set_empty(&self, empty: bool) {
        self.inner.write().unwrap().empty = empty;
    }

    pub fn is_imported(&self) -> bool {
        self.inner.read().unwrap().imported
    }

    pub fn set_imported(&self, imported: bool) {
        self.inner.write().unwrap().imported = imported;
    }

    pub fn tags(&self) -> HashSet<String> {
        self.inner.read().unwrap().tags.clone()
    }

    pub fn contains_tag(&self, tag: &str) -> bool {
        self.inner.read().unwrap().tags.contains(tag)
    }

    /// `globalBatchSize` is applied unconditionally when positive;
    /// `seqLength` is applied only when positive AND the file isn't a
    /// TextLog (TextLog's token coefficient only ever uses batch size —
    /// see SPEC_FULL.md's supplemental notes).
    pub fn update_token_param(&self, global_batch_size: Option<f64>, seq_length: Option<f64>) {
        let mut guard = self.inner.write().unwrap();
        if let Some(gbs) = global_batch_size {
            if gbs > 0.0 {
                guard.global_batch_size = gbs;
            }
        }
        if let Some(sl) = seq_length {
            if sl > 0.0 && self.data_type != ParseDataType::TextLog {
                guard.seq_length = sl;
            }
        }
    }

    /// `globalBatchSize · seqLength · 0.001`, clamped to ≥1; returns 1.0
    /// (identity) when either parameter is negative (unset).
    pub fn token_coefficient(&self) -> f64 {
        let guard = self.inner.read().unwrap();
        if guard.global_batch_size < 0.0 || guard.seq_length < 0.0 {
            return 1.0;
        }
        (guard.global_batch_size * guard.seq_length * 0.001).max(1.0)
    }

    /// Append `points` to `data[tag]`, update `range[tag]`, and lazily
    /// extend `smoothing_data[tag]` if a smoother is configured for `tag`.
    ///
    /// Returns `true` if this was the first time `tag` appeared on this
    /// file (used by the caller to decide incremental-log membership).
    pub fn update_data(&self, tag: &str, points: Vec<ScalarPoint>) -> bool {
        if points.is_empty() {
            return false;
        }
        let first_seen;
        {
            let mut guard = self.inner.write().unwrap();
            first_seen = !guard.tags.contains(tag);
            guard.tags.insert(tag.to_string());
            let new_lo = points.first().unwrap().step;
            let new_hi = points.last().unwrap().step;
            guard
                .range
                .entry(tag.to_string())
                .and_modify(|(_, hi)| *hi = new_hi)
                .or_insert((new_lo, new_hi));
            guard
                .data
                .entry(tag.to_string())
                .or_default()
                .extend(points);
            guard.empty = false;
        }
        self.extend_smoothing(tag);
        first_seen
    }

    /// Lazily replay any unsampled source points through `tag`'s smoother,
    /// if one is configured. Takes the smoother mutex after the data lock
    /// has already been released — see DESIGN.md's lock-order note.
    fn extend_smoothing(&self, tag: &str) {
        let mut smoothers = self.smoothers.lock().unwrap();
        let Some((_, smoother)) = smoothers.get_mut(tag) else {
            return;
        };
        let data_guard = self.inner.read().unwrap();
        let Some(src) = data_guard.data.get(tag) else {
            return;
        };
        if smoother.num_accum() >= src.len() {
            return;
        }
        let src = src.clone();
        drop(data_guard);
        let mut dst = Vec::new();
        smoother.sample(&src, &mut dst);
        let mut data_guard = self.inner.write().unwrap();
        data_guard
            .smoothing_data
            .entry(tag.to_string())
            .or_default()
            .extend(dst);
    }

    /// Configure (or reconfigure) `tag`'s smoother. No-op if the existing
    /// smoother already matches `param`. On create-or-replace, rescans the
    /// full history to populate `smoothing_data[tag]`.
    pub fn update_smoothing_param(&self, tag: &str, param: SmoothingParam) {
        {
            let smoothers = self.smoothers.lock().unwrap();
            if let Some((_, existing)) = smoothers.get(tag) {
                if existing.equal(&param) {
                    return;
                }
            }
        }
        let mut smoothers = self.smoothers.lock().unwrap();
        let mut fresh = build_smoother(&param);
        fresh.reset();
        smoothers.insert(tag.to_string(), (param, fresh));
        drop(smoothers);

        let mut guard = self.inner.write().unwrap();
        guard.smoothing_data.remove(tag);
        let src = guard.data.get(tag).cloned().unwrap_or_default();
        drop(guard);

        if src.is_empty() {
            return;
        }
        let mut smoothers = self.smoothers.lock().unwrap();
        if let Some((_, smoother)) = smoothers.get_mut(tag) {
            let mut dst = Vec::new();
            smoother.sample(&src, &mut dst);
            drop(smoothers);
            self.inner
                .write()
                .unwrap()
                .smoothing_data
                .insert(tag.to_string(), dst);
        }
    }

    /// Intersect `[left, right]` with `range[tag]` (after undoing the
    /// token-mode rescale if `mode` is a token variant), and return a
    /// single `DataView` via lower/upper bound on `step`.
    pub fn get_data(&self, tag: &str, left: i64, right: i64, mode: DataMode) -> Option<DataView> {
        if !self.contains_tag(tag) {
            return None;
        }
        let (mut left, mut right) = (left, right);
        if mode.is_token() {
            let coef = self.token_coefficient();
            left = (left as f64 / coef).floor() as i64;
            right = (right as f64 / coef).ceil() as i64;
        }

        let guard = self.inner.read().unwrap();
        let (range_lo, range_hi) = *guard.range.get(tag)?;
        let left = left.max(range_lo);
        let right = right.min(range_hi);
        if left > right {
            return None;
        }

        let records = if mode.is_smoothing() {
            guard.smoothing_data.get(tag)?
        } else {
            guard.data.get(tag)?
        };
        let (lo, hi) = bounds_for_step_range(records, left, right)?;
        Some(DataView::continuous(self.path.clone(), tag, lo, hi))
    }

    /// Read-only access to a tag's materialized series, used by the file
    /// store to dereference a `DataView` and by virtual-file fan-out.
    pub fn with_records<R>(&self, tag: &str, smoothing: bool, f: impl FnOnce(&[ScalarPoint]) -> R) -> Option<R> {
        let guard = self.inner.read().unwrap();
        let records = if smoothing {
            guard.smoothing_data.get(tag)?
        } else {
            guard.data.get(tag)?
        };
        Some(f(records))
    }
}
