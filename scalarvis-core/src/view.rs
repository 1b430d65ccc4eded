//! Zero-copy windows over a file's per-tag record array.

use crate::point::ScalarPoint;

/// Whether a view spans a contiguous run of indices or a strided selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Continuous,
    Discrete,
}

/// A non-owning window over a `(file, tag)` record vector.
///
/// `lower` and `upper` are both inclusive in `Continuous` mode, so
/// `length == upper - lower + 1`. In `Discrete` mode the view instead walks
/// `discrete_indices`, a strictly increasing subset of `[lower, upper]`.
///
/// `DataView` never holds a borrow of the backing vector — only indices —
/// so it stays valid across the append-only mutations the store performs,
/// as long as the caller materialises it before the record it points at
/// could be removed (records are never removed; see the Non-goals).
#[derive(Debug, Clone)]
pub struct DataView {
    owner_path: String,
    tag: String,
    lower: usize,
    upper: usize,
    kind: ViewKind,
    discrete_indices: Vec<usize>,
}

impl DataView {
    /// Build a continuous view over `[lower, upper]` (inclusive on both ends).
    ///
    /// Panics if `lower > upper` or `upper` is out of bounds for `records`;
    /// callers are expected to have already intersected with a valid range.
    pub fn continuous(
        owner_path: impl Into<String>,
        tag: impl Into<String>,
        lower: usize,
        upper: usize,
    ) -> Self {
        assert!(lower <= upper, "DataView requires lower <= upper");
        Self {
            owner_path: owner_path.into(),
            tag: tag.into(),
            lower,
            upper,
            kind: ViewKind::Continuous,
            discrete_indices: Vec::new(),
        }
    }

    /// An empty view (no records). `lower == upper` with zero length is not
    /// representable by the inclusive formula, so empty views are modeled
    /// as `Discrete` with no indices.
    pub fn empty(owner_path: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            owner_path: owner_path.into(),
            tag: tag.into(),
            lower: 0,
            upper: 0,
            kind: ViewKind::Discrete,
            discrete_indices: Vec::new(),
        }
    }

    pub fn owner_path(&self) -> &str {
        &self.owner_path
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn lower(&self) -> usize {
        self.lower
    }

    pub fn upper(&self) -> usize {
        self.upper
    }

    pub fn is_empty(&self) -> bool {
        match self.kind {
            ViewKind::Continuous => false,
            ViewKind::Discrete => self.discrete_indices.is_empty(),
        }
    }

    /// Number of records this view covers.
    pub fn len(&self) -> usize {
        match self.kind {
            ViewKind::Continuous => self.upper - self.lower + 1,
            ViewKind::Discrete => self.discrete_indices.len(),
        }
    }

    /// Convert a `Continuous` view to `Discrete` by stride `step` (`step >= 1`):
    /// include `lower`, `lower+step`, …, and always include `upper` even if
    /// it doesn't fall on the stride. No-op (returns a clone) if already
    /// `Discrete`. Reverse conversion is not supported.
    pub fn gather(&self, step: usize) -> DataView {
        if self.kind == ViewKind::Discrete {
            return self.clone();
        }
        let step = step.max(1);
        let mut indices = Vec::new();
        let mut i = self.lower;
        while i < self.upper {
            indices.push(i);
            i += step;
        }
        indices.push(self.upper);
        DataView {
            owner_path: self.owner_path.clone(),
            tag: self.tag.clone(),
            lower: self.lower,
            upper: self.upper,
            kind: ViewKind::Discrete,
            discrete_indices: indices,
        }
    }

    /// Materialise this view against its backing record slice.
    pub fn materialize(&self, records: &[ScalarPoint]) -> Vec<ScalarPoint> {
        match self.kind {
            ViewKind::Continuous => records[self.lower..=self.upper].to_vec(),
            ViewKind::Discrete => self
                .discrete_indices
                .iter()
                .filter_map(|&i| records.get(i).cloned())
                .collect(),
        }
    }

    /// The first record this view covers, if any.
    pub fn first<'a>(&self, records: &'a [ScalarPoint]) -> Option<&'a ScalarPoint> {
        match self.kind {
            ViewKind::Continuous => records.get(self.lower),
            ViewKind::Discrete => self.discrete_indices.first().and_then(|&i| records.get(i)),
        }
    }
}

/// Find the inclusive `[lower, upper]` index range of records whose `step`
/// falls within `[left, right]`, using `step`-ascending order. Returns
/// `None` if no record matches.
pub fn bounds_for_step_range(
    records: &[ScalarPoint],
    left: i64,
    right: i64,
) -> Option<(usize, usize)> {
    if records.is_empty() || left > right {
        return None;
    }
    let lower = records.partition_point(|p| p.step < left);
    // partition_point with "step <= right" gives the first index past the
    // last matching element (exclusive-end search); subtract one for the
    // inclusive-upper convention this crate uses throughout.
    let upper_exclusive = records.partition_point(|p| p.step <= right);
    if lower >= upper_exclusive {
        return None;
    }
    Some((lower, upper_exclusive - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(steps: &[i64]) -> Vec<ScalarPoint> {
        steps
            .iter()
            .map(|&s| ScalarPoint::from_wall_time(s, s as f32, s as f64))
            .collect()
    }

    #[test]
    fn continuous_len_is_inclusive() {
        let v = DataView::continuous("f", "t", 2, 4);
        assert_eq!(v.len(), 3);
    }

    #[test]
    fn gather_always_includes_upper() {
        let v = DataView::continuous("f", "t", 0, 9);
        let g = v.gather(4);
        assert_eq!(g.len(), g.materialize(&pts(&(0..10).collect::<Vec<_>>())).len());
        let mat = g.materialize(&pts(&(0..10).collect::<Vec<_>>()));
        assert_eq!(mat.last().unwrap().step, 9);
        assert_eq!(mat.first().unwrap().step, 0);
    }

    #[test]
    fn bounds_for_step_range_is_inclusive() {
        let records = pts(&[0, 5, 10, 15, 20]);
        let (lo, hi) = bounds_for_step_range(&records, 5, 15).unwrap();
        assert_eq!((lo, hi), (1, 3));
    }

    #[test]
    fn bounds_for_step_range_none_when_disjoint() {
        let records = pts(&[0, 5, 10]);
        assert!(bounds_for_step_range(&records, 100, 200).is_none());
    }
}
