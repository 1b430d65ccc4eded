//! Shared windowing discipline for the median and top-x smoothers.
//!
//! Grounded on `WindowMedianSmoother.cpp`/`WindowTopXSmoother.cpp`, both of
//! which maintain an ordered-by-value multiset plus a FIFO of insertion
//! order for eviction (oldest *inserted* is evicted, not oldest *by value*).
//! Here the multiset is a `BTreeMap<OrderedFloat<f32>, count>` and the FIFO
//! is a `VecDeque<f32>` of the raw values in insertion order.

use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, VecDeque};

pub struct OrderedWindow {
    window_size: usize,
    insertion_order: VecDeque<f32>,
    counts: BTreeMap<OrderedFloat<f32>, usize>,
}

impl OrderedWindow {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            insertion_order: VecDeque::new(),
            counts: BTreeMap::new(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn len(&self) -> usize {
        self.insertion_order.len()
    }

    pub fn is_full(&self) -> bool {
        self.window_size > 0 && self.insertion_order.len() >= self.window_size
    }

    fn insert(&mut self, value: f32) {
        self.insertion_order.push_back(value);
        *self.counts.entry(OrderedFloat(value)).or_insert(0) += 1;
    }

    fn evict_oldest(&mut self) {
        if let Some(value) = self.insertion_order.pop_front() {
            if let Some(count) = self.counts.get_mut(&OrderedFloat(value)) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(&OrderedFloat(value));
                }
            }
        }
    }

    /// Insert `value`, evicting the oldest member first if the window is
    /// already at `window_size`.
    pub fn push(&mut self, value: f32) {
        if self.insertion_order.len() >= self.window_size {
            self.evict_oldest();
        }
        self.insert(value);
    }

    /// Ascending-order iterator honoring multiplicities.
    fn ascending(&self) -> impl Iterator<Item = f32> + '_ {
        self.counts
            .iter()
            .flat_map(|(v, &count)| std::iter::repeat(v.0).take(count))
    }

    /// Median of the current window contents: the central element if the
    /// count is odd, else the mean of the two central elements.
    pub fn median(&self) -> f32 {
        let n = self.insertion_order.len();
        if n == 0 {
            return 0.0;
        }
        let mid = n / 2;
        if n % 2 == 0 {
            let mut iter = self.ascending().skip(mid - 1);
            let a = iter.next().unwrap_or(0.0);
            let b = iter.next().unwrap_or(a);
            (a + b) / 2.0
        } else {
            self.ascending().nth(mid).unwrap_or(0.0)
        }
    }

    /// Mean of the `k` smallest elements currently in the window.
    pub fn smallest_k_mean(&self, k: usize) -> f32 {
        let k = k.max(1).min(self.insertion_order.len().max(1));
        let sum: f32 = self.ascending().take(k).sum();
        sum / k as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_window() {
        let mut w = OrderedWindow::new(3);
        for v in [1.0, 3.0, 2.0] {
            w.push(v);
        }
        assert_eq!(w.median(), 2.0);
    }

    #[test]
    fn median_of_even_window_averages_center() {
        let mut w = OrderedWindow::new(4);
        for v in [1.0, 3.0, 2.0, 5.0] {
            w.push(v);
        }
        // ascending: 1,2,3,5 -> center pair (2,3) -> 2.5
        assert_eq!(w.median(), 2.5);
    }

    #[test]
    fn eviction_is_fifo_by_insertion_not_value() {
        let mut w = OrderedWindow::new(3);
        w.push(5.0);
        w.push(1.0);
        w.push(3.0);
        // window full at {5,1,3}; pushing 2.0 evicts 5.0 (oldest inserted)
        w.push(2.0);
        assert_eq!(w.len(), 3);
        // remaining ascending: 1,2,3 -> median 2
        assert_eq!(w.median(), 2.0);
    }

    #[test]
    fn smallest_k_mean() {
        let mut w = OrderedWindow::new(5);
        for v in [5.0, 1.0, 3.0, 2.0, 4.0] {
            w.push(v);
        }
        assert_eq!(w.smallest_k_mean(2), 1.5);
    }
}
