//! Windowed top-x mean smoother (`windowTopx` algorithm).
//!
//! Same windowing discipline as the median smoother; emits the mean of the
//! `elem_count` smallest values currently in the window, where
//! `elem_count = max(1, floor(window_size * top))`.

use super::window::OrderedWindow;
use super::{Smoother, SmoothingParam};
use crate::point::ScalarPoint;

pub struct WindowTopxSmoother {
    window_size: u64,
    top: f64,
    window: OrderedWindow,
    cursor: usize,
}

impl WindowTopxSmoother {
    pub fn new(window_size: u64, top: f64) -> Self {
        Self {
            window_size,
            top,
            window: OrderedWindow::new(window_size as usize),
            cursor: 0,
        }
    }

    fn elem_count(&self) -> usize {
        ((self.window_size as f64 * self.top).floor() as usize).max(1)
    }
}

impl Smoother for WindowTopxSmoother {
    fn sample(&mut self, src: &[ScalarPoint], dst: &mut Vec<ScalarPoint>) {
        if self.window_size == 0 {
            dst.extend_from_slice(&src[self.cursor.min(src.len())..]);
            self.cursor = src.len();
            return;
        }
        for point in &src[self.cursor.min(src.len())..] {
            self.cursor += 1;
            if (self.window.len() as u64) < self.window_size.saturating_sub(1) {
                dst.push(point.clone());
                self.window.push(point.value);
                continue;
            }
            self.window.push(point.value);
            let mean = self.window.smallest_k_mean(self.elem_count());
            dst.push(ScalarPoint {
                step: point.step,
                value: mean,
                wall_time: point.wall_time,
                local_time: point.local_time.clone(),
            });
        }
    }

    fn equal(&self, param: &SmoothingParam) -> bool {
        matches!(param, SmoothingParam::WindowTopx { window_size, top }
            if *window_size == self.window_size && *top == self.top)
    }

    fn reset(&mut self) {
        self.window = OrderedWindow::new(self.window_size as usize);
        self.cursor = 0;
    }

    fn num_accum(&self) -> usize {
        self.cursor
    }
}
