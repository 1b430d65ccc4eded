//! Windowed median smoother (`windowMedian` algorithm).

use super::window::OrderedWindow;
use super::{Smoother, SmoothingParam};
use crate::point::ScalarPoint;

pub struct WindowMedianSmoother {
    window_size: u64,
    window: OrderedWindow,
    cursor: usize,
}

impl WindowMedianSmoother {
    pub fn new(window_size: u64) -> Self {
        Self {
            window_size,
            window: OrderedWindow::new(window_size as usize),
            cursor: 0,
        }
    }
}

impl Smoother for WindowMedianSmoother {
    fn sample(&mut self, src: &[ScalarPoint], dst: &mut Vec<ScalarPoint>) {
        if self.window_size == 0 {
            // Disabled: emit raw, cursor still advances so reconfiguring
            // back on later doesn't replay history that was never dropped.
            dst.extend_from_slice(&src[self.cursor.min(src.len())..]);
            self.cursor = src.len();
            return;
        }
        for point in &src[self.cursor.min(src.len())..] {
            self.cursor += 1;
            // Pre-fill phase: fewer than window_size-1 elements seen so far.
            if (self.window.len() as u64) < self.window_size.saturating_sub(1) {
                dst.push(point.clone());
                self.window.push(point.value);
                continue;
            }
            self.window.push(point.value);
            let median = self.window.median();
            dst.push(ScalarPoint {
                step: point.step,
                value: median,
                wall_time: point.wall_time,
                local_time: point.local_time.clone(),
            });
        }
    }

    fn equal(&self, param: &SmoothingParam) -> bool {
        matches!(param, SmoothingParam::WindowMedian { window_size } if *window_size == self.window_size)
    }

    fn reset(&mut self) {
        self.window = OrderedWindow::new(self.window_size as usize);
        self.cursor = 0;
    }

    fn num_accum(&self) -> usize {
        self.cursor
    }
}
