//! Exponential debiased smoother (`smoothing` algorithm).
//!
//! Grounded on `Scalar/server/src/GraphLine/Smoother/IRLowSmoother.cpp`: a
//! constant-prefix or non-finite point passes through unchanged (still
//! counted by the caller's `src[num_accum..]` window, but without touching
//! `last`/advancing the debias term); otherwise the point is folded into an
//! EMA and emitted after dividing out the debias factor.

use super::{Smoother, SmoothingParam};
use crate::point::ScalarPoint;

pub struct DebiasedSmoother {
    weight: f64,
    last: f32,
    /// How many source points have been replayed through `sample` — the
    /// resume cursor the trait contract calls `num_accum`.
    cursor: usize,
    /// How many points actually folded into the EMA (excludes passthrough
    /// points), used for the debias exponent. Distinct from `cursor`: a
    /// constant-prefix or non-finite point still advances `cursor` so
    /// resuming `sample` doesn't reprocess it, but leaves this untouched.
    debias_accum: usize,
    seen_first: bool,
    first_value: f32,
    all_constant_so_far: bool,
}

impl DebiasedSmoother {
    pub fn new(weight: f64) -> Self {
        Self {
            weight,
            last: 0.0,
            cursor: 0,
            debias_accum: 0,
            seen_first: false,
            first_value: 0.0,
            all_constant_so_far: true,
        }
    }
}

impl Smoother for DebiasedSmoother {
    fn sample(&mut self, src: &[ScalarPoint], dst: &mut Vec<ScalarPoint>) {
        if self.weight == 0.0 {
            // Degenerate: smoothing disabled, no writes to dst.
            self.cursor = src.len();
            return;
        }
        for point in &src[self.cursor.min(src.len())..] {
            if !self.seen_first {
                self.seen_first = true;
                self.first_value = point.value;
            } else if point.value != self.first_value {
                self.all_constant_so_far = false;
            }

            let passthrough = self.all_constant_so_far || !point.value.is_finite();
            self.cursor += 1;
            if passthrough {
                dst.push(point.clone());
                continue;
            }

            self.last = self.last * self.weight as f32 + (1.0 - self.weight as f32) * point.value;
            self.debias_accum += 1;
            let debias = if self.weight == 1.0 {
                1.0
            } else {
                1.0 - self.weight.powi(self.debias_accum as i32)
            };
            let emitted = self.last / debias as f32;
            dst.push(ScalarPoint {
                step: point.step,
                value: emitted,
                wall_time: point.wall_time,
                local_time: point.local_time.clone(),
            });
        }
    }

    fn equal(&self, param: &SmoothingParam) -> bool {
        matches!(param, SmoothingParam::Debiased { weight } if *weight == self.weight)
    }

    fn reset(&mut self) {
        self.last = 0.0;
        self.cursor = 0;
        self.debias_accum = 0;
        self.seen_first = false;
        self.all_constant_so_far = true;
    }

    fn num_accum(&self) -> usize {
        self.cursor
    }
}
