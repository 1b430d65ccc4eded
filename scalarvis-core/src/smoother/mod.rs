//! Streaming smoothers: stateful transforms replayed over a tag's point
//! history, producing a parallel `smoothing_data` series.
//!
//! The three algorithms share a narrow capability set — this is modeled as
//! a `Smoother` trait with a single factory keyed by algorithm name, per the
//! polymorphic-smoothers design note, rather than the source's inheritance
//! hierarchy.

mod debiased;
mod window;
mod window_median;
mod window_topx;

pub use debiased::DebiasedSmoother;
pub use window_median::WindowMedianSmoother;
pub use window_topx::WindowTopxSmoother;

use crate::point::ScalarPoint;
use serde::{Deserialize, Serialize};

/// Tagged-variant smoothing configuration, avoiding downcasts on the
/// trait object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum SmoothingParam {
    #[serde(rename = "smoothing")]
    Debiased { weight: f64 },
    #[serde(rename = "windowMedian")]
    WindowMedian { window_size: u64 },
    #[serde(rename = "windowTopx")]
    WindowTopx { window_size: u64, top: f64 },
}

impl SmoothingParam {
    pub fn algorithm(&self) -> &'static str {
        match self {
            SmoothingParam::Debiased { .. } => "smoothing",
            SmoothingParam::WindowMedian { .. } => "windowMedian",
            SmoothingParam::WindowTopx { .. } => "windowTopx",
        }
    }
}

/// A stateful streaming transform over one tag's point series.
pub trait Smoother: Send {
    /// Extend `dst` by replaying `src[self.num_accum()..]` through the
    /// algorithm, advancing the internal accumulation counter.
    fn sample(&mut self, src: &[ScalarPoint], dst: &mut Vec<ScalarPoint>);

    /// Whether `param` describes the same configuration this smoother is
    /// already running with.
    fn equal(&self, param: &SmoothingParam) -> bool;

    /// Zero all accumulated state (but keep the configured parameters).
    fn reset(&mut self);

    /// How many source points have already been folded into this smoother's
    /// output.
    fn num_accum(&self) -> usize;
}

/// Build a smoother for `param`. The single point of construction the
/// design notes ask for in place of a process-global factory singleton.
pub fn build_smoother(param: &SmoothingParam) -> Box<dyn Smoother> {
    match *param {
        SmoothingParam::Debiased { weight } => Box::new(DebiasedSmoother::new(weight)),
        SmoothingParam::WindowMedian { window_size } => {
            Box::new(WindowMedianSmoother::new(window_size))
        }
        SmoothingParam::WindowTopx { window_size, top } => {
            Box::new(WindowTopxSmoother::new(window_size, top))
        }
    }
}
