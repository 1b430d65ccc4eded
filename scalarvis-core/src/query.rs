//! Graph-line assembly: combines a tag's raw/smoothed/token-rescaled
//! views into the point series a client actually requests, and applies
//! the display-sampling cap.
//!
//! Grounded on `GraphLine::{GetLineData,AddLineData,BuildLine}` and the
//! `LineOp` hierarchy (`NormalLineOp`/`SmoothingLineOp`/`TokenLineOp`/
//! `SampleLineOp`): a request fans out into one or two `GraphLine`s
//! (the raw/token line, plus its smoothed twin when smoothing is
//! requested), each built from a small ordered pipeline of ops rather
//! than a class hierarchy with virtual `Process`.

use crate::config::QueryConfig;
use crate::error::Result;
use crate::file::{DataMode, FileStore};
use crate::point::ScalarPoint;
use crate::smoother::SmoothingParam;
use crate::view::DataView;
use serde::{Deserialize, Serialize};

/// Which combination of raw/token/smoothing a `GraphLine` represents.
/// Mirrors `LineType`; `Sample` and `Unknown` aren't line kinds of their
/// own (sampling is a modifier applied to any of the other four, and
/// `BuildLine` never emits `Unknown`), so they're left out here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineType {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "tokenNormal")]
    Token,
    #[serde(rename = "normalSmoothing")]
    NormalSmoothing,
    #[serde(rename = "tokenSmoothing")]
    TokenSmoothing,
}

impl LineType {
    pub fn is_token(self) -> bool {
        matches!(self, LineType::Token | LineType::TokenSmoothing)
    }

    pub fn is_smoothing(self) -> bool {
        matches!(self, LineType::NormalSmoothing | LineType::TokenSmoothing)
    }

    fn to_data_mode(self) -> DataMode {
        match self {
            LineType::Normal => DataMode::Normal,
            LineType::Token => DataMode::TokenNormal,
            LineType::NormalSmoothing => DataMode::Smoothing,
            LineType::TokenSmoothing => DataMode::TokenSmoothing,
        }
    }
}

/// Decide which `LineType`s a request builds, in emission order.
/// Token and plain lines are mutually exclusive; smoothing adds a
/// second, paired line after the primary one. Matches
/// `GraphLine::BuildLine` exactly.
pub fn build_line(token_enabled: bool, smoothing_enabled: bool) -> Vec<LineType> {
    let mut res = Vec::with_capacity(2);
    if token_enabled {
        res.push(LineType::Token);
        if smoothing_enabled {
            res.push(LineType::TokenSmoothing);
        }
    } else {
        res.push(LineType::Normal);
        if smoothing_enabled {
            res.push(LineType::NormalSmoothing);
        }
    }
    res
}

/// One assembled line: a bag of `DataView`s (still lazy, pre-materialize)
/// that collapses into a flat, step-ordered point series on demand.
pub struct GraphLine {
    line_type: LineType,
    data_view: Vec<DataView>,
    src_data: Vec<ScalarPoint>,
}

impl GraphLine {
    pub fn new(line_type: LineType, data_view: Vec<DataView>) -> Self {
        Self {
            line_type,
            data_view,
            src_data: Vec::new(),
        }
    }

    pub fn line_type(&self) -> LineType {
        self.line_type
    }

    /// Append `points` (already in ascending-step order), truncating any
    /// existing tail at `points`' first step first. Later-added chunks
    /// overwrite earlier ones from that step forward — this is what lets
    /// a virtual file's later (by `(step, wall_time)`-sort) sub-file
    /// take precedence where ranges overlap, matching
    /// `GraphLine::AddLineData`.
    pub fn add_line_data(&mut self, points: Vec<ScalarPoint>) {
        let Some(first) = points.first() else {
            return;
        };
        let left = first.step;
        let cut = self.src_data.partition_point(|p| p.step < left);
        self.src_data.truncate(cut);
        self.src_data.extend(points);
    }

    /// Materialize every `DataView` against its owning file's records,
    /// rescaling steps by each view's own token coefficient when this
    /// line is a token line (`TokenLineOp::TransViewToData` runs the
    /// rescale per-view, before the views are folded together — a
    /// virtual file's sub-files can each have a different coefficient).
    pub fn into_points(mut self, store: &FileStore) -> Vec<ScalarPoint> {
        let token = self.line_type.is_token();
        let smoothing = self.line_type.is_smoothing();
        let views = std::mem::take(&mut self.data_view);
        for view in views {
            let Some(normal) = store.get_normal(view.owner_path()) else {
                continue;
            };
            let Some(mut points) = normal.with_records(view.tag(), smoothing, |records| view.materialize(records))
            else {
                continue;
            };
            if token {
                let coef = normal.token_coefficient();
                for p in &mut points {
                    p.step = (p.step as f64 * coef) as i64;
                }
            }
            self.add_line_data(points);
        }
        self.src_data
    }
}

/// Convert every `Continuous` view in-place to a `Discrete` stride
/// selection, using one shared stride computed over the combined
/// length of all of them. Mirrors `SampleLineOp::Process`: `step =
/// total / stride_base`, floored to at least 1 so the endpoints are
/// always retained.
fn apply_sample(data_view: &mut [DataView], stride_base: usize) {
    let total: usize = data_view.iter().map(DataView::len).sum();
    if total == 0 {
        return;
    }
    let step = (total / stride_base.max(1)).max(1);
    for view in data_view.iter_mut() {
        *view = view.gather(step);
    }
}

/// Run a full scalar-data query: resolve the requested `(tag, file)`
/// window into one or two point series, one per `LineType` `build_line`
/// selects. `smoothing` being `Some` both enables the smoothing line and
/// supplies the algorithm/params to (re)configure the file's smoother
/// with before reading its `smoothing_data`.
pub fn query_lines(
    store: &FileStore,
    tag: &str,
    file: &str,
    left: i64,
    right: i64,
    token_enabled: bool,
    smoothing: Option<SmoothingParam>,
    sample: bool,
    query_config: &QueryConfig,
) -> Result<Vec<(LineType, Vec<ScalarPoint>)>> {
    let types = build_line(token_enabled, smoothing.is_some());
    let mut out = Vec::with_capacity(types.len());

    for line_type in types {
        if line_type.is_smoothing() {
            let param = smoothing.clone().expect("smoothing line only built when smoothing.is_some()");
            store.update_smoothing_param(file, tag, param)?;
        }

        let mut data_view = store.get_data(file, tag, left, right, line_type.to_data_mode());
        if sample {
            apply_sample(&mut data_view, query_config.sample_stride_base);
        }

        let points = GraphLine::new(line_type, data_view).into_points(store);
        out.push((line_type, points));
    }
    Ok(out)
}

/// One calendar-day marker: `(step, value, "YYYY-MM-DD")` for the first
/// point seen on each new day in the series. Grounded on
/// `ScalarVisuallyGetScalarDataHandler::BuildDateIndex` — a client uses
/// this to paint date separators under the x-axis without re-parsing
/// every point's `local_time`.
pub fn build_date_index(points: &[ScalarPoint]) -> Vec<(i64, f32, String)> {
    let mut out = Vec::new();
    let mut last_date: Option<&str> = None;
    for point in points {
        let Some(comma) = point.local_time.find(',') else {
            continue;
        };
        // local_time is "YYYY-MM-DD HH:MM:SS,mmm"; the date is everything
        // before the 9 characters preceding the comma (" HH:MM:SS").
        if comma < 9 {
            continue;
        }
        let date = &point.local_time[..comma - 9];
        if Some(date) != last_date {
            last_date = Some(date);
            out.push((point.step, point.value, date.to_string()));
        }
    }
    out
}
