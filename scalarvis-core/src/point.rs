//! The scalar measurement type and its wall-time/local-time conversions.

use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

/// `YYYY-MM-DD HH:MM:SS,mmm`, always rendered and parsed as UTC.
///
/// The original source formats this string with `gmtime` but parses it back
/// with a local-time `mktime`, which drifts by the host's UTC offset. This
/// reimplementation treats both directions as UTC civil time so the two
/// conversions actually round-trip (DESIGN.md open-question decision).
const LOCAL_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second],[subsecond digits:3]");

/// One measurement in a time series, keyed by integer step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarPoint {
    pub step: i64,
    pub value: f32,
    /// Unix seconds with fractional milliseconds.
    pub wall_time: f64,
    /// UTC rendering of `wall_time` as `YYYY-MM-DD HH:MM:SS,mmm`.
    pub local_time: String,
}

impl ScalarPoint {
    /// Construct from `(step, value, wall_time)`, deriving `local_time`.
    pub fn from_wall_time(step: i64, value: f32, wall_time: f64) -> Self {
        let local_time = wall_time_to_local_time(wall_time);
        Self {
            step,
            value,
            wall_time,
            local_time,
        }
    }

    /// Construct from a parsed timestamp string, deriving `wall_time`.
    pub fn from_local_time(step: i64, value: f32, local_time: impl Into<String>) -> Self {
        let local_time = local_time.into();
        let wall_time = local_time_to_wall_time(&local_time).unwrap_or(-1.0);
        Self {
            step,
            value,
            wall_time,
            local_time,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite()
    }
}

/// Render Unix seconds (with fractional milliseconds) as UTC civil time.
pub fn wall_time_to_local_time(wall_time: f64) -> String {
    let nanos = (wall_time * 1e9).round() as i128;
    match OffsetDateTime::from_unix_timestamp_nanos(nanos) {
        Ok(dt) => dt
            .format(LOCAL_TIME_FORMAT)
            .unwrap_or_else(|_| String::new()),
        Err(_) => String::new(),
    }
}

/// Parse a `YYYY-MM-DD HH:MM:SS,mmm` string as UTC civil time back to Unix seconds.
pub fn local_time_to_wall_time(local_time: &str) -> Option<f64> {
    let dt = time::PrimitiveDateTime::parse(local_time, LOCAL_TIME_FORMAT).ok()?;
    Some(dt.assume_utc().unix_timestamp_nanos() as f64 / 1e9)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_time_round_trips_through_local_time() {
        let original = 1_700_000_000.123;
        let local = wall_time_to_local_time(original);
        let back = local_time_to_wall_time(&local).unwrap();
        assert!((original - back).abs() < 0.001);
    }

    #[test]
    fn local_time_has_millisecond_precision() {
        let s = wall_time_to_local_time(1_700_000_000.5);
        assert!(s.ends_with(",500"));
    }

    #[test]
    fn from_wall_time_fills_local_time() {
        let p = ScalarPoint::from_wall_time(10, 0.5, 1_700_000_000.0);
        assert!(!p.local_time.is_empty());
    }
}
