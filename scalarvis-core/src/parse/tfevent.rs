//! TensorBoard `tfevent` file parser.
//!
//! Wire schema (from the public `tensorflow/core/util/event.proto` and
//! `summary.proto`, field numbers are part of the stable public API):
//! `Event{ wall_time:1 (double), step:2 (int64), summary:5 (Summary) }`,
//! `Summary{ value:1 (repeated Value) }`,
//! `Summary.Value{ tag:1 (string), simple_value:2 (float) }`.

use super::framing::{find_bytes, find_fixed32, find_fixed64, find_string, find_varint, find_all_bytes, read_framed_record};
use crate::point::ScalarPoint;
use std::collections::HashMap;
use std::io::Read;

const FIELD_WALL_TIME: u32 = 1;
const FIELD_STEP: u32 = 2;
const FIELD_SUMMARY: u32 = 5;
const FIELD_SUMMARY_VALUE: u32 = 1;
const FIELD_VALUE_TAG: u32 = 1;
const FIELD_VALUE_SIMPLE_VALUE: u32 = 2;

/// Read the next raw event record from `input`, per the shared
/// length+CRC framing. Returns `None` at EOF or on a truncated trailing
/// record.
pub fn read_record(input: &mut impl Read) -> std::io::Result<Option<Vec<u8>>> {
    read_framed_record(input)
}

/// Decode one `Event` record into its per-tag scalar points. Returns an
/// empty map for events with no scalar summary (step events, graph defs,
/// file-version markers, etc.) rather than an error — those are valid,
/// just uninteresting to this engine.
pub fn parse_record(record: &[u8]) -> HashMap<String, Vec<ScalarPoint>> {
    let mut out: HashMap<String, Vec<ScalarPoint>> = HashMap::new();
    let Some(summary) = find_bytes(record, FIELD_SUMMARY) else {
        return out;
    };
    let step = find_varint(record, FIELD_STEP).unwrap_or(0) as i64;
    let wall_time = find_fixed64(record, FIELD_WALL_TIME)
        .map(f64::from_bits)
        .unwrap_or(0.0);

    for value in find_all_bytes(summary, FIELD_SUMMARY_VALUE) {
        let Some(bits) = find_fixed32(value, FIELD_VALUE_SIMPLE_VALUE) else {
            continue;
        };
        let Some(tag) = find_string(value, FIELD_VALUE_TAG) else {
            continue;
        };
        let scalar = f32::from_bits(bits);
        out.entry(tag)
            .or_default()
            .push(ScalarPoint::from_wall_time(step, scalar, wall_time));
    }
    out
}
