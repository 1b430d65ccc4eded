//! MindSpore `out.events.summary` file parser. Shares the TFEvent
//! record framing but a distinct (and distinctly field-numbered) event
//! schema: `Event{ wall_time:1, step:2, summary:4 }`,
//! `Summary{ value:1 }`, `Summary.Value{ tag:1, scalar_value:3 }`.

use super::framing::{find_all_bytes, find_bytes, find_fixed32, find_fixed64, find_string, find_varint, read_framed_record};
use crate::point::ScalarPoint;
use std::collections::HashMap;
use std::io::Read;

const FIELD_WALL_TIME: u32 = 1;
const FIELD_STEP: u32 = 2;
const FIELD_SUMMARY: u32 = 4;
const FIELD_SUMMARY_VALUE: u32 = 1;
const FIELD_VALUE_TAG: u32 = 1;
const FIELD_VALUE_SCALAR_VALUE: u32 = 3;

pub fn read_record(input: &mut impl Read) -> std::io::Result<Option<Vec<u8>>> {
    read_framed_record(input)
}

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
        let Some(bits) = find_fixed32(value, FIELD_VALUE_SCALAR_VALUE) else {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_varint(mut value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if value == 0 {
                break;
            }
        }
        out
    }

    fn tag(field_number: u32, wire_type: u8) -> Vec<u8> {
        encode_varint(((field_number as u64) << 3) | wire_type as u64)
    }

    fn encode_value(tag_str: &str, value: f32) -> Vec<u8> {
        let mut out = tag(FIELD_VALUE_TAG, 2);
        out.extend(encode_varint(tag_str.len() as u64));
        out.extend(tag_str.as_bytes());
        out.extend(tag(FIELD_VALUE_SCALAR_VALUE, 5));
        out.extend(value.to_bits().to_le_bytes());
        out
    }

    fn encode_event(step: i64, wall_time: f64, tag_str: &str, value: f32) -> Vec<u8> {
        let encoded_value = encode_value(tag_str, value);
        let mut summary = tag(FIELD_SUMMARY_VALUE, 2);
        summary.extend(encode_varint(encoded_value.len() as u64));
        summary.extend(encoded_value);

        let mut out = tag(FIELD_WALL_TIME, 1);
        out.extend(wall_time.to_bits().to_le_bytes());
        out.extend(tag(FIELD_STEP, 0));
        out.extend(encode_varint(step as u64));
        out.extend(tag(FIELD_SUMMARY, 2));
        out.extend(encode_varint(summary.len() as u64));
        out.extend(summary);
        out
    }

    #[test]
    fn parses_scalar_value() {
        let event = encode_event(5, 42.0, "train/loss", 0.75);
        let parsed = parse_record(&event);
        let points = parsed.get("train/loss").unwrap();
        assert_eq!(points[0].step, 5);
        assert_eq!(points[0].value, 0.75);
    }
}
