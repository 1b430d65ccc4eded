//! Line-based training-log text parser (`worker_*.log`, `npu_*.log`,
//! `rank_*.log`). Grounded on `LogTextParser.cpp`'s regex table; a line
//! only yields points when it both mentions `step` and matches the step
//! regex, independent of whether a loss/global_norm value is present.

use crate::point::ScalarPoint;
use regex::Regex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::sync::OnceLock;

pub const TAG_LOSS: &str = "Loss";
pub const TAG_GLOBAL_NORM: &str = "global_norm";

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3}").unwrap())
}

fn step_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"step:\s*\[\s*(\d+)/\s*(\d+)\]").unwrap())
}

fn loss_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"loss:\s*([-+]?\d*\.\d+|\d+)").unwrap())
}

fn global_norm_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"global_norm:\s*\[([-+]?\d*\.\d+|\d+)").unwrap())
}

fn global_batch_size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+$").unwrap())
}

/// Read the next line, returning `None` at EOF (the caller stops the
/// parse loop there — a partial trailing line without a newline is left
/// for the next resumption, matching `getline` returning failbit).
pub fn read_line(reader: &mut impl BufRead) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 || !line.ends_with('\n') {
        return Ok(None);
    }
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(Some(line))
}

/// Parse one log line into its tagged scalar points. A line with no
/// `step` substring, or that doesn't match the step regex, yields
/// nothing (not an error — most lines in a training log aren't metric
/// lines at all).
pub fn parse_line(line: &str) -> HashMap<String, Vec<ScalarPoint>> {
    let mut out: HashMap<String, Vec<ScalarPoint>> = HashMap::new();
    if !line.contains("step") {
        return out;
    }
    let Some(step_caps) = step_regex().captures(line) else {
        return out;
    };
    let Ok(step) = step_caps[1].parse::<i64>() else {
        return out;
    };

    let local_time = timestamp_regex()
        .find(line)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    if let Some(caps) = loss_regex().captures(line) {
        if let Ok(value) = caps[1].parse::<f32>() {
            out.entry(TAG_LOSS.to_string())
                .or_default()
                .push(ScalarPoint::from_local_time(step, value, local_time.clone()));
        }
    }
    if let Some(caps) = global_norm_regex().captures(line) {
        if let Ok(value) = caps[1].parse::<f32>() {
            out.entry(TAG_GLOBAL_NORM.to_string())
                .or_default()
                .push(ScalarPoint::from_local_time(step, value, local_time.clone()));
        }
    }
    out
}

/// Scan from the start of the file for a `global_batch_size` line and
/// extract the trailing integer. Run once before the main parse loop
/// (`FileParser::BeforeParse`); a missing value leaves the caller's
/// existing setting untouched.
pub fn scan_global_batch_size(input: &mut (impl Read + Seek)) -> std::io::Result<Option<f64>> {
    input.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(input);
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if !line.contains("global_batch_size") {
            continue;
        }
        if let Some(m) = global_batch_size_regex().find(line.trim_end()) {
            if let Ok(value) = m.as_str().parse::<f64>() {
                return Ok(Some(value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_loss_and_timestamp() {
        let line = "2024-01-02 03:04:05,678 step: [10/100] loss: 0.5";
        let parsed = parse_line(line);
        let points = parsed.get(TAG_LOSS).unwrap();
        assert_eq!(points[0].step, 10);
        assert_eq!(points[0].value, 0.5);
        assert_eq!(points[0].local_time, "2024-01-02 03:04:05,678");
    }

    #[test]
    fn parses_global_norm() {
        let line = "step: [1/10] global_norm: [1.25] other text";
        let parsed = parse_line(line);
        assert_eq!(parsed.get(TAG_GLOBAL_NORM).unwrap()[0].value, 1.25);
    }

    #[test]
    fn line_without_step_substring_yields_nothing() {
        assert!(parse_line("just some log text").is_empty());
    }

    #[test]
    fn line_with_step_word_but_no_match_yields_nothing() {
        assert!(parse_line("step count exceeded").is_empty());
    }

    #[test]
    fn scans_global_batch_size_from_head() {
        let content = "some header\nglobal_batch_size: 2048\nstep: [0/1] loss: 0.1\n";
        let mut cursor = Cursor::new(content.as_bytes().to_vec());
        let found = scan_global_batch_size(&mut cursor).unwrap();
        assert_eq!(found, Some(2048.0));
    }
}
