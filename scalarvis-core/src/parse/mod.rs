//! Per-format record parsers plus the shared batched-flush ingestion
//! driver that replays a file's new bytes into the file store and tag
//! index.
//!
//! Grounded on `FileParser::ParserData`/`UpdateData`/`ReachLimit`/
//! `UpdateDataToGraph` — the format-specific parsers only implement
//! `ReadRecord`/`ParseRecordToScalar`-equivalents (`read_record`,
//! `parse_record`), the rest is this shared driver.

pub mod framing;
pub mod summary;
pub mod textlog;
pub mod tfevent;

use crate::config::IngestConfig;
use crate::error::{EngineError, Result};
use crate::file::{FileStore, ParseDataType};
use crate::index::TagIndex;
use crate::point::ScalarPoint;
use std::collections::HashMap;
use std::fs::File as StdFile;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

/// The result of one `parse_file` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseProgress {
    pub new_offset: u64,
    pub made_progress: bool,
}

/// Parse everything newly available in `path` starting at `offset`,
/// flushing to `store`/`index` in batches, and return the updated
/// offset. A file that isn't imported anymore (the watcher or an
/// external command cleared the flag mid-parse) stops the flush early —
/// already-flushed batches stay committed, but the offset only advances
/// past them, matching `FileParser::UpdateDataToGraph`'s abort path.
pub fn parse_file(
    path: &Path,
    data_type: ParseDataType,
    offset: u64,
    store: &FileStore,
    index: &TagIndex,
    ingest: &IngestConfig,
) -> Result<ParseProgress> {
    let path_str = path.to_string_lossy().to_string();
    let mut file = StdFile::open(path).map_err(|_| EngineError::FileNotFound(path.to_path_buf()))?;

    if data_type == ParseDataType::TextLog {
        if let Some(gbs) = textlog::scan_global_batch_size(&mut file)? {
            store.update_token_param(&path_str, Some(gbs), None).ok();
        }
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::new(file);

    let mut cache: HashMap<String, Vec<ScalarPoint>> = HashMap::new();
    let mut data_count = 0usize;
    let mut new_offset = offset;
    let mut made_progress = false;
    let mut aborted = false;

    loop {
        let (consumed, tags) = match data_type {
            ParseDataType::TfEvent => {
                let Some(bytes) = tfevent::read_record(&mut reader)? else {
                    break;
                };
                let consumed = framed_record_len(bytes.len());
                (consumed, tfevent::parse_record(&bytes))
            }
            ParseDataType::MindSporeSummary => {
                let Some(bytes) = summary::read_record(&mut reader)? else {
                    break;
                };
                let consumed = framed_record_len(bytes.len());
                (consumed, summary::parse_record(&bytes))
            }
            ParseDataType::TextLog => {
                let Some(line) = textlog::read_line(&mut reader)? else {
                    break;
                };
                let consumed = line.len() as u64 + 1;
                (consumed, textlog::parse_line(&line))
            }
            ParseDataType::Unknown => {
                return Err(EngineError::UnsupportedFileType(path.to_path_buf()));
            }
        };

        new_offset += consumed;
        if tags.is_empty() {
            continue;
        }
        made_progress = true;
        for (tag, points) in tags {
            data_count += points.len();
            cache.entry(tag).or_default().extend(points);
        }

        if cache.len() > ingest.flush_tag_threshold || data_count > ingest.flush_point_threshold {
            if !flush(&path_str, store, index, &mut cache)? {
                aborted = true;
                break;
            }
            data_count = 0;
        }
    }

    if !aborted {
        flush(&path_str, store, index, &mut cache)?;
    }

    Ok(ParseProgress {
        new_offset,
        made_progress,
    })
}

fn framed_record_len(payload_len: usize) -> u64 {
    8 + 4 + payload_len as u64 + 4
}

/// Drain `cache` into the store/index. Returns `false` (abort) the
/// moment the target file is no longer marked imported — the remaining
/// cached tags are dropped, matching the source's early-return in
/// `UpdateDataToGraph`.
fn flush(
    path: &str,
    store: &FileStore,
    index: &TagIndex,
    cache: &mut HashMap<String, Vec<ScalarPoint>>,
) -> Result<bool> {
    let Some(normal) = store.get_normal(path) else {
        return Ok(false);
    };
    for (tag, points) in cache.drain() {
        if !normal.is_imported() {
            return Ok(false);
        }
        index.record_update(&tag, path);
        normal.update_data(&tag, points);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use std::io::Write;

    #[test]
    fn parses_text_log_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker_0.log");
        {
            let mut f = StdFile::create(&path).unwrap();
            writeln!(f, "2024-01-01 00:00:00,000 step: [0/10] loss: 1.0").unwrap();
            writeln!(f, "2024-01-01 00:00:01,000 step: [1/10] loss: 0.5").unwrap();
        }
        let store = FileStore::new();
        store.add_file(path.to_string_lossy().to_string(), ParseDataType::TextLog);
        store
            .get_normal(&path.to_string_lossy())
            .unwrap()
            .set_imported(true);
        let index = TagIndex::new();
        let ingest = IngestConfig::default();

        let progress = parse_file(&path, ParseDataType::TextLog, 0, &store, &index, &ingest).unwrap();
        assert!(progress.made_progress);
        assert!(index.contains("Loss", &path.to_string_lossy()));

        let second = parse_file(&path, ParseDataType::TextLog, progress.new_offset, &store, &index, &ingest).unwrap();
        assert!(!second.made_progress);
        assert_eq!(second.new_offset, progress.new_offset);
    }

    #[test]
    fn unimported_file_aborts_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker_1.log");
        {
            let mut f = StdFile::create(&path).unwrap();
            writeln!(f, "2024-01-01 00:00:00,000 step: [0/10] loss: 1.0").unwrap();
        }
        let store = FileStore::new();
        store.add_file(path.to_string_lossy().to_string(), ParseDataType::TextLog);
        store
            .get_normal(&path.to_string_lossy())
            .unwrap()
            .set_imported(false);
        let index = TagIndex::new();
        let ingest = IngestConfig::default();

        parse_file(&path, ParseDataType::TextLog, 0, &store, &index, &ingest).unwrap();
        assert!(!index.contains("Loss", &path.to_string_lossy()));
    }
}
