//! Per-file tag→records storage, normal and virtual variants, and the
//! file store that owns all of it.
//!
//! Grounded on `FileManager/File.{h,cpp}` and `FileManager/VirtualFile.{h,cpp}`.
//! Normal and virtual files are unified as a tagged variant rather than an
//! inheritance hierarchy, per the design notes.

mod normal;
mod store;
mod virtual_file;

pub use normal::NormalFile;
pub use store::{File, FileStore};
pub use virtual_file::VirtualFile;

use serde::{Deserialize, Serialize};

/// The wire/source format a file was (or will be) parsed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseDataType {
    TfEvent,
    MindSporeSummary,
    TextLog,
    Unknown,
}

impl ParseDataType {
    /// Classify by filename using the same regexes the wire-format table in
    /// §6 specifies: `out.tfevent*`, `out.events.summary*`,
    /// `worker_<N>*.log`, `npu_*.log`, `rank_*.log`.
    pub fn classify(file_name: &str) -> ParseDataType {
        if file_name.contains("out.tfevent") {
            return ParseDataType::TfEvent;
        }
        if file_name.contains("out.events.summary") {
            return ParseDataType::MindSporeSummary;
        }
        if is_worker_log(file_name) || file_name.contains("npu_") && file_name.ends_with(".log") {
            return ParseDataType::TextLog;
        }
        if file_name.contains("rank_") && file_name.ends_with(".log") {
            return ParseDataType::TextLog;
        }
        ParseDataType::Unknown
    }
}

/// `worker_[0-9]+.*\.log` — requires a numeric suffix right after `worker_`.
fn is_worker_log(file_name: &str) -> bool {
    let Some(idx) = file_name.find("worker_") else {
        return false;
    };
    let rest = &file_name[idx + "worker_".len()..];
    let has_digits = rest.chars().next().is_some_and(|c| c.is_ascii_digit());
    has_digits && file_name.ends_with(".log")
}

/// How `FileStore::get_data` should interpret `left`/`right` and which
/// per-tag series to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    Normal,
    Smoothing,
    TokenNormal,
    TokenSmoothing,
}

impl DataMode {
    pub fn is_token(self) -> bool {
        matches!(self, DataMode::TokenNormal | DataMode::TokenSmoothing)
    }

    pub fn is_smoothing(self) -> bool {
        matches!(self, DataMode::Smoothing | DataMode::TokenSmoothing)
    }
}
