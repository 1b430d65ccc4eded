//! Tunables for the engine: worker pool size, batch-flush thresholds,
//! progress-poll interval, scan limits. All have defaults matching the
//! values named in the design (§4.4/§4.6/§4.7/§4.8).

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG: &str = r#"# Scalar visualization engine configuration

[scheduler]
# 0 means min(available_parallelism, max_workers)
worker_count = 0
max_workers = 16
progress_poll_interval = "500ms"

[ingest]
flush_tag_threshold = 100
flush_point_threshold = 10000
import_scan_depth = 7

[index]
incremental_drain_cap = 1000

[query]
sample_stride_base = 10001
max_points_per_line = 50000
"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_progress_poll_interval")]
    pub progress_poll_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_flush_tag_threshold")]
    pub flush_tag_threshold: usize,
    #[serde(default = "default_flush_point_threshold")]
    pub flush_point_threshold: usize,
    #[serde(default = "default_import_scan_depth")]
    pub import_scan_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_incremental_drain_cap")]
    pub incremental_drain_cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_sample_stride_base")]
    pub sample_stride_base: usize,
    #[serde(default = "default_max_points_per_line")]
    pub max_points_per_line: usize,
}

fn default_worker_count() -> usize {
    0
}
fn default_max_workers() -> usize {
    16
}
fn default_progress_poll_interval() -> String {
    "500ms".to_string()
}
fn default_flush_tag_threshold() -> usize {
    100
}
fn default_flush_point_threshold() -> usize {
    10_000
}
fn default_import_scan_depth() -> usize {
    7
}
fn default_incremental_drain_cap() -> usize {
    1000
}
fn default_sample_stride_base() -> usize {
    10_001
}
fn default_max_points_per_line() -> usize {
    50_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_workers: default_max_workers(),
            progress_poll_interval: default_progress_poll_interval(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            flush_tag_threshold: default_flush_tag_threshold(),
            flush_point_threshold: default_flush_point_threshold(),
            import_scan_depth: default_import_scan_depth(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            incremental_drain_cap: default_incremental_drain_cap(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            sample_stride_base: default_sample_stride_base(),
            max_points_per_line: default_max_points_per_line(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| EngineError::ConfigParse(e.to_string()))
    }

    /// Worker pool size: `min(available_parallelism, max_workers)` unless
    /// overridden.
    pub fn resolved_worker_count(&self) -> usize {
        if self.scheduler.worker_count > 0 {
            return self.scheduler.worker_count;
        }
        num_cpus::get().min(self.scheduler.max_workers).max(1)
    }

    pub fn progress_poll_interval(&self) -> Duration {
        parse_duration(&self.scheduler.progress_poll_interval)
            .unwrap_or(Duration::from_millis(500))
    }
}

fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.parse().ok().map(Duration::from_millis);
    }
    if s.is_empty() {
        return None;
    }
    let (num_str, unit) = s.split_at(s.len() - 1);
    let num: u64 = num_str.parse().ok()?;
    match unit {
        "s" => Some(Duration::from_secs(num)),
        "m" => Some(Duration::from_secs(num * 60)),
        "h" => Some(Duration::from_secs(num * 3600)),
        _ => None,
    }
}
