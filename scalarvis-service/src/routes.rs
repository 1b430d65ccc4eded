//! HTTP route handlers: one per external command, each a thin JSON
//! adapter over an `Engine` method. Grounded on the seven
//! `ScalarVisually*Handler` classes' request/response shapes.

use crate::error::{ApiJson, ApiResponse, AppError};
use crate::state::SharedState;
use axum::extract::State;
use axum::Json;
use scalarvis_core::{Engine, GraphDataRequest, LineType, SmoothingParam};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::atomic::Ordering;
use std::time::Instant;

async fn on_engine<F, T>(engine: std::sync::Arc<Engine>, f: F) -> Result<T, AppError>
where
    F: FnOnce(&Engine) -> Result<T, scalarvis_core::EngineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| AppError::new(axum::http::StatusCode::INTERNAL_SERVER_ERROR, crate::error::ERR_CODE_INTERNAL, e.to_string()))?
        .map_err(AppError::from)
}

// ---------------------------------------------------------------------------
// POST /importFile
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ImportFileRequest {
    #[serde(default)]
    pub append: bool,
    #[serde(rename = "pathList")]
    pub path_list: Vec<String>,
}

#[derive(Serialize)]
pub struct ImportFileResponse {
    #[serde(rename = "projectName")]
    pub project_name: String,
}

pub async fn import_file(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<ImportFileRequest>,
) -> Result<Json<ApiResponse<ImportFileResponse>>, AppError> {
    if req.path_list.is_empty() {
        return Err(AppError::invalid_param("pathList must not be empty"));
    }
    state.metrics.import_count.fetch_add(1, Ordering::Relaxed);
    let engine = state.engine.clone();
    let project_name = on_engine(engine, move |engine| engine.import_files(req.path_list, req.append)).await?;
    Ok(ApiResponse::ok(ImportFileResponse { project_name }))
}

// ---------------------------------------------------------------------------
// POST /getParseState
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct GetParseStateRequest {
    #[serde(rename = "projectNameLists")]
    pub project_name_lists: Vec<String>,
}

#[derive(Serialize)]
pub struct ParseStateEntry {
    #[serde(rename = "projectName")]
    pub project_name: String,
    pub finish: bool,
    pub percent: u32,
}

#[derive(Serialize)]
pub struct GetParseStateResponse {
    #[serde(rename = "stateList")]
    pub state_list: Vec<ParseStateEntry>,
}

pub async fn get_parse_state(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<GetParseStateRequest>,
) -> Json<ApiResponse<GetParseStateResponse>> {
    let state_list = state
        .engine
        .get_parse_state(&req.project_name_lists)
        .into_iter()
        .map(|(project_name, finish, percent)| ParseStateEntry {
            project_name,
            finish,
            percent,
        })
        .collect();
    ApiResponse::ok(GetParseStateResponse { state_list })
}

// ---------------------------------------------------------------------------
// GET /getAllGraph
// ---------------------------------------------------------------------------

/// A file reference as shown in a tag's file list: basename, full path,
/// and the path's directory components, so a client can group files by
/// directory without re-parsing the path itself.
#[derive(Serialize)]
pub struct FileRef {
    pub name: String,
    pub path: String,
    pub dirs: Vec<String>,
}

fn file_ref(path: String) -> FileRef {
    let as_path = std::path::Path::new(&path);
    let name = as_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&path)
        .to_string();
    let dirs = as_path
        .parent()
        .map(|parent| {
            parent
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    FileRef { name, path, dirs }
}

#[derive(Serialize)]
pub struct GraphTagEntry {
    pub tag: String,
    #[serde(rename = "fileList")]
    pub file_list: Vec<FileRef>,
}

#[derive(Serialize)]
pub struct TagListResponse {
    pub data: Vec<GraphTagEntry>,
}

pub async fn get_all_graph(State(state): State<SharedState>) -> Json<ApiResponse<TagListResponse>> {
    let mut data: Vec<GraphTagEntry> = state
        .engine
        .get_all_graph_info()
        .into_iter()
        .map(|(tag, mut paths)| {
            paths.sort();
            let file_list = paths.into_iter().map(file_ref).collect();
            GraphTagEntry { tag, file_list }
        })
        .collect();
    data.sort_by(|a, b| a.tag.cmp(&b.tag));
    ApiResponse::ok(TagListResponse { data })
}

// ---------------------------------------------------------------------------
// GET /getIncrementalTag
// ---------------------------------------------------------------------------

pub async fn get_incremental_tag(State(state): State<SharedState>) -> Json<ApiResponse<TagListResponse>> {
    let mut data: Vec<GraphTagEntry> = state
        .engine
        .get_incremental_tag()
        .into_iter()
        .map(|(tag, paths)| {
            let file_list = paths.into_iter().map(file_ref).collect();
            GraphTagEntry { tag, file_list }
        })
        .collect();
    data.sort_by(|a, b| a.tag.cmp(&b.tag));
    ApiResponse::ok(TagListResponse { data })
}

// ---------------------------------------------------------------------------
// GET /queryCreatedFile
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct CreatedFileDirEntry {
    pub dir: String,
    #[serde(rename = "fileList")]
    pub file_list: Vec<String>,
}

#[derive(Serialize)]
pub struct QueryCreatedFileResponse {
    pub data: Vec<CreatedFileDirEntry>,
}

pub async fn query_created_file(
    State(state): State<SharedState>,
) -> Json<ApiResponse<QueryCreatedFileResponse>> {
    let mut data: Vec<CreatedFileDirEntry> = state
        .engine
        .get_created_file_group_by_dir()
        .into_iter()
        .map(|(dir, files)| {
            let mut file_list: Vec<String> = files.into_iter().collect();
            file_list.sort();
            CreatedFileDirEntry { dir, file_list }
        })
        .collect();
    data.sort_by(|a, b| a.dir.cmp(&b.dir));
    ApiResponse::ok(QueryCreatedFileResponse { data })
}

// ---------------------------------------------------------------------------
// POST /fileMerge
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct FileMergeRequest {
    /// `"merge"` to create/replace a virtual file, `"unset"` to tear one
    /// down. Anything else is rejected, matching the handler's
    /// `action`-string dispatch.
    pub action: String,
    pub name: String,
    #[serde(default, rename = "fileList")]
    pub file_list: Vec<String>,
}

#[derive(Serialize)]
pub struct FileMergeResponse {
    pub action: String,
    pub name: String,
    pub tags: Vec<String>,
    pub file: String,
    #[serde(rename = "fileList")]
    pub file_list: Vec<String>,
}

pub async fn file_merge(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<FileMergeRequest>,
) -> Result<Json<ApiResponse<FileMergeResponse>>, AppError> {
    let merge = match req.action.as_str() {
        "merge" => true,
        "unset" => false,
        other => return Err(AppError::invalid_param(format!("unknown action '{other}'"))),
    };
    state.metrics.merge_count.fetch_add(1, Ordering::Relaxed);
    let engine = state.engine.clone();
    let result = on_engine(engine, move |engine| engine.file_merge(req.name, req.file_list, merge)).await?;
    Ok(ApiResponse::ok(FileMergeResponse {
        action: result.action.to_string(),
        name: result.name,
        tags: result.tags,
        file: result.file,
        file_list: result.sub_files,
    }))
}

// ---------------------------------------------------------------------------
// POST /tokenSet
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct TokenSetParam {
    pub file: String,
    #[serde(rename = "globalBatchSize")]
    pub global_batch_size: f64,
    #[serde(rename = "seqLength")]
    pub seq_length: f64,
}

#[derive(Deserialize)]
pub struct TokenSetRequest {
    pub params: Vec<TokenSetParam>,
}

#[derive(Serialize)]
pub struct TokenSetEntry {
    pub file: String,
    #[serde(rename = "globalBatchSize")]
    pub global_batch_size: f64,
    #[serde(rename = "seqLength")]
    pub seq_length: f64,
    pub tag: Vec<String>,
}

#[derive(Serialize)]
pub struct TokenSetResponse {
    pub data: Vec<TokenSetEntry>,
}

pub async fn token_set(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<TokenSetRequest>,
) -> Result<Json<ApiResponse<TokenSetResponse>>, AppError> {
    state.metrics.token_set_count.fetch_add(1, Ordering::Relaxed);
    let engine = state.engine.clone();
    let data = on_engine(engine, move |engine| {
        req.params
            .into_iter()
            .map(|param| {
                let tag = engine.set_token_param(&param.file, param.global_batch_size, param.seq_length)?;
                Ok(TokenSetEntry {
                    file: param.file,
                    global_batch_size: param.global_batch_size,
                    seq_length: param.seq_length,
                    tag,
                })
            })
            .collect::<Result<Vec<_>, scalarvis_core::EngineError>>()
    })
    .await?;
    Ok(ApiResponse::ok(TokenSetResponse { data }))
}

// ---------------------------------------------------------------------------
// POST /getScalarData
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SmoothingConfig {
    algorithm: String,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default, rename = "windowSize")]
    window_size: Option<u64>,
    #[serde(default)]
    top: Option<f64>,
}

impl SmoothingConfig {
    fn into_param(self) -> Result<SmoothingParam, AppError> {
        match self.algorithm.as_str() {
            "smoothing" => Ok(SmoothingParam::Debiased {
                weight: self.weight.ok_or_else(|| AppError::invalid_param("smoothing config needs 'weight'"))?,
            }),
            "windowMedian" => Ok(SmoothingParam::WindowMedian {
                window_size: self
                    .window_size
                    .ok_or_else(|| AppError::invalid_param("windowMedian config needs 'windowSize'"))?,
            }),
            "windowTopx" => Ok(SmoothingParam::WindowTopx {
                window_size: self
                    .window_size
                    .ok_or_else(|| AppError::invalid_param("windowTopx config needs 'windowSize'"))?,
                top: self.top.ok_or_else(|| AppError::invalid_param("windowTopx config needs 'top'"))?,
            }),
            other => Err(AppError::invalid_param(format!("unknown smoothing algorithm '{other}'"))),
        }
    }
}

fn default_enable() -> bool {
    true
}

/// One entry of a graph's `graphConfig` array: either the `token` flag or
/// a smoothing spec, each independently toggleable via `enable` (present
/// but disabled behaves as absent). `normal`/`sample` entries are accepted
/// but ignored — those lines are always built regardless of config, per
/// the query pipeline's `BuildLineOP`. Matches the JSON shape
/// `{"type": "token"}` / `{"type": "smoothing", "algorithm": ..., ...}`.
#[derive(Deserialize)]
#[serde(tag = "type")]
enum GraphConfigItem {
    #[serde(rename = "token")]
    Token {
        #[serde(default = "default_enable")]
        enable: bool,
    },
    #[serde(rename = "smoothing")]
    Smoothing {
        #[serde(default = "default_enable")]
        enable: bool,
        #[serde(flatten)]
        config: SmoothingConfig,
    },
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "sample")]
    Sample,
}

#[derive(Deserialize)]
pub struct SingleGraphRequest {
    pub tag: String,
    pub file: String,
    pub start: i64,
    pub end: i64,
    #[serde(default, rename = "graphConfig")]
    graph_config: Vec<GraphConfigItem>,
}

#[derive(Deserialize)]
pub struct GetScalarDataRequest {
    #[serde(rename = "graphList")]
    pub graph_list: Vec<SingleGraphRequest>,
}

#[derive(Serialize)]
pub struct GetScalarDataResponse {
    pub data: Vec<Value>,
}

/// JSON has no NaN/Infinity; render a non-finite value as its string form
/// (`"nan"`, `"inf"`, `"-inf"`) rather than letting `serde_json` panic on
/// it, per the wire-format rule for scalar values.
fn finite_value(v: f32) -> Value {
    if v.is_finite() {
        json!(v)
    } else {
        json!(v.to_string())
    }
}

fn line_type_key(line_type: LineType) -> &'static str {
    match line_type {
        LineType::Normal => "normal",
        LineType::Token => "tokenNormal",
        LineType::NormalSmoothing => "normalSmoothing",
        LineType::TokenSmoothing => "tokenSmoothing",
    }
}

pub async fn get_scalar_data(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<GetScalarDataRequest>,
) -> Result<Json<ApiResponse<GetScalarDataResponse>>, AppError> {
    let start = Instant::now();

    let mut requests = Vec::with_capacity(req.graph_list.len());
    for graph in req.graph_list {
        let mut token = false;
        let mut smoothing = None;
        for item in graph.graph_config {
            match item {
                GraphConfigItem::Token { enable } => token = enable,
                GraphConfigItem::Smoothing { enable, config } => {
                    smoothing = if enable { Some(config.into_param()?) } else { None };
                }
                GraphConfigItem::Normal | GraphConfigItem::Sample => {}
            }
        }
        requests.push(GraphDataRequest {
            tag: graph.tag,
            file: graph.file,
            left: graph.start,
            right: graph.end,
            token,
            smoothing,
            sample: true,
        });
    }

    state.metrics.query_count.fetch_add(1, Ordering::Relaxed);
    let engine = state.engine.clone();
    let responses = on_engine(engine, move |engine| engine.get_scalar_data(requests)).await?;

    let data = responses
        .into_iter()
        .map(|resp| {
            let mut obj = Map::new();
            obj.insert("tag".to_string(), json!(resp.tag));
            obj.insert("file".to_string(), json!(resp.file));
            for (line_type, points) in resp.lines {
                let mut points_map = Map::new();
                for point in points {
                    points_map.insert(
                        point.step.to_string(),
                        json!({
                            "value": finite_value(point.value),
                            "wallTime": point.wall_time,
                            "localTime": point.local_time,
                        }),
                    );
                }
                obj.insert(line_type_key(line_type).to_string(), Value::Object(points_map));
            }
            let date_config: Vec<Value> = resp
                .date_index
                .into_iter()
                .map(|(step, value, date)| json!({"step": step, "value": finite_value(value), "date": date}))
                .collect();
            obj.insert("dateConfig".to_string(), Value::Array(date_config));
            Value::Object(obj)
        })
        .collect();

    let elapsed_ms = start.elapsed().as_millis() as u64;
    state.metrics.total_query_ms.fetch_add(elapsed_ms, Ordering::Relaxed);

    Ok(ApiResponse::ok(GetScalarDataResponse { data }))
}
