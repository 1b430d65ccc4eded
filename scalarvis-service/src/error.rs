//! The `{body, msg, errCode, result}` response envelope every route
//! returns, success or failure. Grounded on `ScalaryProtocolUtil`'s
//! `GetBasicResponse`/`SetResponseError` — callers never see a bare HTTP
//! status, they branch on `result`/`errCode` in the body.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use scalarvis_core::EngineError;
use serde::Serialize;
use serde_json::Value;

pub const ERR_CODE_OK: i32 = 0;
pub const ERR_CODE_INVALID_JSON: i32 = 1;
pub const ERR_CODE_INVALID_PARAM: i32 = 2;
pub const ERR_CODE_INVALID_PATH: i32 = 3;
/// Not part of the four codes named in the external-interface spec, but a
/// genuine I/O or config failure still has to surface as *something* other
/// than a silent 2/3 misclassification.
pub const ERR_CODE_INTERNAL: i32 = 4;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub body: T,
    pub msg: String,
    #[serde(rename = "errCode")]
    pub err_code: i32,
    pub result: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(body: T) -> Json<Self> {
        Json(Self {
            body,
            msg: String::new(),
            err_code: ERR_CODE_OK,
            result: true,
        })
    }
}

pub struct AppError {
    pub status: StatusCode,
    pub err_code: i32,
    pub msg: String,
}

impl AppError {
    pub fn new(status: StatusCode, err_code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            err_code,
            msg: msg.into(),
        }
    }

    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ERR_CODE_INVALID_PARAM, msg)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let envelope = ApiResponse::<Value> {
            body: Value::Object(Default::default()),
            msg: self.msg,
            err_code: self.err_code,
            result: false,
        };
        (self.status, Json(envelope)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::FileNotFound(_)
            | EngineError::PathUnreadable(_)
            | EngineError::UnsupportedFileType(_) => {
                Self::new(StatusCode::NOT_FOUND, ERR_CODE_INVALID_PATH, err.to_string())
            }
            EngineError::UnmergeNotFound(_)
            | EngineError::MergeFailed { .. }
            | EngineError::VirtualFileOperation { .. } => {
                Self::new(StatusCode::BAD_REQUEST, ERR_CODE_INVALID_PARAM, err.to_string())
            }
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, ERR_CODE_INTERNAL, err.to_string()),
        }
    }
}

/// `Json<T>` extractor that reports parse failures through the envelope
/// instead of axum's bare-text rejection body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(match rejection {
                JsonRejection::JsonDataError(e) => {
                    AppError::new(StatusCode::BAD_REQUEST, ERR_CODE_INVALID_JSON, e.to_string())
                }
                other => {
                    AppError::new(StatusCode::BAD_REQUEST, ERR_CODE_INVALID_JSON, other.to_string())
                }
            }),
        }
    }
}
