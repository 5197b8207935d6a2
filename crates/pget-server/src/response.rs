// Unified response envelope for the /gd surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use pget_core::types::PgetError;

/// Every endpoint answers `{code, message, data}`: `code = 0` with HTTP
/// 200 on success, `code = -1` with a non-2xx status on business errors.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Response {
    Json(Envelope {
        code: 0,
        message: "ok".to_string(),
        data,
    })
    .into_response()
}

pub fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(Envelope {
            code: -1,
            message: message.to_string(),
            data: serde_json::json!({}),
        }),
    )
        .into_response()
}

pub fn from_error(err: &PgetError) -> Response {
    error(status_for(err), &err.to_string())
}

fn status_for(err: &PgetError) -> StatusCode {
    match err {
        PgetError::InvalidRequest(_) | PgetError::UrlParse(_) | PgetError::EmptyPath => {
            StatusCode::BAD_REQUEST
        }
        PgetError::RangeNotSupported
        | PgetError::InvalidContentLength
        | PgetError::Network(_) => StatusCode::NOT_ACCEPTABLE,
        PgetError::TaskUnknown => StatusCode::NO_CONTENT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
