// HTTP handlers for the /gd surface.

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use pget_core::relay;
use pget_core::types::Request;

use crate::platform;
use crate::response;
use crate::routes::AppState;

/// POST /gd/download: accept a download and answer `{id, size}` without
/// waiting for the fetch.
pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<Request>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return response::error(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    match state.service.clone().start(req).await {
        Ok(accepted) => response::ok(accepted),
        Err(err) => response::from_error(&err),
    }
}

/// GET /gd/progress/:id: stream throttled progress frames as
/// server-sent events until the task ends or the client leaves.
pub async fn progress(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if !state.service.hub().contains(&id) {
        return response::error(StatusCode::NO_CONTENT, "task finished");
    }

    let sub = state.service.hub().subscribe(&id);
    let token = sub.token;
    let (tx, rx) = mpsc::channel(16);

    let service = state.service.clone();
    let throttle = service.throttle_interval();
    let relay_id = id.clone();
    tokio::spawn(async move {
        relay::relay(sub.rx, throttle, tx).await;
        service.hub().unsubscribe(&relay_id, token);
        service.reap(&relay_id);
        debug!(id = %relay_id, "progress stream closed");
    });

    let frames = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (frame, rx))
    });
    let events = frames.filter_map(|frame| async move {
        match serde_json::to_string(&frame) {
            Ok(json) => Some(Ok::<Event, Infallible>(Event::default().data(json))),
            Err(err) => {
                warn!(%err, "progress frame serialization failed");
                None
            }
        }
    });

    Sse::new(events).into_response()
}

/// GET /gd/choose-dir: run the native directory picker. A cancelled
/// dialog answers an empty object.
pub async fn choose_dir() -> Response {
    match platform::choose_directory().await {
        Ok(Some(path)) => response::ok(serde_json::json!({ "path": path })),
        Ok(None) => Json(serde_json::json!({})).into_response(),
        Err(err) => response::from_error(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenDirQuery {
    #[serde(default)]
    pub path: String,
}

/// GET /gd/open-dir?path=...: reveal the path in the file manager.
pub async fn open_dir(Query(query): Query<OpenDirQuery>) -> Response {
    match platform::open_in_file_manager(&query.path) {
        Ok(()) => response::ok(serde_json::json!({ "path": query.path })),
        Err(err) => response::from_error(&err),
    }
}
